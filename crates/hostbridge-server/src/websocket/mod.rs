//! Client connections: session state, the live-session index, request
//! handling, and the socket lifecycle.

pub mod connection;
pub mod handler;
pub mod registry;
pub mod session;
