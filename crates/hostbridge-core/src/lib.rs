//! # hostbridge-core
//!
//! Shared vocabulary for the hostbridge daemon.
//!
//! - [`module`]: the closed catalog of telemetry modules and the snapshot
//!   stored per module
//! - [`protocol`]: inbound `Request` / outbound `Response` wire types
//! - [`errors`]: the error taxonomy and its mapping onto wire subtypes

#![deny(unsafe_code)]

pub mod errors;
pub mod module;
pub mod protocol;

pub use errors::BridgeError;
pub use module::{ModuleName, ModuleSnapshot, UnknownModuleError};
pub use protocol::{Request, Response, ResponseType};
