//! # hostbridge-modules
//!
//! Producing and holding module data.
//!
//! - [`sampler`]: the per-module sampling trait and the typed schema boundary
//! - [`cache`]: one latest-value entry per module plus a change signal
//! - [`scheduler`]: independent periodic sampling per module with forced,
//!   coalesced resampling
//! - [`host`]: default samplers backed by `sysinfo` and Linux sysfs

#![deny(unsafe_code)]

pub mod cache;
pub mod host;
pub mod sampler;
pub mod scheduler;

pub use cache::ModuleCache;
pub use sampler::{ModuleSampler, SampleError, SamplerSet, SchemaSampler, Typed};
pub use scheduler::{PollScheduler, SchedulerConfig};
