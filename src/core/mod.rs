//! Runtime core: configuration and lifecycle.
//!
//! - [`Config`]: settings with defaults, JSON/env loading and validation;
//! - [`RuntimeBuilder`]: collects subscribers and starts a [`Runtime`];
//! - [`Runtime`]: owns the bus, registry, engine and subscriber workers.

mod builder;
mod config;
mod runtime;

pub use builder::RuntimeBuilder;
pub use config::Config;
pub use runtime::Runtime;
