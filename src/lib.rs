//! Yardline - backend wiring for the Yardline landscaping services app
//!
//! Resolves which backend url and public key the app talks to (launch
//! override, environment, or built-in fallback) and builds the one shared
//! backend client from it.

pub mod client;
pub mod config;
pub mod error;
pub mod observability;

#[cfg(test)]
mod test_support;

pub use client::{backend_client, require_backend, AdminNotice, BackendClient, ClientSlot};
pub use config::{ConfigSource, LaunchContext, ResolvedConfig, Resolver};
pub use error::{Result, YardlineError};
