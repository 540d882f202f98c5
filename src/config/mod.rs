//! Configuration Module
//!
//! Resolves the backend connection settings once per process.

pub mod defaults;
pub mod env;
pub mod launch;
pub mod resolver;

pub use env::{load_dotenv, DotenvFile, EnvSource, ProcessEnv};
pub use launch::{decode_override, encode_override, LaunchContext, OverridePair, OverrideRejected};
pub use resolver::{ConfigSource, Fallback, ResolvedConfig, Resolver};

use std::sync::OnceLock;

static RESOLVED: OnceLock<ResolvedConfig> = OnceLock::new();

/// Resolve the process config from `launch` and the process environment.
///
/// Only the first call (or the first [`resolved`]) resolves; later calls
/// return the same value and ignore their launch context.
pub fn init(launch: &LaunchContext) -> &'static ResolvedConfig {
    let mut resolved_now = false;
    let config = RESOLVED.get_or_init(|| {
        resolved_now = true;
        Resolver::new(ProcessEnv).with_launch(launch.clone()).resolve()
    });

    if !resolved_now && launch.encoded_override().is_some() {
        tracing::debug!(
            source = %config.source,
            "Backend configuration already resolved; ignoring launch override"
        );
    }
    config
}

/// The process config, resolved without a launch override if [`init`] never ran
pub fn resolved() -> &'static ResolvedConfig {
    RESOLVED.get_or_init(|| Resolver::new(ProcessEnv).resolve())
}
