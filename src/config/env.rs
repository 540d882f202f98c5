//! Environment Sources
//!
//! The resolver reads environment values through [`EnvSource`] so that a
//! snapshot (a map, a `.env` file) can stand in for the process environment.

use crate::error::{Result, YardlineError};
use std::collections::HashMap;
use std::path::Path;

/// Read-only view over named environment values
pub trait EnvSource {
    /// Raw value of `name`, if set
    fn var(&self, name: &str) -> Option<String>;

    /// Trimmed value of `name`, treating empty as unset
    fn non_empty(&self, name: &str) -> Option<String> {
        self.var(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<E: EnvSource + ?Sized> EnvSource for &E {
    fn var(&self, name: &str) -> Option<String> {
        (**self).var(name)
    }
}

/// Values parsed from a `.env` file, without touching the process environment
#[derive(Debug, Clone, Default)]
pub struct DotenvFile {
    vars: HashMap<String, String>,
}

impl DotenvFile {
    /// Parse a `.env` file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            YardlineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                YardlineError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            vars.insert(key, value);
        }

        Ok(Self { vars })
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl EnvSource for DotenvFile {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Load `.env` from the working directory into the process environment.
///
/// Must run before the first resolution to have any effect. A missing file
/// is not an error.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
    }
}
