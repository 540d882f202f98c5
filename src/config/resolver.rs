//! Configuration Resolver
//!
//! Picks the backend url and public key from three tiers, highest first:
//! launch override, environment, built-in fallback. The first tier with both
//! values present wins. Resolution never fails.

use crate::config::defaults::{
    self, DOMAIN_SUFFIX, ENV_ADMIN_CONTACT, ENV_API_KEY, ENV_BACKEND_URL, FUNCTIONS_SUFFIX,
};
use crate::config::env::EnvSource;
use crate::config::launch::LaunchContext;
use serde::Serialize;
use std::fmt;

/// Which tier supplied the url and key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Decoded from the launch URL's `config` parameter
    QueryParameter,

    /// Read from `VITE_SUPABASE_URL` / `VITE_SUPABASE_ANON_KEY`
    EnvironmentVariable,

    /// Shipped constants
    BuiltInFallback,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigSource::QueryParameter => "query parameter",
            ConfigSource::EnvironmentVariable => "environment",
            ConfigSource::BuiltInFallback => "built-in fallback",
        };
        f.write_str(name)
    }
}

/// The backend connection settings in effect for this process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    pub backend_url: String,
    pub api_key: String,
    pub admin_contact: String,
    pub source: ConfigSource,
}

impl ResolvedConfig {
    /// Both url and key are non-empty
    pub fn is_complete(&self) -> bool {
        !self.backend_url.is_empty() && !self.api_key.is_empty()
    }

    /// Base of the REST (table) API
    pub fn rest_endpoint(&self) -> String {
        format!("{}/rest/v1", self.backend_url.trim_end_matches('/'))
    }

    /// Base of the edge functions API.
    ///
    /// Swaps the `.supabase.co` suffix for `.functions.supabase.co`. A url
    /// without that suffix is returned as is; nothing validates it.
    pub fn functions_endpoint(&self) -> String {
        functions_endpoint_for(&self.backend_url)
    }

    /// Key prefix safe to print in logs
    pub fn masked_key(&self) -> String {
        mask_key(&self.api_key)
    }
}

impl fmt::Display for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (key {}, admin {}, from {})",
            self.backend_url,
            self.masked_key(),
            self.admin_contact,
            self.source
        )
    }
}

fn functions_endpoint_for(backend_url: &str) -> String {
    let url = backend_url.trim_end_matches('/');
    match url.strip_suffix(DOMAIN_SUFFIX) {
        Some(project) => format!("{}{}", project, FUNCTIONS_SUFFIX),
        None => url.to_string(),
    }
}

fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = key.chars().take(6).collect();
    format!("{}***", prefix)
}

/// Values used when no other tier supplies a url and key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub backend_url: String,
    pub api_key: String,
    pub admin_contact: String,
}

impl Default for Fallback {
    fn default() -> Self {
        Self {
            backend_url: defaults::BACKEND_URL.to_string(),
            api_key: defaults::API_KEY.to_string(),
            admin_contact: defaults::ADMIN_CONTACT.to_string(),
        }
    }
}

/// Three-tier resolver over an environment source and a launch context
#[derive(Debug, Clone)]
pub struct Resolver<E> {
    env: E,
    launch: LaunchContext,
    fallback: Fallback,
}

impl<E: EnvSource> Resolver<E> {
    /// Resolver with no launch override and the built-in fallback
    pub fn new(env: E) -> Self {
        Self {
            env,
            launch: LaunchContext::empty(),
            fallback: Fallback::default(),
        }
    }

    pub fn with_launch(mut self, launch: LaunchContext) -> Self {
        self.launch = launch;
        self
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Resolve the config. Pure apart from tracing events.
    pub fn resolve(&self) -> ResolvedConfig {
        let admin_contact = self
            .env
            .non_empty(ENV_ADMIN_CONTACT)
            .unwrap_or_else(|| self.fallback.admin_contact.clone());

        let (backend_url, api_key, source) = if let Some((url, key)) = self.from_override() {
            (url, key, ConfigSource::QueryParameter)
        } else if let Some((url, key)) = self.from_env() {
            (url, key, ConfigSource::EnvironmentVariable)
        } else {
            tracing::warn!(
                backend_url = %self.fallback.backend_url,
                "No backend configuration in launch URL or {}/{}; using built-in fallback",
                ENV_BACKEND_URL,
                ENV_API_KEY
            );
            (
                self.fallback.backend_url.clone(),
                self.fallback.api_key.clone(),
                ConfigSource::BuiltInFallback,
            )
        };

        let config = ResolvedConfig {
            backend_url,
            api_key,
            admin_contact,
            source,
        };
        tracing::debug!(%config, "Backend configuration resolved");
        config
    }

    fn from_override(&self) -> Option<(String, String)> {
        match self.launch.decode()? {
            Ok(pair) => Some((pair.backend_url, pair.api_key)),
            Err(reason) => {
                tracing::debug!(%reason, "Ignoring launch config override");
                None
            }
        }
    }

    fn from_env(&self) -> Option<(String, String)> {
        let url = self.env.non_empty(ENV_BACKEND_URL)?;
        let key = self.env.non_empty(ENV_API_KEY)?;
        Some((url, key))
    }
}
