//! Client Slot
//!
//! Holds the one backend client of a process. The client is built on first
//! demand and the same `Arc` is handed out afterwards.

use crate::client::BackendClient;
use crate::config::{self, ResolvedConfig};
use crate::error::{Result, YardlineError};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// Lazily filled slot for a shared [`BackendClient`]
#[derive(Debug, Default)]
pub struct ClientSlot {
    inner: Mutex<Option<Arc<BackendClient>>>,
}

impl ClientSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client, if one has been built
    pub fn get(&self) -> Option<Arc<BackendClient>> {
        self.inner.lock().clone()
    }

    /// The client, building it from `config` on first call.
    ///
    /// `None` means the backend is unavailable; the slot stays empty.
    pub fn get_or_init(&self, config: &ResolvedConfig) -> Option<Arc<BackendClient>> {
        let mut guard = self.inner.lock();
        if let Some(client) = guard.as_ref() {
            return Some(Arc::clone(client));
        }

        let client = Arc::new(BackendClient::from_config(config)?);
        tracing::info!(
            rest_url = client.rest_url(),
            source = %config.source,
            "Backend client created"
        );
        *guard = Some(Arc::clone(&client));
        Some(client)
    }
}

static PROCESS_SLOT: OnceLock<ClientSlot> = OnceLock::new();

/// The process-wide backend client, built from [`config::resolved`]
pub fn backend_client() -> Option<Arc<BackendClient>> {
    PROCESS_SLOT
        .get_or_init(ClientSlot::new)
        .get_or_init(config::resolved())
}

/// Like [`backend_client`], for callers that propagate errors
pub fn require_backend() -> Result<Arc<BackendClient>> {
    backend_client().ok_or_else(|| {
        YardlineError::Unavailable("backend url or public key is not configured".to_string())
    })
}
