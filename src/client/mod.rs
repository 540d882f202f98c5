//! Client Module
//!
//! Backend client and its process-wide slot.

pub mod backend;
pub mod notify;
pub mod slot;

pub use backend::BackendClient;
pub use notify::{AdminNotice, NOTIFICATION_FUNCTION};
pub use slot::{backend_client, require_backend, ClientSlot};
