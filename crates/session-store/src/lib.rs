//! Persisted upload sessions keyed by content fingerprint.
//!
//! A resumable upload is identified by the [`Fingerprint`] of its
//! destination and file bytes. The [`SessionStore`] maps that fingerprint
//! to the session id the remote storage groups chunk uploads under, on top
//! of any [`KeyValueStore`] that survives process restarts.
//!
//! [`Fingerprint`]: forge_transfer::Fingerprint

pub mod kv;
pub mod session;

pub use kv::{JsonFileStore, KeyValueStore, MemoryStore, config_dir, default_sessions_path};
pub use session::{SessionId, SessionLease, SessionStore};

/// Errors from session persistence.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
