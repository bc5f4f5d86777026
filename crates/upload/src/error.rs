//! Upload error types.

use std::path::PathBuf;

use forge_session_store::{SessionId, SessionStoreError};
use forge_transfer::{Fingerprint, TransferError};

use crate::batch::BatchError;

/// Errors reported by an [`ObjectStorage`](crate::ObjectStorage) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected by storage: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}

/// Errors that end an upload attempt.
///
/// Except for [`UploadError::Io`], which happens before any session
/// exists, the session record is left in place so the next attempt
/// resumes instead of restarting from byte 0.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: TransferError,
    },

    #[error(
        "reading {} at byte {offset} failed (fingerprint {fingerprint}, session {session_id}): {source}",
        path.display()
    )]
    Read {
        path: PathBuf,
        offset: u64,
        fingerprint: Fingerprint,
        session_id: SessionId,
        #[source]
        source: TransferError,
    },

    #[error(
        "chunk upload at byte {offset} failed (fingerprint {fingerprint}, session {session_id}): {source}"
    )]
    ChunkUpload {
        offset: u64,
        fingerprint: Fingerprint,
        session_id: SessionId,
        #[source]
        source: StorageError,
    },

    #[error("an upload for fingerprint {0} is already running")]
    Busy(Fingerprint),

    #[error("session store error: {0}")]
    SessionStore(#[from] SessionStoreError),

    #[error("fetching metadata of {object_key} after upload failed: {source}")]
    Finalize {
        object_key: String,
        #[source]
        source: StorageError,
    },

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors from whole-bucket operations.
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    #[error("listing objects of {bucket_key} failed: {source}")]
    List {
        bucket_key: String,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Delete(#[from] BatchError<StorageError>),
}
