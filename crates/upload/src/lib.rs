//! Resumable chunked uploads to cloud object storage.
//!
//! This crate implements the **upload logic** only. It has no HTTP or UI
//! dependencies: the host provides an [`ObjectStorage`] implementation
//! that talks to the actual service, a [`KeyValueStore`] that survives
//! restarts, and a [`ProgressSink`] for reporting.
//!
//! # Upload pipeline
//!
//! 1. **Fingerprint**: digest the destination keys and file bytes
//! 2. **Session**: resolve or persist the session id for the fingerprint
//! 3. **Query**: ask the remote which byte ranges are already committed
//! 4. **Fill**: upload the gaps chunk by chunk, checking cancellation
//! 5. **Finalize**: clear the session and fetch the object metadata
//!
//! Bulk operations (deleting every object of a bucket) go through the
//! [`BatchExecutor`], which bounds the number of requests in flight.
//!
//! [`KeyValueStore`]: forge_session_store::KeyValueStore

pub mod batch;
pub mod bucket;
pub mod config;
pub mod content_type;
pub mod error;
#[cfg(test)]
mod mock;
pub mod progress;
pub mod storage;
pub mod types;
pub mod uploader;

pub use batch::{BatchError, BatchExecutor, BatchSummary, DEFAULT_BATCH_SIZE};
pub use bucket::{FileUploadResult, delete_all_objects, upload_files};
pub use config::UploaderConfig;
pub use content_type::{content_type_for, has_extension};
pub use error::{BucketError, StorageError, UploadError};
pub use progress::{NoProgress, ProgressCallback, ProgressSink, ProgressTracker, ScaledProgress};
pub use storage::{ObjectStorage, RangeUpload, StorageFuture};
pub use types::{DeleteSummary, ObjectMetadata, UploadOutcome, UploadTarget};
pub use uploader::ResumableUploader;

pub use tokio_util::sync::CancellationToken;
