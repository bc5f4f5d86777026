//! Object storage trait.
//!
//! `ObjectStorage` is implemented by the host to bridge upload logic to
//! the actual storage service (HTTP client, local directory, ...).

use std::future::Future;
use std::pin::Pin;

use forge_transfer::{Chunk, CommittedRange};

use crate::error::StorageError;
use crate::types::ObjectMetadata;

/// Boxed future returned by every [`ObjectStorage`] call.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// One chunk of a resumable upload session.
#[derive(Debug, Clone, Copy)]
pub struct RangeUpload<'a> {
    pub bucket_key: &'a str,
    pub object_key: &'a str,
    pub session_id: &'a str,
    pub content_type: Option<&'a str>,
    /// Full size of the file being uploaded.
    pub total_bytes: u64,
    pub chunk: &'a Chunk,
}

impl RangeUpload<'_> {
    /// Inclusive last byte of the chunk, as sent in a `Content-Range` header.
    ///
    /// Returns `None` for an empty chunk.
    pub fn last_byte(&self) -> Option<u64> {
        self.chunk.end().checked_sub(1)
    }
}

/// Abstract connection to a bucket-based object store.
///
/// Implementations must be safe to share between concurrent uploads.
/// Using a trait keeps upload logic decoupled from transport and testable
/// with mocks.
pub trait ObjectStorage: Send + Sync {
    /// Returns the byte ranges already committed for a session.
    fn committed_ranges<'a>(
        &'a self,
        bucket_key: &'a str,
        object_key: &'a str,
        session_id: &'a str,
    ) -> StorageFuture<'a, Vec<CommittedRange>>;

    /// Commits one chunk of a session.
    fn upload_range<'a>(&'a self, upload: RangeUpload<'a>) -> StorageFuture<'a, ()>;

    /// Returns metadata of a finished object.
    fn object_metadata<'a>(
        &'a self,
        bucket_key: &'a str,
        object_key: &'a str,
    ) -> StorageFuture<'a, ObjectMetadata>;

    fn delete_object<'a>(&'a self, bucket_key: &'a str, object_key: &'a str)
    -> StorageFuture<'a, ()>;

    fn list_objects<'a>(&'a self, bucket_key: &'a str) -> StorageFuture<'a, Vec<ObjectMetadata>>;
}
