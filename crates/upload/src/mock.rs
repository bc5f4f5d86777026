//! In-memory `ObjectStorage` double shared by the unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use forge_transfer::CommittedRange;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::progress::ProgressSink;
use crate::storage::{ObjectStorage, RangeUpload, StorageFuture};
use crate::types::ObjectMetadata;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedUpload {
    pub object_key: String,
    pub session_id: String,
    pub content_type: Option<String>,
    pub offset: u64,
    pub data: Vec<u8>,
    pub total_bytes: u64,
}

#[derive(Default)]
pub(crate) struct MockStorage {
    /// Returned by `committed_ranges`.
    pub ranges: Mutex<Vec<CommittedRange>>,
    pub fail_query: AtomicBool,
    pub uploads: Mutex<Vec<RecordedUpload>>,
    /// Offset at which `upload_range` fails.
    pub fail_upload_at: Mutex<Option<u64>>,
    /// Cancels the token once this many chunks were recorded.
    pub cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    /// Object keys per bucket.
    pub objects: Mutex<BTreeMap<String, Vec<String>>>,
    pub fail_list: AtomicBool,
    pub fail_delete: Mutex<HashSet<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub deletes_in_flight: AtomicUsize,
    pub peak_deletes: AtomicUsize,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ranges(ranges: Vec<CommittedRange>) -> Self {
        let mock = Self::default();
        *mock.ranges.lock().unwrap() = ranges;
        mock
    }

    pub fn with_objects(bucket: &str, keys: &[&str]) -> Self {
        let mock = Self::default();
        mock.objects.lock().unwrap().insert(
            bucket.to_string(),
            keys.iter().map(|k| k.to_string()).collect(),
        );
        mock
    }

    pub fn recorded(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    /// `(offset, len)` of every recorded chunk.
    pub fn spans(&self) -> Vec<(u64, usize)> {
        self.recorded()
            .iter()
            .map(|u| (u.offset, u.data.len()))
            .collect()
    }
}

impl ObjectStorage for MockStorage {
    fn committed_ranges<'a>(
        &'a self,
        _bucket_key: &'a str,
        _object_key: &'a str,
        _session_id: &'a str,
    ) -> StorageFuture<'a, Vec<CommittedRange>> {
        Box::pin(async move {
            if self.fail_query.load(Ordering::SeqCst) {
                return Err(StorageError::Transport("status query failed".into()));
            }
            Ok(self.ranges.lock().unwrap().clone())
        })
    }

    fn upload_range<'a>(&'a self, upload: RangeUpload<'a>) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            if *self.fail_upload_at.lock().unwrap() == Some(upload.chunk.offset) {
                return Err(StorageError::Rejected("chunk refused".into()));
            }
            let recorded = {
                let mut uploads = self.uploads.lock().unwrap();
                uploads.push(RecordedUpload {
                    object_key: upload.object_key.to_string(),
                    session_id: upload.session_id.to_string(),
                    content_type: upload.content_type.map(str::to_string),
                    offset: upload.chunk.offset,
                    data: upload.chunk.data.clone(),
                    total_bytes: upload.total_bytes,
                });
                uploads.len()
            };
            if let Some((n, token)) = self.cancel_after.lock().unwrap().as_ref()
                && recorded >= *n
            {
                token.cancel();
            }
            Ok(())
        })
    }

    fn object_metadata<'a>(
        &'a self,
        bucket_key: &'a str,
        object_key: &'a str,
    ) -> StorageFuture<'a, ObjectMetadata> {
        Box::pin(async move {
            let size = self
                .uploads
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|u| u.object_key == object_key)
                .map(|u| u.total_bytes)
                .unwrap_or(0);
            Ok(ObjectMetadata {
                bucket_key: bucket_key.to_string(),
                object_key: object_key.to_string(),
                object_id: format!("urn:mock:{bucket_key}/{object_key}"),
                size,
                content_type: None,
                sha256: None,
            })
        })
    }

    fn delete_object<'a>(
        &'a self,
        _bucket_key: &'a str,
        object_key: &'a str,
    ) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let now = self.deletes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_deletes.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.deletes_in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_delete.lock().unwrap().contains(object_key) {
                return Err(StorageError::Rejected(format!("cannot delete {object_key}")));
            }
            self.deleted.lock().unwrap().push(object_key.to_string());
            Ok(())
        })
    }

    fn list_objects<'a>(&'a self, bucket_key: &'a str) -> StorageFuture<'a, Vec<ObjectMetadata>> {
        Box::pin(async move {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(StorageError::NotFound(bucket_key.to_string()));
            }
            let keys = self
                .objects
                .lock()
                .unwrap()
                .get(bucket_key)
                .cloned()
                .unwrap_or_default();
            Ok(keys
                .into_iter()
                .map(|key| ObjectMetadata {
                    bucket_key: bucket_key.to_string(),
                    object_id: format!("urn:mock:{bucket_key}/{key}"),
                    object_key: key,
                    size: 0,
                    content_type: None,
                    sha256: None,
                })
                .collect())
        })
    }
}

/// Records every progress increment.
#[derive(Default)]
pub(crate) struct RecordingProgress {
    pub increments: Mutex<Vec<f64>>,
}

impl RecordingProgress {
    pub fn total(&self) -> f64 {
        self.increments.lock().unwrap().iter().sum()
    }

    pub fn values(&self) -> Vec<f64> {
        self.increments.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, increment: f64) {
        self.increments.lock().unwrap().push(increment);
    }
}
