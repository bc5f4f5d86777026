//! Whole-bucket operations: uploading several files and clearing a bucket.

use std::path::{Path, PathBuf};

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batch::BatchExecutor;
use crate::content_type::content_type_for;
use crate::error::{BucketError, StorageError, UploadError};
use crate::progress::{ProgressSink, ScaledProgress};
use crate::storage::ObjectStorage;
use crate::types::{DeleteSummary, UploadOutcome, UploadTarget};
use crate::uploader::ResumableUploader;

/// Result of one file in [`upload_files`].
pub type FileUploadResult = (PathBuf, Result<UploadOutcome, UploadError>);

/// Uploads several files into `bucket_key` concurrently.
///
/// Each object is named after its file's base name. The content type is
/// taken from the extension, falling back to the configured default.
/// Every file gets an equal share of `progress`. Results come back in
/// input order; one failure does not stop the others.
pub async fn upload_files(
    uploader: &ResumableUploader,
    bucket_key: &str,
    paths: &[PathBuf],
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Vec<FileUploadResult> {
    if paths.is_empty() {
        return Vec::new();
    }
    let share = 1.0 / paths.len() as f64;

    let uploads = paths.iter().map(|path| async move {
        let scaled = ScaledProgress::new(progress, share);
        let result = upload_one(uploader, bucket_key, path, &scaled, cancel).await;
        if let Err(e) = &result {
            warn!(path = %path.display(), "upload failed: {e}");
        }
        (path.clone(), result)
    });
    join_all(uploads).await
}

async fn upload_one(
    uploader: &ResumableUploader,
    bucket_key: &str,
    path: &Path,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<UploadOutcome, UploadError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content_type = content_type_for(&name)
        .map(str::to_string)
        .or_else(|| uploader.config().default_content_type.clone());

    let target = UploadTarget::for_file(bucket_key, &name, path)
        .await
        .map_err(|e| UploadError::Io {
            path: path.to_path_buf(),
            source: e.into(),
        })?
        .with_content_type(content_type);
    uploader.upload(&target, progress, cancel).await
}

/// Deletes every object in `bucket_key`, at most `batch_size` at a time.
///
/// An empty bucket returns immediately without reporting progress. The
/// first failing batch stops the run; objects deleted before it stay
/// deleted.
pub async fn delete_all_objects(
    storage: &dyn ObjectStorage,
    bucket_key: &str,
    batch_size: usize,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<DeleteSummary, BucketError> {
    let objects = storage
        .list_objects(bucket_key)
        .await
        .map_err(|source| BucketError::List {
            bucket_key: bucket_key.to_string(),
            source,
        })?;
    if objects.is_empty() {
        info!(bucket = %bucket_key, "bucket is already empty");
        return Ok(DeleteSummary::default());
    }

    let listed = objects.len();
    info!(bucket = %bucket_key, objects = listed, batch_size, "deleting all objects");
    let tasks = objects.iter().map(|obj| async move {
        storage.delete_object(bucket_key, &obj.object_key).await?;
        Ok::<(), StorageError>(())
    });

    let summary = BatchExecutor::new(batch_size)
        .run(tasks, progress, cancel)
        .await?;
    info!(
        bucket = %bucket_key,
        deleted = summary.completed,
        cancelled = summary.cancelled,
        "bulk delete finished"
    );
    Ok(DeleteSummary {
        listed,
        deleted: summary.completed,
        cancelled: summary.cancelled,
    })
}
