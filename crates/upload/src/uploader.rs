//! Resumable single-file upload.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use forge_session_store::{SessionId, SessionStore};
use forge_transfer::{
    Chunk, ChunkReader, CommittedRange, Fingerprint, TransferError, normalize_ranges,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UploaderConfig;
use crate::content_type::has_extension;
use crate::error::UploadError;
use crate::progress::ProgressSink;
use crate::storage::{ObjectStorage, RangeUpload};
use crate::types::{UploadOutcome, UploadTarget};

/// Uploads files in chunks, resuming sessions left behind by earlier attempts.
///
/// One uploader can drive many uploads concurrently; uploads of the same
/// fingerprint are serialized through [`SessionStore::lease`].
pub struct ResumableUploader {
    storage: Arc<dyn ObjectStorage>,
    sessions: SessionStore,
    config: UploaderConfig,
}

impl ResumableUploader {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        sessions: SessionStore,
        config: UploaderConfig,
    ) -> Self {
        Self {
            storage,
            sessions,
            config,
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn storage(&self) -> &dyn ObjectStorage {
        self.storage.as_ref()
    }

    /// Uploads `target`, skipping byte ranges the storage already holds.
    ///
    /// The pipeline:
    /// 1. Fingerprint the destination keys and file bytes
    /// 2. Resolve or persist the session id for the fingerprint
    /// 3. Query committed ranges (a failed query counts as none)
    /// 4. Upload the gaps before, between and after committed ranges
    /// 5. Clear the session and fetch the finished object's metadata
    ///
    /// Cancellation is checked before each committed range and each chunk.
    /// A cancelled or failed upload keeps its session record.
    pub async fn upload(
        &self,
        target: &UploadTarget,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        if !has_extension(&target.object_key) {
            warn!(
                object_key = %target.object_key,
                "object name has no file extension, derivative services cannot translate it"
            );
        }

        // 1. Fingerprint
        let fingerprint = fingerprint_target(target).await?;
        let _lease = self
            .sessions
            .lease(&fingerprint)
            .ok_or_else(|| UploadError::Busy(fingerprint.clone()))?;
        let reader = open_reader(&target.local_path).await?;
        if reader.file_size() != target.total_bytes {
            return Err(UploadError::Io {
                path: target.local_path.clone(),
                source: TransferError::SizeMismatch {
                    expected: target.total_bytes,
                    actual: reader.file_size(),
                },
            });
        }

        // 2. Session
        let (session_id, resumed) = self.sessions.resolve_or_create(&fingerprint)?;
        info!(
            bucket = %target.bucket_key,
            object = %target.object_key,
            %fingerprint,
            session = %session_id,
            resumed,
            total_bytes = target.total_bytes,
            "starting upload"
        );
        progress.report(0.0);

        // 3. Query
        let committed = self.committed_ranges(target, &session_id).await;

        // 4. Fill
        let mut run = UploadRun {
            storage: self.storage.as_ref(),
            target,
            fingerprint: &fingerprint,
            session_id: &session_id,
            progress,
            reader: Some(reader),
            chunk_size: self.config.chunk_size.max(1) as u64,
            next_byte: 0,
            bytes_sent: 0,
        };
        let flow = run.fill(&committed, cancel).await?;
        let (next_byte, bytes_sent) = (run.next_byte, run.bytes_sent);
        drop(run);
        if flow.is_break() {
            info!(
                %fingerprint,
                session = %session_id,
                next_byte,
                "upload cancelled, session kept for resume"
            );
            return Ok(UploadOutcome::Cancelled {
                fingerprint,
                session_id,
                next_byte,
            });
        }

        // 5. Finalize
        self.sessions.clear(&fingerprint)?;
        let object = self
            .storage
            .object_metadata(&target.bucket_key, &target.object_key)
            .await
            .map_err(|source| UploadError::Finalize {
                object_key: target.object_key.clone(),
                source,
            })?;
        info!(
            object_id = %object.object_id,
            bytes_sent,
            resumed,
            "upload complete"
        );
        Ok(UploadOutcome::Completed {
            object,
            fingerprint,
            session_id,
            resumed,
            bytes_sent,
        })
    }

    async fn committed_ranges(
        &self,
        target: &UploadTarget,
        session_id: &SessionId,
    ) -> Vec<CommittedRange> {
        match self
            .storage
            .committed_ranges(&target.bucket_key, &target.object_key, session_id.as_str())
            .await
        {
            Ok(ranges) => {
                let normalized = normalize_ranges(&ranges, target.total_bytes);
                debug!(
                    session = %session_id,
                    reported = ranges.len(),
                    usable = normalized.len(),
                    "committed ranges"
                );
                normalized
            }
            Err(e) => {
                warn!(session = %session_id, "committed range query failed, uploading everything: {e}");
                Vec::new()
            }
        }
    }
}

/// State of one upload attempt while it fills gaps.
struct UploadRun<'a> {
    storage: &'a dyn ObjectStorage,
    target: &'a UploadTarget,
    fingerprint: &'a Fingerprint,
    session_id: &'a SessionId,
    progress: &'a dyn ProgressSink,
    /// Moved into each blocking read and handed back with the chunk.
    reader: Option<ChunkReader>,
    chunk_size: u64,
    next_byte: u64,
    bytes_sent: u64,
}

impl UploadRun<'_> {
    /// Uploads every byte not covered by `committed`.
    ///
    /// `committed` must be normalized: sorted, disjoint and within the file.
    async fn fill(
        &mut self,
        committed: &[CommittedRange],
        cancel: &CancellationToken,
    ) -> Result<ControlFlow<()>, UploadError> {
        let total = self.target.total_bytes;

        for range in committed {
            if cancel.is_cancelled() {
                return Ok(ControlFlow::Break(()));
            }
            if self.fill_to(range.start, cancel).await?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
            self.skip_to(range.end + 1);
        }

        if total == 0 {
            // Nothing to chunk, but the session still needs one request.
            if cancel.is_cancelled() {
                return Ok(ControlFlow::Break(()));
            }
            self.send_chunk(0, 0).await?;
            self.progress.report(100.0);
            return Ok(ControlFlow::Continue(()));
        }

        self.fill_to(total, cancel).await
    }

    /// Uploads `[next_byte, end)` in chunks of at most `chunk_size`.
    async fn fill_to(
        &mut self,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<ControlFlow<()>, UploadError> {
        while self.next_byte < end {
            if cancel.is_cancelled() {
                return Ok(ControlFlow::Break(()));
            }
            let len = (end - self.next_byte).min(self.chunk_size);
            self.send_chunk(self.next_byte, len).await?;
            self.progress.report(self.percent_of(len));
            self.next_byte += len;
            self.bytes_sent += len;
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Moves past a committed range, crediting its bytes to progress.
    fn skip_to(&mut self, next: u64) {
        if next > self.next_byte {
            self.progress.report(self.percent_of(next - self.next_byte));
            self.next_byte = next;
        }
    }

    async fn send_chunk(&mut self, offset: u64, len: u64) -> Result<(), UploadError> {
        let chunk = self.read(offset, len).await?;
        let upload = RangeUpload {
            bucket_key: &self.target.bucket_key,
            object_key: &self.target.object_key,
            session_id: self.session_id.as_str(),
            content_type: self.target.content_type.as_deref(),
            total_bytes: self.target.total_bytes,
            chunk: &chunk,
        };
        self.storage
            .upload_range(upload)
            .await
            .map_err(|source| UploadError::ChunkUpload {
                offset,
                fingerprint: self.fingerprint.clone(),
                session_id: self.session_id.clone(),
                source,
            })?;
        debug!(session = %self.session_id, offset, len, "chunk committed");
        Ok(())
    }

    async fn read(&mut self, offset: u64, len: u64) -> Result<Chunk, UploadError> {
        let result = match self.reader.take() {
            Some(mut reader) => {
                let (reader, result) = tokio::task::spawn_blocking(move || {
                    let result = read_exact_chunk(&mut reader, offset, len);
                    (reader, result)
                })
                .await?;
                self.reader = Some(reader);
                result
            }
            // Only reachable after an earlier read failed to return the handle.
            None => Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "file handle was lost by an earlier read",
            ))),
        };

        result.map_err(|source| UploadError::Read {
            path: self.target.local_path.clone(),
            offset,
            fingerprint: self.fingerprint.clone(),
            session_id: self.session_id.clone(),
            source,
        })
    }

    fn percent_of(&self, bytes: u64) -> f64 {
        100.0 * bytes as f64 / self.target.total_bytes as f64
    }
}

/// Reads exactly `len` bytes at `offset`; a short read means the file shrank.
fn read_exact_chunk(reader: &mut ChunkReader, offset: u64, len: u64) -> Result<Chunk, TransferError> {
    let chunk = reader.read_chunk(offset, len as usize)?;
    if (chunk.len() as u64) < len {
        return Err(TransferError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("file ended after {} bytes", chunk.end()),
        )));
    }
    Ok(chunk)
}

async fn fingerprint_target(target: &UploadTarget) -> Result<Fingerprint, UploadError> {
    let bucket = target.bucket_key.clone();
    let object = target.object_key.clone();
    let path = target.local_path.clone();
    tokio::task::spawn_blocking(move || forge_transfer::fingerprint(&bucket, &object, &path))
        .await?
        .map_err(|source| UploadError::Io {
            path: target.local_path.clone(),
            source,
        })
}

async fn open_reader(path: &Path) -> Result<ChunkReader, UploadError> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || ChunkReader::open(&owned))
        .await?
        .map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })
}
