//! Object storage backed by a local directory.
//!
//! Layout under the root directory:
//!
//! ```text
//! <bucket>/objects/<object_key>          finished object bytes
//! <bucket>/meta/<object_key>.json        ObjectMetadata sidecar
//! <bucket>/sessions/<session_id>.part    bytes received so far
//! <bucket>/sessions/<session_id>.json    committed ranges of the session
//! ```
//!
//! A session is promoted to an object as soon as its committed ranges
//! cover the whole file. Useful for offline work and for exercising the
//! resumable upload flow end to end.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use forge_transfer::{
    Chunk, ChunkWriter, CommittedRange, TransferError, calculate_file_checksum, normalize_ranges,
    validate_storage_path,
};
use forge_upload::{ObjectMetadata, ObjectStorage, RangeUpload, StorageError, StorageFuture};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const OBJECTS_DIR: &str = "objects";
const META_DIR: &str = "meta";
const SESSIONS_DIR: &str = "sessions";

/// Progress of one upload session as persisted next to its `.part` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionState {
    object_key: String,
    total_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    ranges: Vec<CommittedRange>,
}

impl SessionState {
    fn is_complete(&self) -> bool {
        match self.ranges.as_slice() {
            [] => self.total_bytes == 0,
            [only] => only.start == 0 && only.end + 1 >= self.total_bytes,
            _ => false,
        }
    }
}

/// Directory-backed [`ObjectStorage`].
#[derive(Clone)]
pub struct LocalObjectStorage {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    /// Serializes session state read-modify-write cycles.
    state_lock: Mutex<()>,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                state_lock: Mutex::new(()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Path of a finished object's bytes.
    pub fn object_path(&self, bucket_key: &str, object_key: &str) -> PathBuf {
        self.inner
            .root
            .join(bucket_key)
            .join(OBJECTS_DIR)
            .join(object_key)
    }

    /// Runs blocking file work off the async runtime.
    async fn blocking<T, F>(&self, work: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, StorageError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || work(&inner))
            .await
            .map_err(|e| StorageError::Transport(format!("storage task failed: {e}")))?
    }
}

impl Inner {
    fn bucket_dir(&self, bucket_key: &str) -> PathBuf {
        self.root.join(bucket_key)
    }

    fn session_paths(&self, bucket_key: &str, session_id: &str) -> (PathBuf, PathBuf) {
        let dir = self.bucket_dir(bucket_key).join(SESSIONS_DIR);
        (
            dir.join(format!("{session_id}.part")),
            dir.join(format!("{session_id}.json")),
        )
    }

    fn meta_path(&self, bucket_key: &str, object_key: &str) -> PathBuf {
        self.bucket_dir(bucket_key)
            .join(META_DIR)
            .join(format!("{object_key}.json"))
    }

    fn commit_range(&self, upload: &OwnedUpload) -> Result<(), StorageError> {
        let _guard = self.state_lock.lock().unwrap();
        let (part_path, state_path) = self.session_paths(&upload.bucket_key, &upload.session_id);
        let mut state = match read_json::<SessionState>(&state_path)? {
            Some(state) if state.object_key != upload.object_key => {
                return Err(StorageError::Rejected(format!(
                    "session {} belongs to object {}",
                    upload.session_id, state.object_key
                )));
            }
            Some(state) => state,
            None => SessionState {
                object_key: upload.object_key.clone(),
                total_bytes: upload.total_bytes,
                content_type: upload.content_type.clone(),
                ranges: Vec::new(),
            },
        };
        if state.total_bytes != upload.total_bytes {
            return Err(StorageError::Rejected(format!(
                "session {} was started for {} bytes, got {}",
                upload.session_id, state.total_bytes, upload.total_bytes
            )));
        }
        if upload.chunk.end() > state.total_bytes {
            return Err(StorageError::Rejected(format!(
                "chunk ends at byte {} past total {}",
                upload.chunk.end(),
                state.total_bytes
            )));
        }

        let writer = ChunkWriter::new(&self.bucket_dir(&upload.bucket_key).join(SESSIONS_DIR));
        writer.write_chunk(&format!("{}.part", upload.session_id), &upload.chunk)?;

        if !upload.chunk.is_empty() {
            state.ranges.push(CommittedRange::new(
                upload.chunk.offset,
                upload.chunk.end() - 1,
            ));
            state.ranges = normalize_ranges(&state.ranges, state.total_bytes);
        }
        if upload.content_type.is_some() {
            state.content_type = upload.content_type.clone();
        }

        if state.is_complete() {
            self.promote(&upload.bucket_key, &part_path, &state_path, &state)?;
        } else {
            write_json(&state_path, &state)?;
            debug!(
                session = %upload.session_id,
                ranges = state.ranges.len(),
                "session state updated"
            );
        }
        Ok(())
    }

    /// Moves a complete session's bytes into place and writes its metadata.
    fn promote(
        &self,
        bucket_key: &str,
        part_path: &Path,
        state_path: &Path,
        state: &SessionState,
    ) -> Result<(), StorageError> {
        let object_path = self
            .bucket_dir(bucket_key)
            .join(OBJECTS_DIR)
            .join(&state.object_key);
        if let Some(parent) = object_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(part_path, &object_path)?;

        let meta = ObjectMetadata {
            bucket_key: bucket_key.to_string(),
            object_key: state.object_key.clone(),
            object_id: object_id(bucket_key, &state.object_key),
            size: state.total_bytes,
            content_type: state.content_type.clone(),
            sha256: Some(calculate_file_checksum(&object_path)?),
        };
        write_json(&self.meta_path(bucket_key, &state.object_key), &meta)?;
        remove_if_exists(state_path)?;
        info!(object_id = %meta.object_id, size = meta.size, "object stored");
        Ok(())
    }
}

/// Owned copy of a [`RangeUpload`] that can move into a blocking task.
struct OwnedUpload {
    bucket_key: String,
    object_key: String,
    session_id: String,
    content_type: Option<String>,
    total_bytes: u64,
    chunk: Chunk,
}

impl ObjectStorage for LocalObjectStorage {
    fn committed_ranges<'a>(
        &'a self,
        bucket_key: &'a str,
        object_key: &'a str,
        session_id: &'a str,
    ) -> StorageFuture<'a, Vec<CommittedRange>> {
        Box::pin(async move {
            check_names(&[bucket_key, object_key, session_id])?;
            let (bucket, object, session) = (
                bucket_key.to_string(),
                object_key.to_string(),
                session_id.to_string(),
            );
            self.blocking(move |inner| {
                let (_, state_path) = inner.session_paths(&bucket, &session);
                match read_json::<SessionState>(&state_path)? {
                    Some(state) if state.object_key == object => Ok(state.ranges),
                    Some(_) => Err(StorageError::Rejected(format!(
                        "session {session} belongs to another object"
                    ))),
                    None => Ok(Vec::new()),
                }
            })
            .await
        })
    }

    fn upload_range<'a>(&'a self, upload: RangeUpload<'a>) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            check_names(&[upload.bucket_key, upload.object_key, upload.session_id])?;
            let owned = OwnedUpload {
                bucket_key: upload.bucket_key.to_string(),
                object_key: upload.object_key.to_string(),
                session_id: upload.session_id.to_string(),
                content_type: upload.content_type.map(str::to_string),
                total_bytes: upload.total_bytes,
                chunk: upload.chunk.clone(),
            };
            self.blocking(move |inner| inner.commit_range(&owned)).await
        })
    }

    fn object_metadata<'a>(
        &'a self,
        bucket_key: &'a str,
        object_key: &'a str,
    ) -> StorageFuture<'a, ObjectMetadata> {
        Box::pin(async move {
            check_names(&[bucket_key, object_key])?;
            let (bucket, object) = (bucket_key.to_string(), object_key.to_string());
            self.blocking(move |inner| {
                read_json(&inner.meta_path(&bucket, &object))?
                    .ok_or_else(|| StorageError::NotFound(format!("{bucket}/{object}")))
            })
            .await
        })
    }

    fn delete_object<'a>(
        &'a self,
        bucket_key: &'a str,
        object_key: &'a str,
    ) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            check_names(&[bucket_key, object_key])?;
            let (bucket, object) = (bucket_key.to_string(), object_key.to_string());
            self.blocking(move |inner| {
                let meta_path = inner.meta_path(&bucket, &object);
                if !meta_path.exists() {
                    return Err(StorageError::NotFound(format!("{bucket}/{object}")));
                }
                remove_if_exists(&inner.bucket_dir(&bucket).join(OBJECTS_DIR).join(&object))?;
                std::fs::remove_file(&meta_path)?;
                debug!(bucket = %bucket, object = %object, "object deleted");
                Ok(())
            })
            .await
        })
    }

    fn list_objects<'a>(&'a self, bucket_key: &'a str) -> StorageFuture<'a, Vec<ObjectMetadata>> {
        Box::pin(async move {
            check_names(&[bucket_key])?;
            let bucket = bucket_key.to_string();
            self.blocking(move |inner| {
                let dir = inner.bucket_dir(&bucket).join(META_DIR);
                if !dir.is_dir() {
                    return Ok(Vec::new());
                }
                let mut objects = Vec::new();
                for entry in std::fs::read_dir(&dir)? {
                    let path = entry?.path();
                    if path.extension().is_some_and(|e| e == "json")
                        && let Some(meta) = read_json::<ObjectMetadata>(&path)?
                    {
                        objects.push(meta);
                    }
                }
                objects.sort_by(|a, b| a.object_key.cmp(&b.object_key));
                Ok(objects)
            })
            .await
        })
    }
}

fn object_id(bucket_key: &str, object_key: &str) -> String {
    format!("urn:local:os.object:{bucket_key}/{object_key}")
}

/// Bucket keys, object keys and session ids must each be one path component.
fn check_names(names: &[&str]) -> Result<(), StorageError> {
    for name in names {
        if name.is_empty() || *name == "." || name.contains(['/', '\\']) {
            return Err(TransferError::InvalidPath(format!("invalid name: {name:?}")).into());
        }
        validate_storage_path(name)?;
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes `value` as pretty JSON via a temp file and rename.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, LocalObjectStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        (dir, storage)
    }

    async fn put(
        storage: &LocalObjectStorage,
        object: &str,
        session: &str,
        offset: u64,
        data: &[u8],
        total: u64,
    ) -> Result<(), StorageError> {
        let chunk = Chunk::new(offset, data.to_vec());
        storage
            .upload_range(RangeUpload {
                bucket_key: "bucket",
                object_key: object,
                session_id: session,
                content_type: Some("text/plain"),
                total_bytes: total,
                chunk: &chunk,
            })
            .await
    }

    #[tokio::test]
    async fn unknown_session_has_no_ranges() {
        let (_dir, s) = storage();
        let ranges = s.committed_ranges("bucket", "a.txt", "s1").await.unwrap();
        assert!(ranges.is_empty());
    }

    #[tokio::test]
    async fn partial_session_reports_merged_ranges() {
        let (_dir, s) = storage();
        put(&s, "a.txt", "s1", 0, b"hello", 20).await.unwrap();
        put(&s, "a.txt", "s1", 5, b"world", 20).await.unwrap();
        put(&s, "a.txt", "s1", 15, b"!!!!!", 20).await.unwrap();

        let ranges = s.committed_ranges("bucket", "a.txt", "s1").await.unwrap();
        assert_eq!(
            ranges,
            vec![CommittedRange::new(0, 9), CommittedRange::new(15, 19)]
        );
        assert!(matches!(
            s.object_metadata("bucket", "a.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn complete_session_becomes_object() {
        let (_dir, s) = storage();
        put(&s, "a.txt", "s1", 5, b"world", 10).await.unwrap();
        put(&s, "a.txt", "s1", 0, b"hello", 10).await.unwrap();

        let meta = s.object_metadata("bucket", "a.txt").await.unwrap();
        assert_eq!(meta.size, 10);
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            meta.sha256.as_deref(),
            Some(forge_transfer::checksum_bytes(b"helloworld").as_str())
        );
        assert_eq!(
            std::fs::read(s.object_path("bucket", "a.txt")).unwrap(),
            b"helloworld"
        );
        // Session files are gone once the object exists.
        assert!(
            s.committed_ranges("bucket", "a.txt", "s1")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn empty_object() {
        let (_dir, s) = storage();
        put(&s, "empty.txt", "s1", 0, b"", 0).await.unwrap();
        let meta = s.object_metadata("bucket", "empty.txt").await.unwrap();
        assert_eq!(meta.size, 0);
    }

    #[tokio::test]
    async fn session_bound_to_one_object() {
        let (_dir, s) = storage();
        put(&s, "a.txt", "s1", 0, b"hello", 10).await.unwrap();
        assert!(matches!(
            put(&s, "b.txt", "s1", 5, b"world", 10).await,
            Err(StorageError::Rejected(_))
        ));
        assert!(matches!(
            s.committed_ranges("bucket", "b.txt", "s1").await,
            Err(StorageError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn chunk_past_total_is_rejected() {
        let (_dir, s) = storage();
        assert!(matches!(
            put(&s, "a.txt", "s1", 8, b"hello", 10).await,
            Err(StorageError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let (_dir, s) = storage();
        assert!(put(&s, "../escape", "s1", 0, b"x", 1).await.is_err());
        assert!(put(&s, "a.txt", "..", 0, b"x", 1).await.is_err());
        assert!(s.list_objects("").await.is_err());
    }

    #[tokio::test]
    async fn list_and_delete() {
        let (_dir, s) = storage();
        put(&s, "b.txt", "s1", 0, b"bb", 2).await.unwrap();
        put(&s, "a.txt", "s2", 0, b"a", 1).await.unwrap();

        let keys: Vec<_> = s
            .list_objects("bucket")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.object_key)
            .collect();
        assert_eq!(keys, vec!["a.txt", "b.txt"]);

        s.delete_object("bucket", "a.txt").await.unwrap();
        assert!(!s.object_path("bucket", "a.txt").exists());
        assert_eq!(s.list_objects("bucket").await.unwrap().len(), 1);
        assert!(matches!(
            s.delete_object("bucket", "a.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_bucket_lists_empty() {
        let (_dir, s) = storage();
        assert!(s.list_objects("nobody").await.unwrap().is_empty());
    }
}
