fn main() {
    println!("Run `cargo test -p resume-flow` to execute the end-to-end upload tests.");
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use forge_local_storage::LocalObjectStorage;
    use forge_session_store::{JsonFileStore, SessionStore};
    use forge_transfer::CommittedRange;
    use forge_upload::{
        CancellationToken, NoProgress, ObjectMetadata, ObjectStorage, ProgressTracker,
        RangeUpload, ResumableUploader, StorageFuture, UploadOutcome, UploadTarget,
        UploaderConfig, delete_all_objects, upload_files,
    };

    const CHUNK: usize = 4096;

    /// Counts chunk uploads and cancels a token after a set number of them.
    struct Interrupting {
        inner: LocalObjectStorage,
        chunks: AtomicUsize,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl Interrupting {
        fn new(inner: LocalObjectStorage, cancel_after: Option<(usize, CancellationToken)>) -> Self {
            Self {
                inner,
                chunks: AtomicUsize::new(0),
                cancel_after,
            }
        }
    }

    impl ObjectStorage for Interrupting {
        fn committed_ranges<'a>(
            &'a self,
            bucket_key: &'a str,
            object_key: &'a str,
            session_id: &'a str,
        ) -> StorageFuture<'a, Vec<CommittedRange>> {
            self.inner.committed_ranges(bucket_key, object_key, session_id)
        }

        fn upload_range<'a>(&'a self, upload: RangeUpload<'a>) -> StorageFuture<'a, ()> {
            Box::pin(async move {
                self.inner.upload_range(upload).await?;
                let n = self.chunks.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some((limit, token)) = &self.cancel_after
                    && n >= *limit
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
            self.inner.object_metadata(bucket_key, object_key)
        }

        fn delete_object<'a>(
            &'a self,
            bucket_key: &'a str,
            object_key: &'a str,
        ) -> StorageFuture<'a, ()> {
            self.inner.delete_object(bucket_key, object_key)
        }

        fn list_objects<'a>(
            &'a self,
            bucket_key: &'a str,
        ) -> StorageFuture<'a, Vec<ObjectMetadata>> {
            self.inner.list_objects(bucket_key)
        }
    }

    fn write_source(dir: &Path, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        let path = dir.join(name);
        std::fs::write(&path, &data).unwrap();
        (path, data)
    }

    fn uploader(storage: Arc<dyn ObjectStorage>, sessions_file: &Path) -> ResumableUploader {
        let kv = Arc::new(JsonFileStore::open(sessions_file.to_path_buf()).unwrap());
        ResumableUploader::new(
            storage,
            SessionStore::new(kv),
            UploaderConfig::default().with_chunk_size(CHUNK),
        )
    }

    #[tokio::test]
    async fn interrupted_upload_resumes_after_restart() {
        let src = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let sessions_file = src.path().join("state").join("upload-sessions.json");
        let (path, data) = write_source(src.path(), "tower.ifc", 10 * CHUNK + 123);
        let target = UploadTarget::for_file("designs", "tower.ifc", &path)
            .await
            .unwrap();

        // First process: cancelled after three chunks.
        let cancel = CancellationToken::new();
        let first_storage = Arc::new(Interrupting::new(
            LocalObjectStorage::new(remote.path()),
            Some((3, cancel.clone())),
        ));
        let first = uploader(first_storage.clone(), &sessions_file);
        let outcome = first.upload(&target, &NoProgress, &cancel).await.unwrap();
        let (session_id, next_byte) = match outcome {
            UploadOutcome::Cancelled {
                session_id,
                next_byte,
                ..
            } => (session_id, next_byte),
            other => panic!("expected cancellation, got {other:?}"),
        };
        assert_eq!(next_byte, 3 * CHUNK as u64);
        assert_eq!(first_storage.chunks.load(Ordering::SeqCst), 3);
        drop(first);

        // The session survives on disk.
        let kv = JsonFileStore::open(sessions_file.clone()).unwrap();
        assert_eq!(kv.keys().len(), 1);
        drop(kv);

        // Second process: picks the session up and sends only the rest.
        let second_storage = Arc::new(Interrupting::new(
            LocalObjectStorage::new(remote.path()),
            None,
        ));
        let second = uploader(second_storage.clone(), &sessions_file);
        let tracker = ProgressTracker::new();
        let outcome = second
            .upload(&target, &tracker, &CancellationToken::new())
            .await
            .unwrap();

        match outcome {
            UploadOutcome::Completed {
                object,
                session_id: resumed_id,
                resumed,
                bytes_sent,
                ..
            } => {
                assert!(resumed);
                assert_eq!(resumed_id, session_id);
                assert_eq!(bytes_sent, data.len() as u64 - 3 * CHUNK as u64);
                assert_eq!(object.size, data.len() as u64);
                assert_eq!(
                    object.sha256.as_deref(),
                    Some(forge_transfer::checksum_bytes(&data).as_str())
                );
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(second_storage.chunks.load(Ordering::SeqCst), 8);
        assert!((tracker.percent() - 100.0).abs() < 1e-6);

        let stored = LocalObjectStorage::new(remote.path()).object_path("designs", "tower.ifc");
        assert_eq!(std::fs::read(stored).unwrap(), data);

        let kv = JsonFileStore::open(sessions_file).unwrap();
        assert!(kv.keys().is_empty());
    }

    #[tokio::test]
    async fn upload_many_then_clear_bucket() {
        let src = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalObjectStorage::new(remote.path()));
        let up = uploader(storage.clone(), &src.path().join("sessions.json"));

        let paths: Vec<PathBuf> = (0..11)
            .map(|i| write_source(src.path(), &format!("sheet {i}.pdf"), 1000 + i * 500).0)
            .collect();

        let results = upload_files(&up, "drawings", &paths, &NoProgress, &CancellationToken::new()).await;
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        let listed = storage.list_objects("drawings").await.unwrap();
        assert_eq!(listed.len(), 11);
        assert!(listed.iter().all(|m| m.content_type.as_deref() == Some("application/pdf")));
        assert!(listed.iter().any(|m| m.object_key == "sheet%200.pdf"));

        let summary = delete_all_objects(
            &*storage,
            "drawings",
            up.config().delete_batch_size,
            &NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.listed, 11);
        assert_eq!(summary.deleted, 11);
        assert!(storage.list_objects("drawings").await.unwrap().is_empty());
    }
}
