//! Data types for the upload flow.

use std::path::{Path, PathBuf};

use forge_session_store::SessionId;
use forge_transfer::{Fingerprint, encode_object_key};
use serde::{Deserialize, Serialize};

/// What to upload and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket_key: String,
    /// Object key as sent to the service (already URI-encoded).
    pub object_key: String,
    pub local_path: PathBuf,
    pub content_type: Option<String>,
    pub total_bytes: u64,
}

impl UploadTarget {
    pub fn new(
        bucket_key: impl Into<String>,
        object_key: impl Into<String>,
        local_path: impl Into<PathBuf>,
        total_bytes: u64,
    ) -> Self {
        Self {
            bucket_key: bucket_key.into(),
            object_key: object_key.into(),
            local_path: local_path.into(),
            content_type: None,
            total_bytes,
        }
    }

    /// Builds a target for a local file, encoding `object_name` and taking
    /// the size from the file system.
    pub async fn for_file(
        bucket_key: impl Into<String>,
        object_name: &str,
        local_path: impl AsRef<Path>,
    ) -> std::io::Result<Self> {
        let local_path = local_path.as_ref();
        let meta = tokio::fs::metadata(local_path).await?;
        Ok(Self::new(
            bucket_key,
            encode_object_key(object_name),
            local_path,
            meta.len(),
        ))
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Object details as reported by the storage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub bucket_key: String,
    pub object_key: String,
    pub object_id: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Hex SHA-256 of the object bytes, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// How an upload attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Every byte is committed and the session record was removed.
    Completed {
        object: ObjectMetadata,
        fingerprint: Fingerprint,
        session_id: SessionId,
        /// True when an existing session was picked up.
        resumed: bool,
        /// Bytes sent by this attempt (excludes ranges already committed).
        bytes_sent: u64,
    },
    /// Stopped at a cancellation check. The session record is kept so a
    /// later attempt resumes.
    Cancelled {
        fingerprint: Fingerprint,
        session_id: SessionId,
        /// Offset the upload had reached when it stopped.
        next_byte: u64,
    },
}

impl UploadOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn object(&self) -> Option<&ObjectMetadata> {
        match self {
            Self::Completed { object, .. } => Some(object),
            Self::Cancelled { .. } => None,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Self::Completed { fingerprint, .. } | Self::Cancelled { fingerprint, .. } => {
                fingerprint
            }
        }
    }
}

/// Result of deleting every object of a bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Objects listed at the start.
    pub listed: usize,
    pub deleted: usize,
    pub cancelled: bool,
}
