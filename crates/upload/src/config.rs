//! Uploader configuration.

use forge_transfer::DEFAULT_CHUNK_SIZE;

use crate::batch::DEFAULT_BATCH_SIZE;

/// Tunables shared by uploads and bulk operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploaderConfig {
    /// Maximum bytes sent per `upload_range` call.
    pub chunk_size: usize,
    /// Maximum delete requests in flight during a bulk delete.
    pub delete_batch_size: usize,
    /// Content type used when none is given and the extension is unknown.
    pub default_content_type: Option<String>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            delete_batch_size: DEFAULT_BATCH_SIZE,
            default_content_type: None,
        }
    }
}

impl UploaderConfig {
    /// Sets the chunk size. Zero falls back to the default.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        self
    }

    /// Sets the bulk delete batch size. Zero is raised to one.
    pub fn with_delete_batch_size(mut self, batch_size: usize) -> Self {
        self.delete_batch_size = batch_size.max(1);
        self
    }

    pub fn with_default_content_type(mut self, content_type: Option<String>) -> Self {
        self.default_content_type = content_type;
        self
    }
}
