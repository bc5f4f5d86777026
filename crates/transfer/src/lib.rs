//! File-side primitives for resumable uploads to object storage.
//!
//! - [`fingerprint`] derives the content-addressed identity of an upload.
//! - [`ChunkReader`] reads a local file at arbitrary offsets.
//! - [`ChunkWriter`] writes chunks at offsets (used by storage backends).
//! - [`CommittedRange`] describes bytes a remote already holds for a session.

mod chunked;
mod fingerprint;
mod types;
mod validation;

pub use chunked::{ChunkReader, ChunkWriter, calculate_file_checksum, checksum_bytes};
pub use fingerprint::{Fingerprint, fingerprint};
pub use types::{Chunk, CommittedRange, normalize_ranges};
pub use validation::{encode_object_key, validate_storage_path};

/// Default chunk size: 2 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 2 << 20;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("offset {offset} is past end of file ({file_size} bytes)")]
    OutOfRange { offset: u64, file_size: u64 },

    #[error("file is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
}
