use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::TransferError;
use crate::types::Chunk;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Positional reader over a local file.
///
/// The file handle is opened by [`ChunkReader::open`] and closed when the
/// reader is dropped, so whoever owns the reader owns the handle on every
/// exit path.
#[derive(Debug)]
pub struct ChunkReader {
    file: File,
    path: PathBuf,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for positional reads.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            file_size,
        })
    }

    /// Reads up to `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// Never reads past end-of-file: the read is clamped to the bytes
    /// remaining after `offset`. Returns the number of bytes read.
    pub fn read_into(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, TransferError> {
        if offset > self.file_size {
            return Err(TransferError::OutOfRange {
                offset,
                file_size: self.file_size,
            });
        }
        let remaining = self.file_size - offset;
        let len = std::cmp::min(remaining, buf.len() as u64) as usize;
        if len == 0 {
            return Ok(0);
        }

        self.file.seek(SeekFrom::Start(offset))?;
        // A file that shrank since `open` surfaces as UnexpectedEof.
        self.file.read_exact(&mut buf[..len])?;
        Ok(len)
    }

    /// Reads at most `max_len` bytes at `offset` into a checksummed [`Chunk`].
    pub fn read_chunk(&mut self, offset: u64, max_len: usize) -> Result<Chunk, TransferError> {
        let remaining = self.file_size.saturating_sub(offset);
        let mut data = vec![0u8; std::cmp::min(remaining, max_len as u64) as usize];
        let n = self.read_into(&mut data, offset)?;
        data.truncate(n);
        Ok(Chunk::new(offset, data))
    }

    /// Total file size in bytes, as observed when the file was opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Writes chunks at exact offsets into files under a base directory.
pub struct ChunkWriter {
    base_path: PathBuf,
}

impl ChunkWriter {
    /// Creates a writer rooted at `base_path`.
    pub fn new(base_path: &Path) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
        }
    }

    /// Writes `chunk` into `relative_path` at `chunk.offset`.
    ///
    /// - Rejects paths escaping the base directory.
    /// - Verifies the checksum if non-empty.
    /// - Creates intermediate directories as needed.
    ///
    /// Returns the offset one past the last written byte.
    pub fn write_chunk(&self, relative_path: &str, chunk: &Chunk) -> Result<u64, TransferError> {
        crate::validate_storage_path(relative_path)?;

        if !chunk.checksum.is_empty() && checksum_bytes(&chunk.data) != chunk.checksum {
            return Err(TransferError::ChecksumMismatch);
        }

        let full_path = self.base_path.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&full_path)?;
        file.seek(SeekFrom::Start(chunk.offset))?;
        file.write_all(&chunk.data)?;
        file.sync_data()?;

        Ok(chunk.end())
    }

    /// Returns the base output path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
