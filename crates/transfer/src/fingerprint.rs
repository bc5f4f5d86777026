use std::fmt;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::TransferError;

/// Read buffer used while streaming a file into the digest.
const STREAM_BUFFER: usize = 64 * 1024;

/// Content-addressed identity of an upload: bucket key, object key and file bytes.
///
/// Used only as a lookup key for resumable sessions. It is not a credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an existing hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of `path` as destined for `bucket_key`/`object_key`.
///
/// The key bytes go into the digest before the file content, so identical
/// content under different destinations yields different fingerprints.
/// The file is streamed; it is never loaded whole.
pub fn fingerprint(
    bucket_key: &str,
    object_key: &str,
    path: &Path,
) -> Result<Fingerprint, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    hasher.update(bucket_key.as_bytes());
    hasher.update(object_key.as_bytes());

    let mut buf = vec![0u8; STREAM_BUFFER];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint(hex::encode(hasher.finalize())))
}
