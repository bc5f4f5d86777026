use serde::{Deserialize, Serialize};

use crate::chunked::checksum_bytes;

/// A contiguous slice of a local file read for one range upload.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data` (empty means no verification).
    pub checksum: String,
}

impl Chunk {
    /// Creates a chunk and computes its checksum.
    pub fn new(offset: u64, data: Vec<u8>) -> Self {
        let checksum = checksum_bytes(&data);
        Self {
            offset,
            data,
            checksum,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset one past the last byte of this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// Byte range a remote confirms as durably stored for a session.
///
/// Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedRange {
    pub start: u64,
    pub end: u64,
}

impl CommittedRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Sorts, clamps and merges committed ranges reported by a remote.
///
/// The result is ascending, non-overlapping and non-adjacent, and every
/// range lies within `[0, total_bytes)`. Inverted ranges and ranges
/// starting past the end of the file are dropped.
pub fn normalize_ranges(ranges: &[CommittedRange], total_bytes: u64) -> Vec<CommittedRange> {
    if total_bytes == 0 {
        return Vec::new();
    }
    let last = total_bytes - 1;

    let mut sorted: Vec<CommittedRange> = ranges
        .iter()
        .filter(|r| !r.is_empty() && r.start <= last)
        .map(|r| CommittedRange::new(r.start, r.end.min(last)))
        .collect();
    sorted.sort_by_key(|r| (r.start, r.end));

    let mut merged: Vec<CommittedRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(prev) if range.start <= prev.end.saturating_add(1) => {
                prev.end = prev.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u64, end: u64) -> CommittedRange {
        CommittedRange::new(start, end)
    }

    #[test]
    fn chunk_new_computes_checksum() {
        let chunk = Chunk::new(10, b"abc".to_vec());
        assert_eq!(chunk.checksum, checksum_bytes(b"abc"));
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.end(), 13);
    }

    #[test]
    fn range_len_is_inclusive() {
        assert_eq!(r(0, 999).len(), 1000);
        assert_eq!(r(5, 5).len(), 1);
    }

    #[test]
    fn normalize_keeps_well_formed_input() {
        let input = vec![r(0, 9), r(20, 29)];
        assert_eq!(normalize_ranges(&input, 100), input);
    }

    #[test]
    fn normalize_sorts_unordered_ranges() {
        let input = vec![r(50, 59), r(0, 9)];
        assert_eq!(normalize_ranges(&input, 100), vec![r(0, 9), r(50, 59)]);
    }

    #[test]
    fn normalize_merges_overlapping_and_adjacent() {
        let input = vec![r(0, 9), r(5, 14), r(15, 19), r(40, 49)];
        assert_eq!(normalize_ranges(&input, 100), vec![r(0, 19), r(40, 49)]);
    }

    #[test]
    fn normalize_clamps_to_file_size() {
        let input = vec![r(90, 150), r(200, 300)];
        assert_eq!(normalize_ranges(&input, 100), vec![r(90, 99)]);
    }

    #[test]
    fn normalize_drops_inverted_ranges() {
        let input = vec![r(10, 5), r(20, 25)];
        assert_eq!(normalize_ranges(&input, 100), vec![r(20, 25)]);
    }

    #[test]
    fn normalize_empty_file_has_no_ranges() {
        assert!(normalize_ranges(&[r(0, 0)], 0).is_empty());
    }

    #[test]
    fn range_serializes_as_start_end() {
        let json = serde_json::to_string(&r(0, 999)).unwrap();
        assert_eq!(json, r#"{"start":0,"end":999}"#);
    }
}
