//! Header offset transform.
//!
//! Light obfuscation: the first [`HEADER_BLOCK_SIZE`] bytes of a bundle are
//! repeated `(identifier length % factor) + 1` times in front of the file so
//! naive tools do not recognise the archive. A factor of 0 disables the
//! transform. Applying twice is a no-op: if the first two blocks already
//! match, the file is left alone.

use std::io;
use std::path::Path;

/// Size of the repeated header block.
pub const HEADER_BLOCK_SIZE: usize = 16;

/// Number of header blocks prepended for `id`.
pub fn offset_blocks(id: &str, factor: u32) -> usize {
    if factor == 0 {
        return 0;
    }
    id.len() % factor as usize + 1
}

/// Number of bytes prepended for `id`.
pub fn offset_len(id: &str, factor: u32) -> usize {
    offset_blocks(id, factor) * HEADER_BLOCK_SIZE
}

/// Check if the leading blocks show the transform was already applied.
pub fn is_applied(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_BLOCK_SIZE * 2
        && bytes[..HEADER_BLOCK_SIZE] == bytes[HEADER_BLOCK_SIZE..HEADER_BLOCK_SIZE * 2]
}

/// Apply the transform.
///
/// Returns `None` when nothing needs to change: the factor is 0, the data is
/// shorter than one block, or the transform is already present.
pub fn apply(bytes: &[u8], id: &str, factor: u32) -> Option<Vec<u8>> {
    let blocks = offset_blocks(id, factor);
    if blocks == 0 || bytes.len() < HEADER_BLOCK_SIZE || is_applied(bytes) {
        return None;
    }

    let header = &bytes[..HEADER_BLOCK_SIZE];
    let mut out = Vec::with_capacity(bytes.len() + blocks * HEADER_BLOCK_SIZE);
    for _ in 0..blocks {
        out.extend_from_slice(header);
    }
    out.extend_from_slice(bytes);
    Some(out)
}

/// Apply the transform to a file in place. Returns `true` if it was rewritten.
pub fn apply_file(path: &Path, id: &str, factor: u32) -> io::Result<bool> {
    let bytes = std::fs::read(path)?;
    match apply(&bytes, id, factor) {
        Some(shifted) => {
            std::fs::write(path, shifted)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Strip the transform, returning the original archive bytes.
///
/// Data without a matching prefix is returned unchanged.
pub fn strip<'a>(bytes: &'a [u8], id: &str, factor: u32) -> &'a [u8] {
    let blocks = offset_blocks(id, factor);
    let len = blocks * HEADER_BLOCK_SIZE;
    if blocks == 0 || bytes.len() < len + HEADER_BLOCK_SIZE {
        return bytes;
    }

    let header = &bytes[len..len + HEADER_BLOCK_SIZE];
    let prefixed = bytes[..len]
        .chunks_exact(HEADER_BLOCK_SIZE)
        .all(|block| block == header);

    if prefixed { &bytes[len..] } else { bytes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0u8..64).collect()
    }

    #[test]
    fn test_offset_blocks() {
        assert_eq!(offset_blocks("abcde", 0), 0);
        assert_eq!(offset_blocks("abcde", 3), 3);
        assert_eq!(offset_blocks("abcdef", 3), 1);
    }

    #[test]
    fn test_apply_and_strip() {
        let data = sample();
        let shifted = apply(&data, "abcde", 3).unwrap();
        assert_eq!(shifted.len(), data.len() + 3 * HEADER_BLOCK_SIZE);
        assert!(is_applied(&shifted));
        assert_eq!(strip(&shifted, "abcde", 3), &data[..]);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let shifted = apply(&sample(), "abcdef", 3).unwrap();
        assert!(apply(&shifted, "abcdef", 3).is_none());
    }

    #[test]
    fn test_short_data_is_noop() {
        assert!(apply(&[1, 2, 3], "abc", 4).is_none());
    }

    #[test]
    fn test_strip_without_prefix_is_identity() {
        let data = sample();
        assert_eq!(strip(&data, "abcde", 3), &data[..]);
        assert_eq!(strip(&data, "abcde", 0), &data[..]);
    }

    #[test]
    fn test_apply_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bundle");
        std::fs::write(&path, sample()).unwrap();

        assert!(apply_file(&path, "x.bundle", 2).unwrap());
        assert!(!apply_file(&path, "x.bundle", 2).unwrap());

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(strip(&bytes, "x.bundle", 2), &sample()[..]);
    }
}
