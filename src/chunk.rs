//! Overlapping fixed-window text chunker.
//!
//! Splits page text into windows of `size` characters where each window
//! starts `size - overlap` characters after the previous one. Lengths are
//! counted in `char`s, so windows never split a UTF-8 sequence.
//!
//! # Guarantees
//!
//! - No chunk is empty; empty text yields no chunks.
//! - Every chunk has at most `size` chars; only the last may be shorter.
//! - Consecutive chunks share exactly `overlap` chars.
//! - Dropping the first `overlap` chars of every chunk after the first and
//!   concatenating reproduces the input.
//!
//! # Example
//!
//! ```rust
//! use midnight_diner::chunk::Chunker;
//!
//! let chunker = Chunker::new(4, 1).unwrap();
//! let chunks: Vec<&str> = chunker.chunks("abcdefgh").collect();
//! assert_eq!(chunks, vec!["abcd", "defg", "gh"]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::ConfigError;

/// Default window size, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between consecutive windows, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Window parameters for splitting text. Cheap to copy and share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker, rejecting parameters where `overlap >= size`.
    pub fn new(size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if size == 0 || overlap >= size {
            return Err(ConfigError::InvalidConfiguration { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    /// Lazily split `text` into windows. Call again to restart.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            size: self.size,
            step: self.size - self.overlap,
            start: if text.is_empty() { None } else { Some(0) },
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Iterator over the windows of one text. Borrowed from [`Chunker::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    size: usize,
    step: usize,
    /// Byte offset of the next window, `None` once exhausted.
    start: Option<usize>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let start = self.start?;
        let rest = &self.text[start..];

        let end = byte_offset(rest, self.size).map_or(self.text.len(), |o| start + o);
        self.start = if end == self.text.len() {
            None
        } else {
            byte_offset(rest, self.step).map(|o| start + o)
        };

        Some(&self.text[start..end])
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Byte offset of the `n`th char of `s`, or `None` if `s` has `n` chars or fewer.
fn byte_offset(s: &str, n: usize) -> Option<usize> {
    s.char_indices().nth(n).map(|(i, _)| i)
}

/// SHA-256 of chunk text, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(chunks: &[&str], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(c);
            } else {
                out.extend(c.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(matches!(
            Chunker::new(10, 10),
            Err(ConfigError::InvalidConfiguration {
                size: 10,
                overlap: 10
            })
        ));
        assert!(Chunker::new(10, 12).is_err());
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = Chunker::new(500, 100).unwrap();
        let chunks: Vec<&str> = chunker.chunks("Hello, world!").collect();
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_exact_window_single_chunk() {
        let chunker = Chunker::new(5, 2).unwrap();
        let chunks: Vec<&str> = chunker.chunks("abcde").collect();
        assert_eq!(chunks, vec!["abcde"]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        let chunker = Chunker::default();
        assert_eq!(chunker.chunks("").count(), 0);
    }

    #[test]
    fn test_windows_and_overlap() {
        let chunker = Chunker::new(4, 1).unwrap();
        let chunks: Vec<&str> = chunker.chunks("abcdefghij").collect();
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_properties_hold_across_parameters() {
        let text = "The quiet diner hums after midnight. Coffee, pie, and a patient ear. \
                    Ünïcödé čhäracters — and emoji 🌙☕ — must never be split.";
        for size in 1..40 {
            for overlap in 0..size {
                let chunker = Chunker::new(size, overlap).unwrap();
                let chunks: Vec<&str> = chunker.chunks(text).collect();

                assert!(!chunks.is_empty());
                assert_eq!(reassemble(&chunks, overlap), text, "size={size} overlap={overlap}");

                for c in &chunks {
                    assert!(!c.is_empty());
                    assert!(c.chars().count() <= size);
                }
                for c in &chunks[..chunks.len() - 1] {
                    assert_eq!(c.chars().count(), size);
                }
                for pair in chunks.windows(2) {
                    let tail: String = pair[0].chars().skip(size - overlap).collect();
                    let head: String = pair[1].chars().take(overlap).collect();
                    assert_eq!(tail, head, "size={size} overlap={overlap}");
                }
            }
        }
    }

    #[test]
    fn test_restartable() {
        let chunker = Chunker::new(8, 3).unwrap();
        let text = "one two three four five six";
        let first: Vec<&str> = chunker.chunks(text).collect();
        let second: Vec<&str> = chunker.chunks(text).collect();
        assert_eq!(first, second);

        let mut iter = chunker.chunks(text);
        iter.next();
        let resumed = iter.clone();
        assert_eq!(iter.collect::<Vec<_>>(), resumed.collect::<Vec<_>>());
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }
}
