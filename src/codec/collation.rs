//! Collation sequences
//!
//! A collation defines the sort order of text values by mapping each string
//! to a byte sort key; two strings compare the way their sort keys compare
//! under unsigned memcmp. This is what lets encoded keys carry collated text
//! while remaining plain byte strings.
//!
//! Sort keys may contain any byte values, including 0x00 and 0xFF: the key
//! codec escapes the body before appending its terminator.

use std::cmp::Ordering;
use std::sync::Arc;

/// Collation sequence producing byte sort keys.
#[derive(Clone, Default)]
pub enum Collation {
    /// Byte-for-byte comparison of the UTF-8 encoding (default).
    #[default]
    Binary,
    /// Case-insensitive comparison for ASCII.
    NoCase,
    /// Ignore trailing spaces.
    RTrim,
    /// Custom collation with name and sort-key function.
    Custom {
        name: String,
        sort_key: Arc<dyn Fn(&str) -> Vec<u8> + Send + Sync>,
    },
}

impl Collation {
    /// Produce the sort key for a string.
    pub fn sort_key(&self, s: &str) -> Vec<u8> {
        match self {
            Collation::Binary => s.as_bytes().to_vec(),
            Collation::NoCase => s.bytes().map(|b| b.to_ascii_lowercase()).collect(),
            Collation::RTrim => s.trim_end_matches(' ').as_bytes().to_vec(),
            Collation::Custom { sort_key, .. } => sort_key(s),
        }
    }

    /// Compare two strings under this collation.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.sort_key(a).cmp(&self.sort_key(b))
    }

    /// True when the sort key is just the UTF-8 bytes, so decoding a key
    /// field can recover the original string.
    pub fn is_binary(&self) -> bool {
        matches!(self, Collation::Binary)
    }

    /// Get the name of this collation.
    pub fn name(&self) -> &str {
        match self {
            Collation::Binary => "BINARY",
            Collation::NoCase => "NOCASE",
            Collation::RTrim => "RTRIM",
            Collation::Custom { name, .. } => name,
        }
    }
}

impl std::fmt::Debug for Collation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Collation({})", self.name())
    }
}
