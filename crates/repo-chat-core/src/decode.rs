//! Text decoding with an ordered encoding fallback.
//!
//! Source files are read as bytes and decoded with the first encoding in
//! the list that accepts them. The default list is UTF-8 then ISO-8859-1.
//! Latin-1 maps every byte to the code point of the same value, so with the
//! default list decoding always succeeds. Binary files are therefore decoded
//! as if they were text.

use std::fmt;
use std::str::FromStr;

/// A supported text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// ISO-8859-1. Accepts every byte sequence.
    Latin1,
}

impl Encoding {
    /// Decode `bytes`, or `None` if they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            Encoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "iso-8859-1",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "iso-8859-1" | "latin-1" | "latin1" => Ok(Encoding::Latin1),
            other => Err(format!(
                "unknown encoding '{}'. Must be utf-8 or iso-8859-1.",
                other
            )),
        }
    }
}

/// The default fallback order.
pub const DEFAULT_ENCODINGS: [Encoding; 2] = [Encoding::Utf8, Encoding::Latin1];

/// Outcome of [`decode_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Decoded successfully with `encoding`.
    Text { text: String, encoding: Encoding },
    /// No encoding in the list accepted the bytes.
    Failed,
}

/// Try each encoding in order and return the first success.
pub fn decode_with(bytes: &[u8], encodings: &[Encoding]) -> Decoded {
    for &encoding in encodings {
        if let Some(text) = encoding.decode(bytes) {
            return Decoded::Text { text, encoding };
        }
    }
    Decoded::Failed
}
