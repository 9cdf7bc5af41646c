//! Byte signatures for locating unnamed code.
//!
//! A signature is a sequence of fixed bytes and wildcard positions written
//! in the conventional space-separated hex form:
//!
//! ```text
//! C0 03 5F D6 00 ?? ?? 39 C0 03 5F D6
//! ```
//!
//! `??` matches any byte. Signatures are matched against raw mapped memory,
//! typically the tail of a module past a known anchor export.

use crate::domain::ResolveError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSignature {
    tokens: Vec<Option<u8>>,
}

impl ByteSignature {
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Check the signature against a window of exactly `len()` bytes.
    #[must_use]
    pub fn matches_at(&self, window: &[u8]) -> bool {
        window.len() >= self.tokens.len()
            && self
                .tokens
                .iter()
                .zip(window)
                .all(|(tok, byte)| tok.is_none_or(|expected| expected == *byte))
    }

    /// Offsets of every match within `haystack`, lazily.
    pub fn find_in<'a>(&'a self, haystack: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
        let width = self.tokens.len();
        (0..haystack.len().saturating_sub(width.saturating_sub(1)))
            .filter(move |&i| width > 0 && self.matches_at(&haystack[i..]))
    }
}

impl FromStr for ByteSignature {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = Vec::new();
        for part in s.split_whitespace() {
            if part == "??" || part == "?" {
                tokens.push(None);
            } else {
                let byte = u8::from_str_radix(part, 16)
                    .map_err(|_| ResolveError::Signature(format!("bad token '{part}'")))?;
                tokens.push(Some(byte));
            }
        }
        if tokens.is_empty() {
            return Err(ResolveError::Signature("empty signature".to_string()));
        }
        Ok(ByteSignature { tokens })
    }
}

impl fmt::Display for ByteSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tok) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match tok {
                Some(b) => write!(f, "{b:02X}")?,
                None => f.write_str("??")?,
            }
        }
        Ok(())
    }
}
