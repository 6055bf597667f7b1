use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of hex digits in a block hash (MD5).
pub const HASH_HEX_LEN: usize = 32;

/// Locator of the zero-length block. Streams that reference no data carry
/// this token so their manifest line stays well-formed.
pub const EMPTY_BLOCK_LOCATOR: &str = "d41d8cd98f00b204e9800998ecf8427e+0";

/// Content-addressed reference to a stored block.
///
/// Text form is `<hash>[+<size>](+<hint>)*`. The hash is the lowercase hex
/// MD5 of the block contents. Hints (permission signatures, replication
/// markers) are carried verbatim and never interpreted.
///
/// Equality covers the hash, the size and every hint. Two locators naming
/// identical bytes with different hints are different locators.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    hash: String,
    size: Option<u64>,
    hints: Vec<String>,
}

impl Locator {
    /// Compute the locator of a block from its contents.
    pub fn for_data(data: &[u8]) -> Self {
        Self {
            hash: format!("{:x}", md5::compute(data)),
            size: Some(data.len() as u64),
            hints: Vec::new(),
        }
    }

    /// The locator of the zero-length block.
    pub fn empty_block() -> Self {
        Self::for_data(&[])
    }

    /// Parse a locator token.
    pub fn parse(token: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidLocator {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        if token.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let mut parts = token.split('+');
        let hash = parts.next().unwrap_or_default();
        validate_hash(hash)?;

        let mut size = None;
        let mut hints = Vec::new();
        for (i, part) in parts.enumerate() {
            if part.is_empty() {
                return Err(invalid("empty field"));
            }
            if i == 0 && part.bytes().all(|b| b.is_ascii_digit()) {
                size = Some(part.parse().map_err(|_| invalid("size out of range"))?);
            } else {
                hints.push(part.to_string());
            }
        }

        Ok(Self {
            hash: hash.to_string(),
            size,
            hints,
        })
    }

    /// Lowercase hex MD5 of the block contents.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Block size in bytes, when the locator carries one.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Opaque hint tokens, in order.
    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    /// Returns a copy with `hint` appended.
    pub fn with_hint(&self, hint: impl Into<String>) -> Result<Self, TypeError> {
        let hint = hint.into();
        validate_hint(&self.hash, &hint)?;
        let mut out = self.clone();
        out.hints.push(hint);
        Ok(out)
    }

    /// Returns `true` if the contents of `data` match this locator's hash
    /// and (when present) size.
    pub fn matches(&self, data: &[u8]) -> bool {
        if let Some(size) = self.size {
            if size != data.len() as u64 {
                return false;
            }
        }
        format!("{:x}", md5::compute(data)) == self.hash
    }
}

fn validate_hash(hash: &str) -> Result<(), TypeError> {
    if hash.len() != HASH_HEX_LEN {
        return Err(TypeError::InvalidLength {
            expected: HASH_HEX_LEN,
            actual: hash.len(),
        });
    }
    if hash.bytes().any(|b| b.is_ascii_uppercase()) {
        return Err(TypeError::InvalidHex(format!("{hash} is not lowercase")));
    }
    hex::decode(hash).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
    Ok(())
}

fn validate_hint(hash: &str, hint: &str) -> Result<(), TypeError> {
    if hint.is_empty() || hint.contains('+') || hint.chars().any(char::is_whitespace) {
        return Err(TypeError::InvalidLocator {
            token: format!("{hash}+{hint}"),
            reason: format!("invalid hint {hint:?}"),
        });
    }
    Ok(())
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)?;
        if let Some(size) = self.size {
            write!(f, "+{size}")?;
        }
        for hint in &self.hints {
            write!(f, "+{hint}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({self})")
    }
}

impl FromStr for Locator {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Locator {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}
