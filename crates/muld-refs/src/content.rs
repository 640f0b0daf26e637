use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RefError, Result};

/// Hex lengths accepted for a content identifier: SHA-1 (git default) and
/// 32-byte hashes (SHA-256 object format, BLAKE3).
const ACCEPTED_HEX_LENGTHS: [usize; 2] = [40, 64];

/// Opaque identifier of a version-controlled snapshot.
///
/// Stored as lowercase hex. muld never interprets the hash; it only compares
/// identifiers for equality and passes them back to the transport.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Parse and normalise a hex identifier.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if !ACCEPTED_HEX_LENGTHS.contains(&trimmed.len()) {
            return Err(RefError::InvalidContentId {
                value: s.to_string(),
                reason: format!(
                    "expected {} hex characters, got {}",
                    ACCEPTED_HEX_LENGTHS
                        .iter()
                        .map(|n| n.to_string())
                        .collect::<Vec<_>>()
                        .join(" or "),
                    trimmed.len()
                ),
            });
        }
        hex::decode(trimmed).map_err(|e| RefError::InvalidContentId {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Derive an identifier from raw content with BLAKE3.
    ///
    /// Used by the in-memory transport to mint identifiers for synthetic
    /// commits.
    pub fn from_data(data: &[u8]) -> Self {
        Self(blake3::hash(data).to_hex().to_string())
    }

    /// Full hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for human output (first 8 characters).
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.short())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentId {
    type Error = RefError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}
