// ABOUTME: Cheap content fingerprint used by the ledger to detect "nothing changed" republishes.
// ABOUTME: 64-bit FNV-1a over the full content, paired with the content length.

use std::fmt;

use serde::{Deserialize, Serialize};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic, non-cryptographic fingerprint of published content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint the given content.
    pub fn of(content: &str) -> Self {
        Self(format!(
            "{:016x}-{}",
            fnv1a_64(content.as_bytes()),
            content.len()
        ))
    }

    /// Rebuild a fingerprint previously rendered with [`as_str`](Self::as_str).
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
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

fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
