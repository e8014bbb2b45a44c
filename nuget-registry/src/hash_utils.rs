//! Cryptographic hashing utilities for content addressing
//!
//! Uploads are hashed while they stream into the staging buffer, so the
//! digests are available without a second pass over the data.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

/// Hex digests of one stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSummary {
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
}

/// Incremental hasher computing every digest in [`HashSummary`] at once.
#[derive(Clone, Default)]
pub struct MultiHasher {
    sha1: Sha1,
    sha256: Sha256,
    sha512: Sha512,
}

impl MultiHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.sha1.update(data);
        self.sha256.update(data);
        self.sha512.update(data);
    }

    pub fn finalize(self) -> HashSummary {
        HashSummary {
            sha1: format!("{:x}", self.sha1.finalize()),
            sha256: format!("{:x}", self.sha256.finalize()),
            sha512: format!("{:x}", self.sha512.finalize()),
        }
    }
}

/// Calculate every digest of an in-memory blob.
#[cfg(test)]
pub fn hash_summary(data: &[u8]) -> HashSummary {
    let mut hasher = MultiHasher::new();
    hasher.update(data);
    hasher.finalize()
}
