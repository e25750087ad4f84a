//! Hashing utilities for checksums and fingerprinting.

use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA256 hash of a string.
pub fn sha256_str(s: &str) -> String {
    sha256_bytes(s.as_bytes())
}

/// A hasher for building fingerprints from multiple components.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    /// Create a new fingerprint builder.
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component to the fingerprint.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0"); // Separator
        self
    }

    /// Add a key/value pair.
    pub fn update_pair(&mut self, key: &str, value: &str) -> &mut Self {
        self.update_str(key).update_str(value)
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
