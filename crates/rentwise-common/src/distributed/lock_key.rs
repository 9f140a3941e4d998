use serde::{Deserialize, Serialize};
use std::fmt;

/// A 64-bit key identifying an advisory lock.
///
/// PostgreSQL advisory locks are keyed by a single `bigint`. Well-known locks use
/// the constants below; per-resource locks derive their key from a stable hash of
/// the resource identifiers so every process agrees on the key without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockKey(i64);

impl LockKey {
    /// Serialises schema migrations across concurrently starting deployments.
    pub const MIGRATIONS: LockKey = LockKey::new(0x0052_E47A_0001);

    pub const fn new(key: i64) -> Self {
        Self(key)
    }

    /// Key guarding the inventory of one product, or one variant of it.
    ///
    /// The base product (no variant) and each variant get distinct keys, so
    /// confirmations against different variants of the same product never block
    /// each other.
    pub fn for_inventory(product_id: &str, variant_id: Option<&str>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"inventory\0");
        hasher.update(product_id.as_bytes());
        match variant_id {
            Some(variant) => {
                hasher.update(b"\0variant\0");
                hasher.update(variant.as_bytes());
            }
            None => {
                hasher.update(b"\0base");
            }
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        Self(i64::from_be_bytes(prefix))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}
