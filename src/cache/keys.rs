//! Cache key definitions
//!
//! Report keys come in two styles. Hashed keys append a digest of the fully
//! rendered statement to a seed, so any parameter that changes the SQL
//! changes the key, and two requests rendering byte-identical SQL share an
//! entry. Literal keys are supplied whole by the caller when the seed is
//! already unique per parameterization (`upcoming_renewals_30`).

use sha2::{Digest, Sha256};
use std::fmt;

/// Suffix applied to keys while reports run against the mirror store
pub const DEV_SUFFIX: &str = "_dev";

/// Final cache key for one report statement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Seed plus a digest of the rendered statement
    pub fn hashed(seed: &str, statement: &str) -> Self {
        Self(format!("{}{}", seed, statement_digest(statement)))
    }

    /// Caller-provided key, used as is
    pub fn literal(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Same key in the mirror-store namespace
    pub fn for_dev_mode(&self) -> Self {
        Self(format!("{}{}", self.0, DEV_SUFFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex digest of a statement (first 16 bytes of SHA-256)
pub fn statement_digest(statement: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(statement.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashed_key_deterministic() {
        let a = CacheKey::hashed("revenue_by_month_", "SELECT 1");
        let b = CacheKey::hashed("revenue_by_month_", "SELECT 1");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("revenue_by_month_"));
        assert_eq!(a.as_str().len(), "revenue_by_month_".len() + 32);
    }

    #[test]
    fn test_different_statements_different_keys() {
        let a = CacheKey::hashed("x_", "SELECT 1 WHERE d >= '2024-01-01'");
        let b = CacheKey::hashed("x_", "SELECT 1 WHERE d >= '2024-02-01'");
        assert_ne!(a, b);
    }

    #[test]
    fn test_literal_and_dev_suffix() {
        let key = CacheKey::literal("upcoming_renewals_30");
        assert_eq!(key.as_str(), "upcoming_renewals_30");
        assert_eq!(key.for_dev_mode().as_str(), "upcoming_renewals_30_dev");
        assert_eq!(key.to_string(), "upcoming_renewals_30");
    }
}
