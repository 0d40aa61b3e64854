use anyhow::{Context, Result};
use std::ops::RangeInclusive;
use std::sync::OnceLock;

/// Work factors bcrypt accepts.
const COST_RANGE: RangeInclusive<u32> = 4..=31;

/// bcrypt work factor; `BCRYPT_COST` overrides the default of 12.
fn cost() -> u32 {
    static COST: OnceLock<u32> = OnceLock::new();
    *COST.get_or_init(|| parse_cost(std::env::var("BCRYPT_COST").ok().as_deref()))
}

fn parse_cost(raw: Option<&str>) -> u32 {
    raw.and_then(|c| c.trim().parse().ok())
        .filter(|c| COST_RANGE.contains(c))
        .unwrap_or(bcrypt::DEFAULT_COST)
}

/// Hash a password using bcrypt
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, cost()).context("Failed to hash password")
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("Failed to verify password")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_not_plaintext_and_verifies() {
        let password = "Secret123";
        let hash = hash_password(password).unwrap();
        assert_ne!(hash, password);
        assert!(verify_password(password, &hash).unwrap());
    }

    #[test]
    fn wrong_password_fails() {
        let hash = hash_password("Correct123").unwrap();
        assert!(!verify_password("Wrong123", &hash).unwrap());
    }

    #[test]
    fn different_hashes_for_same_password() {
        let hash1 = hash_password("Same123pw").unwrap();
        let hash2 = hash_password("Same123pw").unwrap();
        // random salt
        assert_ne!(hash1, hash2);
        assert!(verify_password("Same123pw", &hash1).unwrap());
        assert!(verify_password("Same123pw", &hash2).unwrap());
    }

    #[test]
    fn cost_outside_bcrypt_range_falls_back_to_default() {
        assert_eq!(parse_cost(Some("4")), 4);
        assert_eq!(parse_cost(Some(" 10 ")), 10);
        assert_eq!(parse_cost(Some("3")), bcrypt::DEFAULT_COST);
        assert_eq!(parse_cost(Some("32")), bcrypt::DEFAULT_COST);
        assert_eq!(parse_cost(Some("cheap")), bcrypt::DEFAULT_COST);
        assert_eq!(parse_cost(None), bcrypt::DEFAULT_COST);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-bcrypt-hash").is_err());
    }
}
