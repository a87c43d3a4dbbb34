//! Password hashing utilities

use bcrypt::{hash, verify};

/// Default bcrypt work factor for new hashes.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Hash a password using bcrypt
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password, cost)
}

/// Verify a password against a stored hash.
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if password.is_empty() || hash.is_empty() {
        return false;
    }
    match verify(password, hash) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::warn!("Password verification failed: {}", e);
            false
        }
    }
}
