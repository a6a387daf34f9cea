//! PBKDF2-HMAC-SHA256 key derivation for volume unlock credentials.

use sha2::Sha256;

use crate::error::{ApfsError, Result};

pub const DERIVED_KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
pub const ITERATIONS: u32 = 10_000;

/// Derive a 32-byte key from a password and 16-byte salt, using the
/// default iteration count.
pub fn derive_key(password: &[u8], salt: &[u8]) -> Result<[u8; DERIVED_KEY_LEN]> {
    derive_key_with_iterations(password, salt, ITERATIONS)
}

/// Derive a 32-byte key using an iteration count read from the volume's
/// own unlock record rather than the default.
pub fn derive_key_with_iterations(password: &[u8], salt: &[u8], iterations: u32) -> Result<[u8; DERIVED_KEY_LEN]> {
    if password.is_empty() {
        return Err(ApfsError::InvalidInput("password must not be empty".into()));
    }
    if salt.is_empty() {
        return Err(ApfsError::InvalidInput("salt must not be empty".into()));
    }
    if iterations == 0 {
        return Err(ApfsError::InvalidInput("iteration count must not be zero".into()));
    }

    let mut out = [0u8; DERIVED_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_is_deterministic() {
        let a = derive_key(b"hunter2", &[0x42; SALT_LEN]).unwrap();
        let b = derive_key(b"hunter2", &[0x42; SALT_LEN]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_key_differs_by_salt() {
        let a = derive_key(b"hunter2", &[0x01; SALT_LEN]).unwrap();
        let b = derive_key(b"hunter2", &[0x02; SALT_LEN]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_empty_password() {
        assert!(derive_key(b"", &[0x01; SALT_LEN]).is_err());
    }

    #[test]
    fn test_rejects_empty_salt() {
        assert!(derive_key(b"hunter2", &[]).is_err());
    }
}
