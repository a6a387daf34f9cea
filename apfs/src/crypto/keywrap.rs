//! RFC 3394 AES Key Wrap / Unwrap, used to protect volume encryption
//! keys inside a keybag entry under a derived or hardware KEK.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};

use crate::error::{ApfsError, Result};

const IV: u64 = 0xA6A6_A6A6_A6A6_A6A6;

enum Cipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl Cipher {
    fn new(kek: &[u8]) -> Result<Self> {
        match kek.len() {
            16 => Ok(Cipher::Aes128(Aes128::new_from_slice(kek).map_err(|_| {
                ApfsError::CryptoFailure("invalid 128-bit KEK".into())
            })?)),
            24 => Ok(Cipher::Aes192(Aes192::new_from_slice(kek).map_err(|_| {
                ApfsError::CryptoFailure("invalid 192-bit KEK".into())
            })?)),
            32 => Ok(Cipher::Aes256(Aes256::new_from_slice(kek).map_err(|_| {
                ApfsError::CryptoFailure("invalid 256-bit KEK".into())
            })?)),
            other => Err(ApfsError::CryptoFailure(format!(
                "KEK must be 16, 24 or 32 bytes, got {}", other
            ))),
        }
    }

    fn encrypt(&self, block: &mut [u8; 16]) {
        let ga = aes::cipher::generic_array::GenericArray::from_mut_slice(block);
        match self {
            Cipher::Aes128(c) => c.encrypt_block(ga),
            Cipher::Aes192(c) => c.encrypt_block(ga),
            Cipher::Aes256(c) => c.encrypt_block(ga),
        }
    }

    fn decrypt(&self, block: &mut [u8; 16]) {
        let ga = aes::cipher::generic_array::GenericArray::from_mut_slice(block);
        match self {
            Cipher::Aes128(c) => c.decrypt_block(ga),
            Cipher::Aes192(c) => c.decrypt_block(ga),
            Cipher::Aes256(c) => c.decrypt_block(ga),
        }
    }
}

fn validate_plaintext_len(data: &[u8]) -> Result<usize> {
    if data.is_empty() || data.len() % 8 != 0 {
        return Err(ApfsError::InvalidInput(
            "key data must be a non-zero multiple of 8 bytes".into(),
        ));
    }
    let n = data.len() / 8;
    if n < 2 {
        return Err(ApfsError::InvalidInput(
            "key wrap requires at least two 64-bit blocks".into(),
        ));
    }
    Ok(n)
}

/// Wrap `plaintext` (a multiple of 8 bytes, at least 16) under `kek`.
pub fn wrap(kek: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let n = validate_plaintext_len(plaintext)?;
    let cipher = Cipher::new(kek)?;

    let mut a = IV.to_be_bytes();
    let mut r: Vec<[u8; 8]> = (0..n)
        .map(|i| plaintext[i * 8..i * 8 + 8].try_into().unwrap())
        .collect();

    for j in 0..6u64 {
        for i in 0..n {
            let mut block = [0u8; 16];
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(&r[i]);
            cipher.encrypt(&mut block);

            let t = (n as u64) * j + (i as u64 + 1);
            let msb = u64::from_be_bytes(block[..8].try_into().unwrap()) ^ t;
            a = msb.to_be_bytes();
            r[i].copy_from_slice(&block[8..]);
        }
    }

    let mut out = Vec::with_capacity((n + 1) * 8);
    out.extend_from_slice(&a);
    for chunk in &r {
        out.extend_from_slice(chunk);
    }
    Ok(out)
}

/// Unwrap `ciphertext` (n+1 64-bit blocks) under `kek`. Fails with
/// `IntegrityFailure` if the recovered IV does not match.
pub fn unwrap(kek: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < 24 || ciphertext.len() % 8 != 0 {
        return Err(ApfsError::InvalidInput(
            "wrapped key data must hold at least 3 64-bit blocks".into(),
        ));
    }
    let n = ciphertext.len() / 8 - 1;
    let cipher = Cipher::new(kek)?;

    let mut a: [u8; 8] = ciphertext[0..8].try_into().unwrap();
    let mut r: Vec<[u8; 8]> = (0..n)
        .map(|i| ciphertext[(i + 1) * 8..(i + 2) * 8].try_into().unwrap())
        .collect();

    for j in (0..6u64).rev() {
        for i in (0..n).rev() {
            let t = (n as u64) * j + (i as u64 + 1);
            let a_val = u64::from_be_bytes(a) ^ t;

            let mut block = [0u8; 16];
            block[..8].copy_from_slice(&a_val.to_be_bytes());
            block[8..].copy_from_slice(&r[i]);
            cipher.decrypt(&mut block);

            a.copy_from_slice(&block[..8]);
            r[i].copy_from_slice(&block[8..]);
        }
    }

    if u64::from_be_bytes(a) != IV {
        return Err(ApfsError::IntegrityFailure(
            "key unwrap integrity check failed: IV mismatch".into(),
        ));
    }

    let mut out = Vec::with_capacity(n * 8);
    for chunk in &r {
        out.extend_from_slice(chunk);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap_round_trip_128() {
        let kek = [0x00u8; 16];
        let key_data = [0x11u8; 32];
        let wrapped = wrap(&kek, &key_data).unwrap();
        assert_eq!(wrapped.len(), 40);
        let unwrapped = unwrap(&kek, &wrapped).unwrap();
        assert_eq!(unwrapped, key_data);
    }

    #[test]
    fn test_wrap_unwrap_round_trip_256() {
        let kek = [0x7Au8; 32];
        let key_data = [0x22u8; 16];
        let wrapped = wrap(&kek, &key_data).unwrap();
        let unwrapped = unwrap(&kek, &wrapped).unwrap();
        assert_eq!(unwrapped, key_data);
    }

    #[test]
    fn test_unwrap_detects_corruption() {
        let kek = [0x00u8; 16];
        let key_data = [0x11u8; 16];
        let mut wrapped = wrap(&kek, &key_data).unwrap();
        wrapped[5] ^= 0xFF;
        assert!(unwrap(&kek, &wrapped).is_err());
    }

    #[test]
    fn test_wrap_rejects_bad_length() {
        let kek = [0x00u8; 16];
        assert!(wrap(&kek, &[0u8; 7]).is_err());
        assert!(wrap(&kek, &[0u8; 8]).is_err());
    }

    #[test]
    fn test_cipher_rejects_bad_kek_length() {
        let key_data = [0x11u8; 16];
        assert!(wrap(&[0u8; 20], &key_data).is_err());
    }
}
