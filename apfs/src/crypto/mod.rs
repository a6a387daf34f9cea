//! Crypto subsystem: protection classes, crypto-state records, keybags,
//! key derivation, RFC 3394 key wrap, AES-XTS-like block decryption and
//! the personal recovery key codec.

pub mod crypto_state;
pub mod keybag;
pub mod kdf;
pub mod keywrap;
pub mod protection_class;
pub mod recovery_key;

use zeroize::Zeroize;

use crate::error::{ApfsError, Result};

/// A credential a caller offers to unlock a volume.
pub enum Credential {
    Password(String),
    RecoveryKey(String),
}

/// An unwrapped volume encryption key. Owned by the immediate caller
/// and zeroised on drop.
pub struct UnwrappedVek {
    bytes: Vec<u8>,
}

impl UnwrappedVek {
    pub fn new(bytes: Vec<u8>) -> Self {
        UnwrappedVek { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for UnwrappedVek {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Attempt every unlock-record entry in `locker` matching `volume_uuid`
/// against `credential`, returning the first successfully unwrapped key.
pub fn unlock_volume_key(
    locker: &keybag::KeybagLocker,
    volume_uuid: &[u8; 16],
    credential: &Credential,
) -> Result<UnwrappedVek> {
    let records = locker.unlock_records_for(volume_uuid);
    if records.is_empty() {
        return Err(ApfsError::NotFound(
            "no unlock records for this volume in the keybag".into(),
        ));
    }

    for record in records {
        let blob = match keybag::UnlockRecordBlob::parse(&record.key_data) {
            Ok(b) => b,
            Err(_) => continue,
        };

        let kek = match credential {
            Credential::Password(p) => kdf::derive_key_with_iterations(p.as_bytes(), &blob.salt, blob.iterations)?,
            Credential::RecoveryKey(s) => {
                let raw = recovery_key::decode(s)?;
                kdf::derive_key_with_iterations(&raw, &blob.salt, blob.iterations)?
            }
        };

        if let Ok(unwrapped) = keywrap::unwrap(&kek, blob.wrapped_kek) {
            return Ok(UnwrappedVek::new(unwrapped));
        }
    }

    Err(ApfsError::CryptoFailure(
        "no unlock record could be unwrapped with the supplied credential".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_volume_key_fails_with_no_records() {
        let locker = keybag::KeybagLocker {
            version: 2,
            nkeys: 0,
            nbytes: 0,
            entries: Vec::new(),
        };
        let result = unlock_volume_key(&locker, &[0u8; 16], &Credential::Password("x".into()));
        assert!(result.is_err());
    }

    fn build_unlock_record_key_data(salt: [u8; 16], iterations: u32, wrapped_kek: &[u8]) -> Vec<u8> {
        let mut blob = Vec::new();
        blob.extend_from_slice(&5u16.to_le_bytes());
        blob.extend_from_slice(&0u16.to_le_bytes());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&iterations.to_le_bytes());
        blob.extend_from_slice(&(wrapped_kek.len() as u16).to_le_bytes());
        blob.extend_from_slice(wrapped_kek);
        blob
    }

    #[test]
    fn test_unlock_volume_key_succeeds_with_matching_password() {
        let volume_uuid = [0x09; 16];
        let salt = [0x11; 16];
        let iterations = 1_000;
        let vek = [0x42u8; 32];

        let kek = kdf::derive_key_with_iterations(b"hunter2", &salt, iterations).unwrap();
        let wrapped_kek = keywrap::wrap(&kek, &vek).unwrap();
        let key_data = build_unlock_record_key_data(salt, iterations, &wrapped_kek);

        let locker = keybag::KeybagLocker {
            version: 2,
            nkeys: 1,
            nbytes: key_data.len() as u32,
            entries: vec![keybag::KeybagEntry { uuid: volume_uuid, tag: keybag::KB_TAG_VOLUME_UNLOCK_RECORDS, key_data }],
        };

        let unwrapped = unlock_volume_key(&locker, &volume_uuid, &Credential::Password("hunter2".into())).unwrap();
        assert_eq!(unwrapped.as_bytes(), &vek[..]);
    }

    #[test]
    fn test_unlock_volume_key_fails_with_wrong_password() {
        let volume_uuid = [0x0A; 16];
        let salt = [0x22; 16];
        let iterations = 1_000;
        let vek = [0x42u8; 32];

        let kek = kdf::derive_key_with_iterations(b"correct horse", &salt, iterations).unwrap();
        let wrapped_kek = keywrap::wrap(&kek, &vek).unwrap();
        let key_data = build_unlock_record_key_data(salt, iterations, &wrapped_kek);

        let locker = keybag::KeybagLocker {
            version: 2,
            nkeys: 1,
            nbytes: key_data.len() as u32,
            entries: vec![keybag::KeybagEntry { uuid: volume_uuid, tag: keybag::KB_TAG_VOLUME_UNLOCK_RECORDS, key_data }],
        };

        let result = unlock_volume_key(&locker, &volume_uuid, &Credential::Password("wrong guess".into()));
        assert!(result.is_err());
    }
}
