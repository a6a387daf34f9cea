//! Crypto-state catalog record reader (`j_crypto_val_t`).

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{ApfsError, Result};

use super::protection_class;

pub const MAX_WRAPPED_KEYSIZE: usize = 128;
const EXPECTED_MAJOR_VERSION: u16 = 5;

/// A crypto-state record: the wrapped per-file key and the protection
/// class/OS metadata it was wrapped under.
#[derive(Debug, Clone)]
pub struct CryptoStateVal {
    pub refcnt: u32,
    pub major: u16,
    pub minor: u16,
    pub flags: u32,
    pub protection_class: u32,
    pub os_version: u32,
    pub key_revision: u16,
    pub key_length: u16,
    pub wrapped_key_data: Vec<u8>,
}

impl CryptoStateVal {
    const FIXED_SIZE: usize = 24;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::FIXED_SIZE {
            return Err(ApfsError::CorruptedData(
                format!("crypto state value too short: {} bytes", data.len()),
            ));
        }
        let mut cursor = Cursor::new(data);
        let refcnt = cursor.read_u32::<LittleEndian>()?;
        let major = cursor.read_u16::<LittleEndian>()?;
        let minor = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;
        let protection_class = cursor.read_u32::<LittleEndian>()?;
        let os_version = cursor.read_u32::<LittleEndian>()?;
        let key_revision = cursor.read_u16::<LittleEndian>()?;
        let key_length = cursor.read_u16::<LittleEndian>()?;

        let start = Self::FIXED_SIZE;
        let end = start + key_length as usize;
        if end > data.len() {
            return Err(ApfsError::StructureTooSmall(
                "wrapped key data extends past crypto state value".into(),
            ));
        }
        let wrapped_key_data = data[start..end].to_vec();

        Ok(CryptoStateVal {
            refcnt,
            major,
            minor,
            flags,
            protection_class,
            os_version,
            key_revision,
            key_length,
            wrapped_key_data,
        })
    }

    /// Non-zero refcount, recognised protection class, major = 5,
    /// key_length within the declared maximum.
    pub fn is_valid(&self) -> bool {
        self.refcnt != 0
            && protection_class::resolve(self.protection_class).is_some()
            && self.major == EXPECTED_MAJOR_VERSION
            && self.key_length as usize <= MAX_WRAPPED_KEYSIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(refcnt: u32, major: u16, protection_class: u32, key_len: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&refcnt.to_le_bytes());
        data.extend_from_slice(&major.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&protection_class.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&key_len.to_le_bytes());
        data.extend(std::iter::repeat(0u8).take(key_len as usize));
        data
    }

    #[test]
    fn test_valid_crypto_state() {
        let data = build(1, 5, 1, 40);
        let state = CryptoStateVal::parse(&data).unwrap();
        assert!(state.is_valid());
    }

    #[test]
    fn test_invalid_refcount_zero() {
        let data = build(0, 5, 1, 40);
        let state = CryptoStateVal::parse(&data).unwrap();
        assert!(!state.is_valid());
    }

    #[test]
    fn test_invalid_unknown_protection_class() {
        let data = build(1, 5, 99, 40);
        let state = CryptoStateVal::parse(&data).unwrap();
        assert!(!state.is_valid());
    }

    #[test]
    fn test_invalid_wrong_major_version() {
        let data = build(1, 3, 1, 40);
        let state = CryptoStateVal::parse(&data).unwrap();
        assert!(!state.is_valid());
    }

    #[test]
    fn test_invalid_key_too_long() {
        let data = build(1, 5, 1, (MAX_WRAPPED_KEYSIZE + 1) as u16);
        let state = CryptoStateVal::parse(&data).unwrap();
        assert!(!state.is_valid());
    }
}
