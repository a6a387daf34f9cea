//! Keybag parsing: the locker header and its entries, shared by the
//! container keybag and each volume's embedded keybag.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{ApfsError, Result};

pub const MAX_VOL_KEYBAG_ENTRY_SIZE: usize = 512;

pub const KB_TAG_UNKNOWN: u16 = 0;
pub const KB_TAG_RESERVED_1: u16 = 1;
pub const KB_TAG_VOLUME_KEY: u16 = 2;
pub const KB_TAG_VOLUME_UNLOCK_RECORDS: u16 = 3;
pub const KB_TAG_VOLUME_PASSPHRASE_HINT: u16 = 4;
pub const KB_TAG_WRAPPING_M_KEY: u16 = 5;
pub const KB_TAG_VOLUME_M_KEY: u16 = 6;
pub const KB_TAG_RESERVED_F8: u16 = 0xF8;

/// Distinguished UUIDs an unlock-records entry may carry instead of a
/// real volume UUID.
pub const APFS_FV_PERSONAL_RECOVERY_KEY_UUID: [u8; 16] = [
    0xEB, 0xC6, 0xC0, 0x64, 0x00, 0x00, 0x11, 0xAA,
    0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC,
];
pub const APFS_FV_INSTITUTIONAL_RECOVERY_KEY_UUID: [u8; 16] = [
    0x22, 0x40, 0x5C, 0x18, 0x00, 0x00, 0x11, 0xAA,
    0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC,
];
pub const APFS_FV_INSTITUTIONAL_USER_UUID: [u8; 16] = [
    0xC7, 0x38, 0x26, 0x16, 0x00, 0x00, 0x11, 0xAA,
    0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC,
];

/// Locker header (`kb_locker_t`): version, declared entry count, total
/// byte length of the entry area, and 8 bytes of reserved padding.
#[derive(Debug, Clone)]
pub struct KeybagLocker {
    pub version: u16,
    pub nkeys: u16,
    pub nbytes: u32,
    pub entries: Vec<KeybagEntry>,
}

/// One keybag entry (`kb_entry_t`): a UUID, a tag classifying its
/// purpose, and the wrapped key bytes themselves.
#[derive(Debug, Clone)]
pub struct KeybagEntry {
    pub uuid: [u8; 16],
    pub tag: u16,
    pub key_data: Vec<u8>,
}

impl KeybagEntry {
    pub fn is_volume_key(&self) -> bool {
        self.tag == KB_TAG_VOLUME_KEY
    }

    pub fn is_unlock_record(&self) -> bool {
        self.tag == KB_TAG_VOLUME_UNLOCK_RECORDS
    }

    pub fn is_personal_recovery(&self) -> bool {
        self.uuid == APFS_FV_PERSONAL_RECOVERY_KEY_UUID
    }

    pub fn is_institutional_recovery(&self) -> bool {
        self.uuid == APFS_FV_INSTITUTIONAL_RECOVERY_KEY_UUID
    }

    pub fn is_institutional_user(&self) -> bool {
        self.uuid == APFS_FV_INSTITUTIONAL_USER_UUID
    }
}

impl KeybagLocker {
    const HEADER_SIZE: usize = 16;

    /// `body` is the keybag payload after the object header.
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < Self::HEADER_SIZE {
            return Err(ApfsError::StructureTooSmall(
                "keybag locker header too short".into(),
            ));
        }
        let mut cursor = Cursor::new(body);
        let version = cursor.read_u16::<LittleEndian>()?;
        let nkeys = cursor.read_u16::<LittleEndian>()?;
        let nbytes = cursor.read_u32::<LittleEndian>()?;
        // 8 reserved bytes
        let mut reserved = [0u8; 8];
        std::io::Read::read_exact(&mut cursor, &mut reserved)?;

        let mut entries = Vec::with_capacity(nkeys as usize);
        let mut offset = Self::HEADER_SIZE;
        for _ in 0..nkeys {
            let (entry, consumed) = Self::parse_entry(&body[offset..])?;
            offset += consumed;
            entries.push(entry);
        }

        if entries.len() != nkeys as usize {
            return Err(ApfsError::IntegrityFailure(format!(
                "keybag declared {} entries, parsed {}", nkeys, entries.len()
            )));
        }

        Ok(KeybagLocker { version, nkeys, nbytes, entries })
    }

    fn parse_entry(data: &[u8]) -> Result<(KeybagEntry, usize)> {
        const ENTRY_HEADER_SIZE: usize = 24; // uuid(16) + tag(2) + key_len(2) + padding(4)
        if data.len() < ENTRY_HEADER_SIZE {
            return Err(ApfsError::StructureTooSmall("keybag entry header too short".into()));
        }
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&data[0..16]);
        let tag = u16::from_le_bytes([data[16], data[17]]);
        let key_len = u16::from_le_bytes([data[18], data[19]]) as usize;

        if key_len > MAX_VOL_KEYBAG_ENTRY_SIZE {
            return Err(ApfsError::IntegrityFailure(format!(
                "keybag entry key_len {} exceeds maximum {}", key_len, MAX_VOL_KEYBAG_ENTRY_SIZE
            )));
        }

        let key_start = ENTRY_HEADER_SIZE;
        let key_end = key_start + key_len;
        if key_end > data.len() {
            return Err(ApfsError::StructureTooSmall(
                "keybag entry key data extends past block".into(),
            ));
        }
        let key_data = data[key_start..key_end].to_vec();
        if key_data.len() != key_len {
            return Err(ApfsError::IntegrityFailure(
                "keybag entry key data length mismatch".into(),
            ));
        }

        // Entries are padded so the next one starts on a 16-byte boundary.
        let padded_key_len = (key_len + 15) & !15;
        let consumed = ENTRY_HEADER_SIZE + padded_key_len;
        Ok((KeybagEntry { uuid, tag, key_data }, consumed))
    }

    pub fn find_volume_key(&self, volume_uuid: &[u8; 16]) -> Option<&KeybagEntry> {
        self.entries.iter().find(|e| e.is_volume_key() && &e.uuid == volume_uuid)
    }

    pub fn unlock_records_for(&self, volume_uuid: &[u8; 16]) -> Vec<&KeybagEntry> {
        self.entries.iter().filter(|e| e.is_unlock_record() && &e.uuid == volume_uuid).collect()
    }
}

/// An unlock record's `key_data` is itself a small blob carrying the
/// KDF salt and iteration count alongside the RFC 3394-wrapped KEK, not
/// just the wrapped key on its own.
#[derive(Debug, Clone)]
pub struct UnlockRecordBlob<'a> {
    pub version: u16,
    pub iterations: u32,
    pub salt: [u8; 16],
    pub wrapped_kek: &'a [u8],
}

impl<'a> UnlockRecordBlob<'a> {
    const HEADER_SIZE: usize = 26; // version(2) + reserved(2) + salt(16) + iterations(4) + wrapped_len(2)

    pub fn parse(key_data: &'a [u8]) -> Result<Self> {
        if key_data.len() < Self::HEADER_SIZE {
            return Err(ApfsError::StructureTooSmall(
                "unlock record blob too short".into(),
            ));
        }
        let version = u16::from_le_bytes([key_data[0], key_data[1]]);
        let mut salt = [0u8; 16];
        salt.copy_from_slice(&key_data[4..20]);
        let iterations = u32::from_le_bytes(key_data[20..24].try_into().unwrap());
        let wrapped_len = u16::from_le_bytes([key_data[24], key_data[25]]) as usize;

        let wrapped_start = Self::HEADER_SIZE;
        let wrapped_end = wrapped_start + wrapped_len;
        if wrapped_end > key_data.len() {
            return Err(ApfsError::StructureTooSmall(
                "unlock record wrapped KEK extends past entry".into(),
            ));
        }

        Ok(UnlockRecordBlob { version, iterations, salt, wrapped_kek: &key_data[wrapped_start..wrapped_end] })
    }
}

#[cfg(test)]
mod unlock_record_tests {
    use super::*;

    fn build_blob(salt: [u8; 16], iterations: u32, wrapped_kek: &[u8]) -> Vec<u8> {
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
    fn test_parse_unlock_record_blob() {
        let salt = [0x7A; 16];
        let wrapped = [0xBEu8; 40];
        let blob = build_blob(salt, 20_000, &wrapped);

        let parsed = UnlockRecordBlob::parse(&blob).unwrap();
        assert_eq!(parsed.version, 5);
        assert_eq!(parsed.salt, salt);
        assert_eq!(parsed.iterations, 20_000);
        assert_eq!(parsed.wrapped_kek, &wrapped[..]);
    }

    #[test]
    fn test_rejects_truncated_blob() {
        assert!(UnlockRecordBlob::parse(&[0u8; 10]).is_err());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_entry(uuid: [u8; 16], tag: u16, key_data: &[u8]) -> Vec<u8> {
        let mut entry = Vec::new();
        entry.extend_from_slice(&uuid);
        entry.extend_from_slice(&tag.to_le_bytes());
        entry.extend_from_slice(&(key_data.len() as u16).to_le_bytes());
        entry.extend_from_slice(&[0u8; 4]);
        entry.extend_from_slice(key_data);
        let padded_len = (key_data.len() + 15) & !15;
        entry.extend(std::iter::repeat(0u8).take(padded_len - key_data.len()));
        entry
    }

    #[test]
    fn test_parse_locker_with_one_entry() {
        let uuid = [0x11; 16];
        let entry_bytes = build_entry(uuid, KB_TAG_VOLUME_KEY, &[0xAA; 40]);

        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes()); // version
        body.extend_from_slice(&1u16.to_le_bytes()); // nkeys
        body.extend_from_slice(&(entry_bytes.len() as u32).to_le_bytes());
        body.extend_from_slice(&[0u8; 8]);
        body.extend_from_slice(&entry_bytes);

        let locker = KeybagLocker::parse(&body).unwrap();
        assert_eq!(locker.entries.len(), 1);
        assert!(locker.entries[0].is_volume_key());
        assert_eq!(locker.find_volume_key(&uuid).unwrap().key_data, vec![0xAA; 40]);
    }

    #[test]
    fn test_parse_rejects_entry_count_mismatch() {
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes());
        body.extend_from_slice(&5u16.to_le_bytes()); // claims 5 entries
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&[0u8; 8]);
        // no entry data follows -> parse_entry will fail on first attempt
        assert!(KeybagLocker::parse(&body).is_err());
    }

    #[test]
    fn test_recognises_personal_recovery_uuid() {
        let entry_bytes = build_entry(APFS_FV_PERSONAL_RECOVERY_KEY_UUID, KB_TAG_VOLUME_UNLOCK_RECORDS, &[1, 2, 3, 4]);
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&(entry_bytes.len() as u32).to_le_bytes());
        body.extend_from_slice(&[0u8; 8]);
        body.extend_from_slice(&entry_bytes);

        let locker = KeybagLocker::parse(&body).unwrap();
        assert!(locker.entries[0].is_personal_recovery());
    }

    #[test]
    fn test_recognises_institutional_user_uuid() {
        let entry_bytes = build_entry(APFS_FV_INSTITUTIONAL_USER_UUID, KB_TAG_VOLUME_UNLOCK_RECORDS, &[5, 6, 7, 8]);
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&(entry_bytes.len() as u32).to_le_bytes());
        body.extend_from_slice(&[0u8; 8]);
        body.extend_from_slice(&entry_bytes);

        let locker = KeybagLocker::parse(&body).unwrap();
        assert!(locker.entries[0].is_institutional_user());
        assert!(!locker.entries[0].is_personal_recovery());
        assert!(!locker.entries[0].is_institutional_recovery());
    }

    #[test]
    fn test_rejects_oversized_entry() {
        let big_key = vec![0u8; MAX_VOL_KEYBAG_ENTRY_SIZE + 16];
        let entry_bytes = build_entry([0x22; 16], KB_TAG_VOLUME_KEY, &big_key);
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&(entry_bytes.len() as u32).to_le_bytes());
        body.extend_from_slice(&[0u8; 8]);
        body.extend_from_slice(&entry_bytes);

        assert!(KeybagLocker::parse(&body).is_err());
    }
}
