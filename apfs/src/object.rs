use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::error::{ApfsError, Result};
use crate::fletcher;

// Object type constants (lower 16 bits of type_and_flags)
pub const OBJECT_TYPE_NX_SUPERBLOCK: u32 = 0x01;
pub const OBJECT_TYPE_BTREE: u32 = 0x02;
pub const OBJECT_TYPE_BTREE_NODE: u32 = 0x03;
pub const OBJECT_TYPE_SPACEMAN: u32 = 0x05;
pub const OBJECT_TYPE_OMAP: u32 = 0x0B;
pub const OBJECT_TYPE_CHECKPOINT_MAP: u32 = 0x0C;
pub const OBJECT_TYPE_FS: u32 = 0x0D;
pub const OBJECT_TYPE_NX_REAPER: u32 = 0x11;
pub const OBJECT_TYPE_NX_REAP_LIST: u32 = 0x12;
pub const OBJECT_TYPE_EFI_JUMPSTART: u32 = 0x13;
pub const OBJECT_TYPE_FUSION_MIDDLE_TREE: u32 = 0x14;
pub const OBJECT_TYPE_NX_FUSION_WBC: u32 = 0x15;
pub const OBJECT_TYPE_NX_FUSION_WBC_LIST: u32 = 0x16;
pub const OBJECT_TYPE_ER_STATE: u32 = 0x17;
pub const OBJECT_TYPE_GBITMAP: u32 = 0x18;
pub const OBJECT_TYPE_GBITMAP_TREE: u32 = 0x19;
pub const OBJECT_TYPE_GBITMAP_BLOCK: u32 = 0x1A;
pub const OBJECT_TYPE_ER_RECOVERY_BLOCK: u32 = 0x1B;
pub const OBJECT_TYPE_SNAP_META_EXT: u32 = 0x1C;
pub const OBJECT_TYPE_INTEGRITY_META: u32 = 0x1D;
pub const OBJECT_TYPE_FEXT_TREE: u32 = 0x1E;
pub const OBJECT_TYPE_RESERVED_20: u32 = 0x1F;
pub const OBJECT_TYPE_KEYBAG: u32 = 0x6B65 /* 'ke' used by container_keybag fourcc */;

// Object flag masks (upper bits of type_and_flags)
pub const OBJ_VIRTUAL: u32 = 0x00000000;
pub const OBJ_EPHEMERAL: u32 = 0x80000000;
pub const OBJ_PHYSICAL: u32 = 0x40000000;
pub const OBJ_NOHEADER: u32 = 0x20000000;
pub const OBJ_ENCRYPTED: u32 = 0x10000000;
pub const OBJ_NONPERSISTENT: u32 = 0x08000000;
pub const OBJ_STORAGE_TYPE_MASK: u32 = 0xC0000000;
pub const OBJECT_TYPE_MASK: u32 = 0x0000FFFF;
pub const OBJECT_TYPE_FLAGS_MASK: u32 = 0xFFFF0000;

/// Storage class an object belongs to, derived from its type flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Physical,
    Virtual,
    Ephemeral,
}

/// Human-readable classification of an object type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Container,
    Metadata,
    FileSystem,
    Security,
    Unknown,
}

/// Resolve a masked object type code to a human-readable name and category.
///
/// Centralised and immutable: constructed once per lookup, never mutated,
/// so it is safe to share across threads without synchronisation.
pub fn describe_type(type_code: u32) -> (&'static str, TypeCategory) {
    match type_code {
        OBJECT_TYPE_NX_SUPERBLOCK => ("container superblock", TypeCategory::Container),
        OBJECT_TYPE_BTREE => ("b-tree root", TypeCategory::Metadata),
        OBJECT_TYPE_BTREE_NODE => ("b-tree node", TypeCategory::Metadata),
        OBJECT_TYPE_SPACEMAN => ("space manager", TypeCategory::Container),
        OBJECT_TYPE_OMAP => ("object map", TypeCategory::Metadata),
        OBJECT_TYPE_CHECKPOINT_MAP => ("checkpoint map", TypeCategory::Container),
        OBJECT_TYPE_FS => ("volume superblock", TypeCategory::FileSystem),
        OBJECT_TYPE_NX_REAPER => ("reaper", TypeCategory::Container),
        OBJECT_TYPE_NX_REAP_LIST => ("reaper list", TypeCategory::Container),
        OBJECT_TYPE_EFI_JUMPSTART => ("EFI jumpstart", TypeCategory::Container),
        OBJECT_TYPE_ER_STATE => ("encryption-rolling state", TypeCategory::Security),
        OBJECT_TYPE_GBITMAP => ("general bitmap", TypeCategory::Container),
        OBJECT_TYPE_GBITMAP_TREE => ("general bitmap tree", TypeCategory::Container),
        OBJECT_TYPE_GBITMAP_BLOCK => ("general bitmap block", TypeCategory::Container),
        OBJECT_TYPE_ER_RECOVERY_BLOCK => ("encryption-rolling recovery block", TypeCategory::Security),
        OBJECT_TYPE_SNAP_META_EXT => ("snapshot metadata extension", TypeCategory::FileSystem),
        OBJECT_TYPE_INTEGRITY_META => ("integrity metadata", TypeCategory::Security),
        OBJECT_TYPE_FEXT_TREE => ("extent reference tree", TypeCategory::FileSystem),
        _ => ("unknown", TypeCategory::Unknown),
    }
}

/// 32-byte header present on every APFS on-disk object. All fields are little-endian.
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    pub checksum: u64,       // 0x00
    pub oid: u64,            // 0x08
    pub xid: u64,            // 0x10
    pub type_and_flags: u32, // 0x18
    pub subtype: u32,        // 0x1C
}

impl ObjectHeader {
    /// Size of the on-disk header in bytes
    pub const SIZE: usize = 32;

    /// Parse an object header from the first 32 bytes of a block
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ApfsError::StructureTooSmall(format!(
                "object header too short: {} bytes, need {}",
                data.len(),
                Self::SIZE
            )));
        }

        let mut cursor = Cursor::new(data);
        Ok(ObjectHeader {
            checksum: cursor.read_u64::<LittleEndian>()?,
            oid: cursor.read_u64::<LittleEndian>()?,
            xid: cursor.read_u64::<LittleEndian>()?,
            type_and_flags: cursor.read_u32::<LittleEndian>()?,
            subtype: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Get the object type (lower 16 bits, no flags)
    pub fn object_type(&self) -> u32 {
        self.type_and_flags & OBJECT_TYPE_MASK
    }

    /// Get the storage type flags (upper bits)
    pub fn storage_type(&self) -> u32 {
        self.type_and_flags & OBJ_STORAGE_TYPE_MASK
    }

    /// Classify this object's storage class.
    pub fn storage_class(&self) -> StorageClass {
        if self.type_and_flags & OBJ_EPHEMERAL != 0 {
            StorageClass::Ephemeral
        } else if self.type_and_flags & OBJ_PHYSICAL != 0 {
            StorageClass::Physical
        } else {
            StorageClass::Virtual
        }
    }

    /// Whether this is a physical object (address = block number)
    pub fn is_physical(&self) -> bool {
        self.storage_class() == StorageClass::Physical
    }

    pub fn is_encrypted(&self) -> bool {
        self.type_and_flags & OBJ_ENCRYPTED != 0
    }

    /// Human-readable name and category for this object's type.
    pub fn describe(&self) -> (&'static str, TypeCategory) {
        describe_type(self.object_type())
    }
}

/// Read a full block at the given block number, verify its checksum, and parse the header.
pub fn read_object<R: Read + Seek>(
    reader: &mut R,
    block_number: u64,
    block_size: u32,
) -> Result<(ObjectHeader, Vec<u8>)> {
    let block = read_block(reader, block_number, block_size)?;

    if !fletcher::verify_object(&block) {
        return Err(ApfsError::InvalidChecksum);
    }

    let header = ObjectHeader::parse(&block)?;
    Ok((header, block))
}

/// Read a block at the given block number without checksum verification.
pub fn read_block<R: Read + Seek>(
    reader: &mut R,
    block_number: u64,
    block_size: u32,
) -> Result<Vec<u8>> {
    let offset = block_number * block_size as u64;
    reader.seek(SeekFrom::Start(offset))?;

    let mut block = vec![0u8; block_size as usize];
    let got = reader.read(&mut block)?;
    if got != block.len() {
        return Err(ApfsError::IoShortRead {
            offset,
            needed: block.len(),
            got,
        });
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_type_known() {
        let (name, cat) = describe_type(OBJECT_TYPE_FS);
        assert_eq!(name, "volume superblock");
        assert_eq!(cat, TypeCategory::FileSystem);
    }

    #[test]
    fn test_describe_type_unknown() {
        let (name, cat) = describe_type(0xABCD);
        assert_eq!(name, "unknown");
        assert_eq!(cat, TypeCategory::Unknown);
    }

    #[test]
    fn test_storage_class_virtual_default() {
        let header = ObjectHeader {
            checksum: 0,
            oid: 1,
            xid: 1,
            type_and_flags: OBJECT_TYPE_FS,
            subtype: 0,
        };
        assert_eq!(header.storage_class(), StorageClass::Virtual);
    }

    #[test]
    fn test_storage_class_physical() {
        let header = ObjectHeader {
            checksum: 0,
            oid: 1,
            xid: 1,
            type_and_flags: OBJECT_TYPE_NX_SUPERBLOCK | OBJ_PHYSICAL,
            subtype: 0,
        };
        assert!(header.is_physical());
    }
}
