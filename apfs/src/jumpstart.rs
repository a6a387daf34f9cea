//! EFI jumpstart: the small driver image a firmware boot ROM loads to
//! hand off to the real macOS bootloader, plus the locator/extractor/
//! analyzer/bootability-checker chain used to recover it from a
//! possibly-damaged container.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::checkpoint::CheckpointMap;
use crate::error::{ApfsError, Result};
use crate::object::{self, ObjectHeader, OBJECT_TYPE_EFI_JUMPSTART};

pub const JSDR_MAGIC: u32 = 0x5244534A; // 'JSDR'
pub const JSDR_VERSION: u32 = 1;
const SIGNATURE_SCAN_BLOCK_LIMIT: u64 = 1024;
const SIGNATURE_SCAN_STRIDE: usize = 8;

/// One physical extent (`prange_t`) of the driver payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpstartExtent {
    pub start_paddr: u64,
    pub block_count: u64,
}

/// Parsed `nx_efi_jumpstart_t` object.
#[derive(Debug, Clone)]
pub struct NxEfiJumpstart {
    pub header: ObjectHeader,
    pub magic: u32,
    pub version: u32,
    pub efi_file_length: u32,
    pub extent_count: u32,
    extents: Vec<JumpstartExtent>,
}

impl NxEfiJumpstart {
    pub fn parse(block: &[u8]) -> Result<Self> {
        let header = ObjectHeader::parse(block)?;
        let body = &block[ObjectHeader::SIZE..];
        if body.len() < 16 {
            return Err(ApfsError::StructureTooSmall("jumpstart body too short".into()));
        }
        let mut cursor = Cursor::new(body);
        let magic = cursor.read_u32::<LittleEndian>()?;
        let version = cursor.read_u32::<LittleEndian>()?;
        let efi_file_length = cursor.read_u32::<LittleEndian>()?;
        let num_extents = cursor.read_u32::<LittleEndian>()?;
        // 16 reserved bytes follow before the extent array
        cursor.set_position(cursor.position() + 16);

        let mut extents = Vec::with_capacity(num_extents as usize);
        for _ in 0..num_extents {
            let start_paddr = cursor.read_u64::<LittleEndian>()?;
            let block_count = cursor.read_u64::<LittleEndian>()?;
            extents.push(JumpstartExtent { start_paddr, block_count });
        }
        if extents.len() != num_extents as usize {
            return Err(ApfsError::StructureTooSmall(
                "jumpstart extent count mismatch".into(),
            ));
        }

        Ok(NxEfiJumpstart {
            header,
            magic,
            version,
            efi_file_length,
            extent_count: num_extents,
            extents,
        })
    }

    pub fn extents(&self) -> Vec<JumpstartExtent> {
        self.extents.clone()
    }

    pub fn is_valid(&self) -> bool {
        self.magic == JSDR_MAGIC && self.version == JSDR_VERSION
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpstartLocateStrategy {
    SuperblockField,
    CheckpointMap,
    ChainedCheckpointMap,
    SignatureScan,
}

/// Resolves a jumpstart physical block, trying cheapest/most-trusted
/// sources first, falling back to a bounded raw signature scan.
pub struct JumpstartLocator<'a, R> {
    reader: &'a mut R,
    block_size: u32,
    /// Byte offset of the start of the container within `reader`, for a
    /// UUID-targeted partition resolved via GPT.
    partition_offset: u64,
}

impl<'a, R: Read + Seek> JumpstartLocator<'a, R> {
    pub fn new(reader: &'a mut R, block_size: u32) -> Self {
        JumpstartLocator { reader, block_size, partition_offset: 0 }
    }

    /// Construct a sub-locator scoped to one GPT partition's byte range.
    pub fn for_partition(reader: &'a mut R, block_size: u32, partition_offset: u64) -> Self {
        JumpstartLocator { reader, block_size, partition_offset }
    }

    fn read_block(&mut self, block_num: u64) -> Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(self.partition_offset + block_num * self.block_size as u64))?;
        let mut block = vec![0u8; self.block_size as usize];
        let mut read_total = 0usize;
        while read_total < block.len() {
            let got = self.reader.read(&mut block[read_total..])?;
            if got == 0 {
                return Err(ApfsError::IoShortRead {
                    offset: self.partition_offset + block_num * self.block_size as u64,
                    needed: block.len(),
                    got: read_total,
                });
            }
            read_total += got;
        }
        Ok(block)
    }

    /// Order: superblock field, then first checkpoint map in `chain`
    /// carrying an EFI_JUMPSTART mapping, then later maps in the chain,
    /// then a bounded raw signature scan.
    pub fn locate(
        &mut self,
        superblock_paddr: u64,
        chain: &[CheckpointMap],
    ) -> Result<(u64, JumpstartLocateStrategy)> {
        if superblock_paddr != 0 {
            return Ok((superblock_paddr, JumpstartLocateStrategy::SuperblockField));
        }

        for (i, map) in chain.iter().enumerate() {
            if let Some(mapping) = map.find_by_type(OBJECT_TYPE_EFI_JUMPSTART) {
                let strategy = if i == 0 {
                    JumpstartLocateStrategy::CheckpointMap
                } else {
                    JumpstartLocateStrategy::ChainedCheckpointMap
                };
                return Ok((mapping.paddr, strategy));
            }
        }

        if let Some(block_num) = self.signature_scan()? {
            return Ok((block_num, JumpstartLocateStrategy::SignatureScan));
        }

        Err(ApfsError::NotFound(
            "no EFI jumpstart location found via superblock, checkpoint maps, or signature scan".into(),
        ))
    }

    /// Scan the first 1024 blocks at an 8-byte stride for the jumpstart
    /// magic+version pair, returning the block number of a match.
    fn signature_scan(&mut self) -> Result<Option<u64>> {
        for block_num in 0..SIGNATURE_SCAN_BLOCK_LIMIT {
            let block = match self.read_block(block_num) {
                Ok(b) => b,
                Err(_) => break, // past end of device
            };
            let mut pos = 0usize;
            while pos + 8 <= block.len() {
                let magic = u32::from_le_bytes(block[pos..pos + 4].try_into().unwrap());
                let version = u32::from_le_bytes(block[pos + 4..pos + 8].try_into().unwrap());
                if magic == JSDR_MAGIC && version == JSDR_VERSION {
                    return Ok(Some(block_num));
                }
                pos += SIGNATURE_SCAN_STRIDE;
            }
        }
        Ok(None)
    }
}

/// Reads a jumpstart's extents and assembles the driver payload.
pub fn extract_driver<R: Read + Seek>(
    reader: &mut R,
    block_size: u32,
    jumpstart: &NxEfiJumpstart,
) -> Result<Vec<u8>> {
    let expected_len = jumpstart.efi_file_length as u64;
    let mut out = Vec::with_capacity(expected_len as usize);

    for extent in jumpstart.extents() {
        if out.len() as u64 >= expected_len {
            break;
        }
        let offset = extent.start_paddr * block_size as u64;
        let remaining = expected_len - out.len() as u64;
        let extent_bytes = extent.block_count * block_size as u64;
        let take = remaining.min(extent_bytes) as usize;

        reader.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; take];
        let mut read_total = 0usize;
        while read_total < take {
            let got = reader.read(&mut buf[read_total..])?;
            if got == 0 {
                return Err(ApfsError::IoShortRead {
                    offset: offset + read_total as u64,
                    needed: take,
                    got: read_total,
                });
            }
            read_total += got;
        }
        out.extend_from_slice(&buf);
    }

    if out.len() as u64 != expected_len {
        return Err(ApfsError::IntegrityFailure(format!(
            "assembled jumpstart driver is {} bytes, expected {}",
            out.len(), expected_len
        )));
    }
    Ok(out)
}

/// Structured report on a jumpstart's health and driver payload.
#[derive(Debug, Clone)]
pub struct JumpstartAnalysis {
    pub valid: bool,
    pub extents: Vec<JumpstartExtent>,
    pub driver_size: usize,
    pub info: HashMap<String, String>,
}

/// Analyze a jumpstart plus its already-extracted driver bytes.
///
/// `block_size` must be the container's own declared block size: extent
/// coverage is always `block_count * block_size`, never assumed 4096.
pub fn analyze(jumpstart: &NxEfiJumpstart, driver: &[u8], block_size: u32) -> JumpstartAnalysis {
    let mut info = HashMap::new();

    info.insert("DriverReadable".into(), (!driver.is_empty()).to_string());

    let mz_found = driver.len() >= 2 && driver[0] == 0x4D && driver[1] == 0x5A;
    info.insert("MZHeaderFound".into(), mz_found.to_string());

    let block_size = block_size as u64;
    let extent_bytes: u64 = jumpstart.extents().iter().map(|e| e.block_count * block_size).sum();
    if (jumpstart.efi_file_length as u64) > extent_bytes {
        info.insert(
            "ConsistencyWarning".into(),
            format!("efi_file_length {} exceeds extent coverage {} bytes", jumpstart.efi_file_length, extent_bytes),
        );
    } else if extent_bytes > jumpstart.efi_file_length as u64 {
        info.insert(
            "ExtentCoverage".into(),
            format!("extents over-cover by {} bytes", extent_bytes - jumpstart.efi_file_length as u64),
        );
    }

    if driver.len() as u64 != jumpstart.efi_file_length as u64 {
        info.insert(
            "ReadLengthConsistency".into(),
            format!("extractor returned {} bytes, expected {}", driver.len(), jumpstart.efi_file_length),
        );
    }

    JumpstartAnalysis {
        valid: jumpstart.is_valid(),
        extents: jumpstart.extents(),
        driver_size: driver.len(),
        info,
    }
}

/// Composes reader validity with an optional analyzer verification pass.
pub struct BootabilityChecker<'a> {
    jumpstart: &'a NxEfiJumpstart,
    analysis: Option<&'a JumpstartAnalysis>,
}

impl<'a> BootabilityChecker<'a> {
    pub fn new(jumpstart: &'a NxEfiJumpstart) -> Self {
        BootabilityChecker { jumpstart, analysis: None }
    }

    pub fn with_analysis(jumpstart: &'a NxEfiJumpstart, analysis: &'a JumpstartAnalysis) -> Self {
        BootabilityChecker { jumpstart, analysis: Some(analysis) }
    }

    pub fn is_bootable(&self) -> bool {
        self.jumpstart.is_valid()
    }

    pub fn verify_boot_configuration(&self) -> Result<()> {
        if !self.jumpstart.is_valid() {
            return Err(ApfsError::IntegrityFailure(
                "jumpstart magic/version invalid".into(),
            ));
        }
        if let Some(analysis) = self.analysis {
            if analysis.info.contains_key("ConsistencyWarning") {
                return Err(ApfsError::IntegrityFailure(
                    "jumpstart extent coverage is inconsistent with efi_file_length".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn get_boot_requirements(&self) -> Vec<&'static str> {
        vec![
            "GPT partition of type APFS container GUID",
            "Container superblock locatable via checkpoint descriptor area",
            "Valid EFI Jumpstart driver image",
        ]
    }
}

pub fn read_jumpstart_at<R: Read + Seek>(
    reader: &mut R,
    block_num: u64,
    block_size: u32,
) -> Result<NxEfiJumpstart> {
    let block = object::read_block(reader, block_num, block_size)?;
    NxEfiJumpstart::parse(&block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_jumpstart_block(block_size: usize, extents: &[(u64, u64)], efi_file_length: u32) -> Vec<u8> {
        let mut block = vec![0u8; block_size];
        block[24..28].copy_from_slice(&crate::object::OBJECT_TYPE_EFI_JUMPSTART.to_le_bytes());
        let body_off = ObjectHeader::SIZE;
        block[body_off..body_off + 4].copy_from_slice(&JSDR_MAGIC.to_le_bytes());
        block[body_off + 4..body_off + 8].copy_from_slice(&JSDR_VERSION.to_le_bytes());
        block[body_off + 8..body_off + 12].copy_from_slice(&efi_file_length.to_le_bytes());
        block[body_off + 12..body_off + 16].copy_from_slice(&(extents.len() as u32).to_le_bytes());
        let mut off = body_off + 16 + 16; // skip reserved
        for &(start_paddr, block_count) in extents {
            block[off..off + 8].copy_from_slice(&start_paddr.to_le_bytes());
            block[off + 8..off + 16].copy_from_slice(&block_count.to_le_bytes());
            off += 16;
        }
        block
    }

    #[test]
    fn test_parse_jumpstart_valid() {
        let block = build_jumpstart_block(4096, &[(10, 1)], 4096);
        let js = NxEfiJumpstart::parse(&block).unwrap();
        assert!(js.is_valid());
        assert_eq!(js.extents().len(), 1);
        assert_eq!(js.extents()[0].start_paddr, 10);
    }

    #[test]
    fn test_parse_jumpstart_rejects_bad_magic() {
        let mut block = build_jumpstart_block(4096, &[], 0);
        block[32] ^= 0xFF;
        let js = NxEfiJumpstart::parse(&block).unwrap();
        assert!(!js.is_valid());
    }

    #[test]
    fn test_locator_uses_superblock_field_first() {
        let mut data = vec![0u8; 4096];
        let mut cur = Cursor::new(&mut data);
        let mut locator = JumpstartLocator::new(&mut cur, 4096);
        let (paddr, strategy) = locator.locate(7, &[]).unwrap();
        assert_eq!(paddr, 7);
        assert_eq!(strategy, JumpstartLocateStrategy::SuperblockField);
    }

    #[test]
    fn test_locator_falls_back_to_signature_scan() {
        let block_size = 512usize;
        let mut data = vec![0u8; block_size * 2];
        // plant a raw magic+version at an 8-byte stride offset in block 1
        let block1_off = block_size + 16;
        data[block1_off..block1_off + 4].copy_from_slice(&JSDR_MAGIC.to_le_bytes());
        data[block1_off + 4..block1_off + 8].copy_from_slice(&JSDR_VERSION.to_le_bytes());

        let mut cur = Cursor::new(&mut data);
        let mut locator = JumpstartLocator::new(&mut cur, block_size as u32);
        let (paddr, strategy) = locator.locate(0, &[]).unwrap();
        assert_eq!(paddr, 1);
        assert_eq!(strategy, JumpstartLocateStrategy::SignatureScan);
    }

    #[test]
    fn test_extract_driver_respects_efi_file_length() {
        let block_size = 16usize;
        let mut image = vec![0u8; block_size * 4];
        image[block_size..block_size + 8].copy_from_slice(b"MZ------");

        let jumpstart_block = build_jumpstart_block(4096, &[(1, 1)], 8);
        let js = NxEfiJumpstart::parse(&jumpstart_block).unwrap();

        let mut cur = Cursor::new(&mut image);
        let driver = extract_driver(&mut cur, block_size as u32, &js).unwrap();
        assert_eq!(driver.len(), 8);
        assert_eq!(&driver[..2], b"MZ");
    }

    #[test]
    fn test_analyze_detects_mz_header() {
        let js_block = build_jumpstart_block(4096, &[(1, 1)], 8);
        let js = NxEfiJumpstart::parse(&js_block).unwrap();
        let driver = vec![0x4D, 0x5A, 0, 0, 0, 0, 0, 0];
        let analysis = analyze(&js, &driver, 4096);
        assert_eq!(analysis.info.get("MZHeaderFound"), Some(&"true".to_string()));
    }

    #[test]
    fn test_analyze_uses_declared_block_size_not_4096() {
        // One 512-byte-block extent exactly covers a 512-byte driver, but
        // would look under-covered by 8x if analyze assumed 4096 blocks.
        let js_block = build_jumpstart_block(4096, &[(1, 1)], 512);
        let js = NxEfiJumpstart::parse(&js_block).unwrap();
        let driver = vec![0u8; 512];
        let analysis = analyze(&js, &driver, 512);
        assert!(analysis.info.get("ConsistencyWarning").is_none());
        assert!(analysis.info.get("ExtentCoverage").is_none());
    }

    #[test]
    fn test_bootability_checker_requires_valid_jumpstart() {
        let mut bad_block = build_jumpstart_block(4096, &[], 0);
        bad_block[32] ^= 0xFF;
        let js = NxEfiJumpstart::parse(&bad_block).unwrap();
        let checker = BootabilityChecker::new(&js);
        assert!(!checker.is_bootable());
        assert!(checker.verify_boot_configuration().is_err());
    }

    #[test]
    fn test_boot_requirements_mentions_jumpstart() {
        let js_block = build_jumpstart_block(4096, &[], 0);
        let js = NxEfiJumpstart::parse(&js_block).unwrap();
        let checker = BootabilityChecker::new(&js);
        let reqs = checker.get_boot_requirements();
        assert!(reqs.iter().any(|r| r.contains("Jumpstart")));
    }
}
