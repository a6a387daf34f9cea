//! Public façade: `ApfsContainer` opens a container image, resolves every
//! mounted volume into a `VolumeHandle`, and provides the cross-cutting
//! discovery/extraction/decryption/jumpstart operations that sit above
//! the catalog, B-tree and crypto layers.

use std::cell::RefCell;
use std::io::{Read, Seek, Write};
use std::rc::Rc;

use regex::Regex;

use crate::blockio::PartitionOffsetReader;
use crate::crypto::{self, Credential, UnwrappedVek};
use crate::error::{ApfsError, Result};
use crate::jumpstart::{self, JumpstartLocateStrategy};
use crate::object;
use crate::{catalog, checkpoint, extents, gpt, omap, superblock};
use crate::{DirEntry, EntryKind, FileStat, VolumeInfo, WalkEntry};

/// 64-bit monotonic transaction id, as used throughout the on-disk format.
pub type XidT = u64;

/// One mounted snapshot's metadata, as exposed by `VolumeHandle::snapshots()`.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    pub xid: XidT,
    pub name: String,
    pub create_time: i64,
    pub change_time: i64,
}

/// A single discovered file from `ApfsContainer::discover`.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub volume_name: String,
    pub path: String,
    pub size: u64,
    pub create_time: i64,
    pub modify_time: i64,
    pub kind: EntryKind,
    /// Set when this entry was recovered from a snapshot rather than the
    /// volume's live tree: it no longer exists in the live directory
    /// structure, so surfacing it at all required `include_deleted`.
    pub is_deleted: bool,
}

/// Search criteria for `ApfsContainer::discover`. Every field is
/// optional; an empty criteria set matches everything, bounded by
/// `max_results`.
#[derive(Debug, Clone, Default)]
pub struct DiscoverCriteria {
    pub glob: Option<String>,
    pub regex: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub created_after: Option<i64>,
    pub created_before: Option<i64>,
    pub extension: Option<String>,
    pub name_substring: Option<String>,
    pub include_deleted: bool,
    pub max_results: usize,
}

impl DiscoverCriteria {
    pub const DEFAULT_MAX_RESULTS: usize = 1000;
    pub const MAX_RESULTS_CEILING: usize = 10_000;

    pub fn new() -> Self {
        DiscoverCriteria {
            max_results: Self::DEFAULT_MAX_RESULTS,
            ..Default::default()
        }
    }

    fn matches(&self, name: &str, entry: &DirEntry) -> Result<bool> {
        if let Some(glob) = &self.glob {
            if !glob_match(glob, name) {
                return Ok(false);
            }
        }
        if let Some(pattern) = &self.regex {
            let re = Regex::new(pattern)
                .map_err(|e| ApfsError::InvalidInput(format!("bad regex {:?}: {}", pattern, e)))?;
            if !re.is_match(name) {
                return Ok(false);
            }
        }
        if let Some(min) = self.min_size {
            if entry.size < min {
                return Ok(false);
            }
        }
        if let Some(max) = self.max_size {
            if entry.size > max {
                return Ok(false);
            }
        }
        if let Some(after) = self.created_after {
            if entry.create_time < after {
                return Ok(false);
            }
        }
        if let Some(before) = self.created_before {
            if entry.create_time > before {
                return Ok(false);
            }
        }
        if let Some(ext) = &self.extension {
            let matches_ext = name
                .rsplit_once('.')
                .map(|(_, e)| e.eq_ignore_ascii_case(ext.trim_start_matches('.')))
                .unwrap_or(false);
            if !matches_ext {
                return Ok(false);
            }
        }
        if let Some(sub) = &self.name_substring {
            if !name.contains(sub.as_str()) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Translate a small subset of shell glob syntax (`*`, `?`) into an
/// anchored regex and match it, rather than pulling in a dedicated glob
/// crate for three wildcard characters.
fn glob_match(pattern: &str, name: &str) -> bool {
    let mut regex_src = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => regex_src.push_str(".*"),
            '?' => regex_src.push('.'),
            c if "\\.+()|[]{}^$".contains(c) => {
                regex_src.push('\\');
                regex_src.push(c);
            }
            c => regex_src.push(c),
        }
    }
    regex_src.push('$');
    Regex::new(&regex_src).map(|re| re.is_match(name)).unwrap_or(false)
}

/// Report produced by `ApfsContainer::jumpstart`.
#[derive(Debug, Clone)]
pub struct JumpstartInfo {
    pub paddr: u64,
    pub strategy: JumpstartLocateStrategy,
    pub analysis: jumpstart::JumpstartAnalysis,
    pub bootable: bool,
    pub boot_requirements: Vec<&'static str>,
}

type SharedReader<R> = Rc<RefCell<PartitionOffsetReader<R>>>;

/// An open APFS container: superblock, checkpoint state and container
/// object map already resolved. Volumes are resolved lazily via `volumes()`.
pub struct ApfsContainer<R> {
    reader: SharedReader<R>,
    nxsb: superblock::NxSuperblock,
    block_size: u32,
    container_omap_root: u64,
}

impl<R: Read + Seek> ApfsContainer<R> {
    /// Open a container, optionally scoped to a byte offset (e.g. a GPT
    /// partition's starting offset resolved by the caller via [`crate::gpt`]).
    pub fn open(reader: R, partition_offset: Option<u64>) -> Result<Self> {
        let mut offset_reader = PartitionOffsetReader::new(reader, partition_offset.unwrap_or(0));

        let nxsb = superblock::read_nxsb(&mut offset_reader)?;
        let nxsb = superblock::find_latest_nxsb(&mut offset_reader, &nxsb)?;
        let block_size = nxsb.block_size;

        let container_omap_root =
            omap::read_omap_tree_root(&mut offset_reader, nxsb.omap_oid, block_size)?;

        Ok(ApfsContainer {
            reader: Rc::new(RefCell::new(offset_reader)),
            nxsb,
            block_size,
            container_omap_root,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn uuid(&self) -> [u8; 16] {
        self.nxsb.uuid
    }

    /// Resolve every non-zero `fs_oids` entry into a mounted volume
    /// handle, not just the first (as a single-volume mount would).
    pub fn volumes(&self) -> Result<Vec<VolumeHandle<R>>> {
        let mut out = Vec::new();
        for &vol_oid in self.nxsb.fs_oids.iter().filter(|&&o| o != 0) {
            out.push(self.open_volume(vol_oid)?);
        }
        Ok(out)
    }

    fn open_volume(&self, vol_oid: u64) -> Result<VolumeHandle<R>> {
        let vol_block = {
            let mut reader = self.reader.borrow_mut();
            omap::omap_lookup(&mut *reader, self.container_omap_root, self.block_size, vol_oid)?
        };

        let vol_sb = {
            let mut reader = self.reader.borrow_mut();
            let data = object::read_block(&mut *reader, vol_block, self.block_size)?;
            superblock::ApfsSuperblock::parse(&data)?
        };

        let vol_omap_root_block = {
            let mut reader = self.reader.borrow_mut();
            omap::read_omap_tree_root(&mut *reader, vol_sb.omap_oid, self.block_size)?
        };

        let info = VolumeInfo {
            name: vol_sb.volume_name.clone(),
            block_size: self.block_size,
            num_files: vol_sb.num_files,
            num_directories: vol_sb.num_directories,
            num_symlinks: vol_sb.num_symlinks,
        };

        Ok(VolumeHandle {
            reader: Rc::clone(&self.reader),
            block_size: self.block_size,
            vol_oid,
            vol_omap_root_block,
            vol_sb,
            info,
        })
    }

    /// Search every mounted volume's live tree (and, when
    /// `criteria.include_deleted` is set, every recorded snapshot's tree)
    /// for files matching `criteria`.
    pub fn discover(&self, criteria: &DiscoverCriteria) -> Result<Vec<DiscoveredFile>> {
        let max_results = criteria.max_results.clamp(1, DiscoverCriteria::MAX_RESULTS_CEILING);
        let mut found = Vec::new();

        'volumes: for vol in self.volumes()? {
            let live_walk = vol.walk(None)?;
            let mut seen_paths: std::collections::HashSet<String> =
                live_walk.iter().map(|e| e.path.clone()).collect();

            for entry in &live_walk {
                if found.len() >= max_results {
                    break 'volumes;
                }
                let name = entry.path.rsplit('/').next().unwrap_or(&entry.path);
                if criteria.matches(name, &entry.entry)? {
                    found.push(DiscoveredFile {
                        volume_name: vol.info.name.clone(),
                        path: entry.path.clone(),
                        size: entry.entry.size,
                        create_time: entry.entry.create_time,
                        modify_time: entry.entry.modify_time,
                        kind: entry.entry.kind,
                        is_deleted: false,
                    });
                }
            }

            if !criteria.include_deleted {
                continue;
            }

            // A path recorded in an older snapshot but absent from the live
            // tree was deleted after that snapshot was taken; surface it as
            // a recovery candidate.
            for snap in vol.snapshots()? {
                if found.len() >= max_results {
                    break 'volumes;
                }
                let snap_walk = vol.walk(Some(snap.xid))?;
                for entry in snap_walk {
                    if found.len() >= max_results {
                        break 'volumes;
                    }
                    if !seen_paths.insert(entry.path.clone()) {
                        continue;
                    }
                    let name = entry.path.rsplit('/').next().unwrap_or(&entry.path);
                    if criteria.matches(name, &entry.entry)? {
                        found.push(DiscoveredFile {
                            volume_name: vol.info.name.clone(),
                            path: entry.path,
                            size: entry.entry.size,
                            create_time: entry.entry.create_time,
                            modify_time: entry.entry.modify_time,
                            kind: entry.entry.kind,
                            is_deleted: true,
                        });
                    }
                }
            }
        }

        if found.len() == max_results {
            log::warn!(
                "discover: result list capped at max_results={}, further matches were not collected",
                max_results
            );
        }
        Ok(found)
    }

    /// Extract `path` from `vol` (optionally snapshot-scoped) to `dest`.
    pub fn extract(&self, vol: &VolumeHandle<R>, path: &str, dest: &mut impl Write, snapshot: Option<XidT>) -> Result<u64> {
        vol.read_file_to(path, dest, snapshot)
    }

    /// Locate the container media keybag, unwrap `vol`'s volume
    /// encryption key using `credential`.
    pub fn decrypt_volume(&self, vol: &VolumeHandle<R>, credential: Credential) -> Result<UnwrappedVek> {
        if self.nxsb.keylocker_start_paddr == 0 {
            return Err(ApfsError::NotFound("container has no media keybag".into()));
        }

        let keybag_block = {
            let mut reader = self.reader.borrow_mut();
            object::read_block(&mut *reader, self.nxsb.keylocker_start_paddr, self.block_size)?
        };
        let body = &keybag_block[object::ObjectHeader::SIZE..];
        let locker = crypto::keybag::KeybagLocker::parse(body)?;

        crypto::unlock_volume_key(&locker, &vol.vol_sb.uuid, &credential)
    }

    /// Locate, extract and validate the EFI jumpstart driver.
    pub fn jumpstart(&self) -> Result<JumpstartInfo> {
        let mut chain = Vec::new();
        if let Ok(map) = {
            let mut reader = self.reader.borrow_mut();
            // The container's checkpoint descriptor area anchors the chain;
            // any checkpoint map in it may carry an EFI_JUMPSTART mapping.
            checkpoint::CheckpointLocator::new(&mut *reader, &self.nxsb).locate()
        } {
            chain = map.1;
        }

        let (paddr, strategy) = {
            let mut reader = self.reader.borrow_mut();
            let mut locator = jumpstart::JumpstartLocator::new(&mut *reader, self.block_size);
            locator.locate(self.nxsb.efi_jumpstart, &chain)?
        };

        let js = {
            let mut reader = self.reader.borrow_mut();
            jumpstart::read_jumpstart_at(&mut *reader, paddr, self.block_size)?
        };

        let driver = {
            let mut reader = self.reader.borrow_mut();
            jumpstart::extract_driver(&mut *reader, self.block_size, &js)?
        };

        let analysis = jumpstart::analyze(&js, &driver, self.block_size);
        let checker = jumpstart::BootabilityChecker::with_analysis(&js, &analysis);

        Ok(JumpstartInfo {
            paddr,
            strategy,
            bootable: checker.is_bootable(),
            boot_requirements: checker.get_boot_requirements(),
            analysis,
        })
    }
}

/// A resolved, mountable volume within a container.
pub struct VolumeHandle<R> {
    reader: SharedReader<R>,
    block_size: u32,
    vol_oid: u64,
    vol_omap_root_block: u64,
    vol_sb: superblock::ApfsSuperblock,
    info: VolumeInfo,
}

impl<R: Read + Seek> VolumeHandle<R> {
    pub fn volume_info(&self) -> &VolumeInfo {
        &self.info
    }

    pub fn oid(&self) -> u64 {
        self.vol_oid
    }

    pub fn uuid(&self) -> [u8; 16] {
        self.vol_sb.uuid
    }

    /// Resolve the catalog B-tree root, either the live tree (`None`) or
    /// the tree as of a snapshot's transaction id.
    fn resolve_catalog_root(&self, snapshot: Option<XidT>) -> Result<u64> {
        let mut reader = self.reader.borrow_mut();
        match snapshot {
            Some(xid) => omap::omap_lookup_snapshot(
                &mut *reader, self.vol_omap_root_block, self.block_size, self.vol_sb.root_tree_oid, xid,
            ).map(|(paddr, _flags)| paddr),
            None => omap::omap_lookup(
                &mut *reader, self.vol_omap_root_block, self.block_size, self.vol_sb.root_tree_oid,
            ),
        }
    }

    /// List every snapshot recorded in this volume's catalog.
    pub fn snapshots(&self) -> Result<Vec<SnapshotHandle>> {
        let catalog_root = self.resolve_catalog_root(None)?;
        let mut reader = self.reader.borrow_mut();
        let raw = catalog::list_snapshots(&mut *reader, catalog_root, self.vol_omap_root_block, self.block_size)?;
        Ok(raw
            .into_iter()
            .map(|(xid, meta)| SnapshotHandle {
                xid,
                name: meta.name,
                create_time: meta.create_time,
                change_time: meta.change_time,
            })
            .collect())
    }

    /// Summarise this volume (or one of its snapshots): entry counts and name.
    pub fn inspect(&self, snapshot: Option<XidT>) -> Result<VolumeInfo> {
        if snapshot.is_none() {
            return Ok(self.info.clone());
        }
        // A snapshot's counts aren't tracked separately on-disk here; walk
        // the snapshot-scoped tree to recompute them.
        let entries = self.walk(snapshot)?;
        let mut num_files = 0;
        let mut num_directories = 0;
        let mut num_symlinks = 0;
        for e in &entries {
            match e.entry.kind {
                EntryKind::File => num_files += 1,
                EntryKind::Directory => num_directories += 1,
                EntryKind::Symlink => num_symlinks += 1,
            }
        }
        Ok(VolumeInfo {
            name: self.info.name.clone(),
            block_size: self.block_size,
            num_files,
            num_directories,
            num_symlinks,
        })
    }

    pub fn list_directory(&self, path: &str, snapshot: Option<XidT>) -> Result<Vec<DirEntry>> {
        let catalog_root = self.resolve_catalog_root(snapshot)?;
        let (parent, _inode) = if path == "/" || path.is_empty() {
            (catalog::ROOT_DIR_RECORD, catalog::ROOT_DIR_RECORD)
        } else {
            let mut reader = self.reader.borrow_mut();
            let (oid, inode) = catalog::resolve_path(&mut *reader, catalog_root, self.vol_omap_root_block, self.block_size, path)?;
            if inode.kind() != catalog::INODE_DIR_TYPE {
                return Err(ApfsError::NotADirectory(path.to_string()));
            }
            (oid, oid)
        };

        let mut reader = self.reader.borrow_mut();
        catalog::list_directory(&mut *reader, catalog_root, self.vol_omap_root_block, self.block_size, parent)
    }

    pub fn stat(&self, path: &str, snapshot: Option<XidT>) -> Result<FileStat> {
        let catalog_root = self.resolve_catalog_root(snapshot)?;
        let mut reader = self.reader.borrow_mut();
        let (oid, inode) = catalog::resolve_path(&mut *reader, catalog_root, self.vol_omap_root_block, self.block_size, path)?;

        Ok(FileStat {
            oid,
            kind: match inode.kind() {
                catalog::INODE_DIR_TYPE => EntryKind::Directory,
                catalog::INODE_SYMLINK_TYPE => EntryKind::Symlink,
                _ => EntryKind::File,
            },
            size: inode.size(),
            create_time: inode.create_time,
            modify_time: inode.modify_time,
            uid: inode.uid,
            gid: inode.gid,
            mode: inode.mode,
            nlink: inode.nlink(),
        })
    }

    pub fn read_file(&self, path: &str, snapshot: Option<XidT>) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_file_to(path, &mut buf, snapshot)?;
        Ok(buf)
    }

    pub fn read_file_to<W: Write>(&self, path: &str, writer: &mut W, snapshot: Option<XidT>) -> Result<u64> {
        let catalog_root = self.resolve_catalog_root(snapshot)?;
        let mut reader = self.reader.borrow_mut();
        let (_oid, inode) = catalog::resolve_path(&mut *reader, catalog_root, self.vol_omap_root_block, self.block_size, path)?;
        let file_extents = catalog::lookup_extents(&mut *reader, catalog_root, self.vol_omap_root_block, self.block_size, inode.private_id)?;
        extents::read_file_data(&mut *reader, self.block_size, &file_extents, inode.size(), writer)
    }

    /// Open a file for streaming `Read + Seek` access over the shared reader.
    pub fn open_file(&self, path: &str, snapshot: Option<XidT>) -> Result<VolumeFileReader<R>> {
        let catalog_root = self.resolve_catalog_root(snapshot)?;
        let (file_extents, logical_size) = {
            let mut reader = self.reader.borrow_mut();
            let (_oid, inode) = catalog::resolve_path(&mut *reader, catalog_root, self.vol_omap_root_block, self.block_size, path)?;
            let file_extents = catalog::lookup_extents(&mut *reader, catalog_root, self.vol_omap_root_block, self.block_size, inode.private_id)?;
            (file_extents, inode.size())
        };

        Ok(VolumeFileReader::new(Rc::clone(&self.reader), self.block_size, file_extents, logical_size))
    }

    pub fn walk(&self, snapshot: Option<XidT>) -> Result<Vec<WalkEntry>> {
        let mut entries = Vec::new();
        self.walk_recursive(catalog::ROOT_DIR_RECORD, "", snapshot, &mut entries)?;
        Ok(entries)
    }

    pub fn exists(&self, path: &str, snapshot: Option<XidT>) -> Result<bool> {
        let catalog_root = self.resolve_catalog_root(snapshot)?;
        let mut reader = self.reader.borrow_mut();
        match catalog::resolve_path(&mut *reader, catalog_root, self.vol_omap_root_block, self.block_size, path) {
            Ok(_) => Ok(true),
            Err(ApfsError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn walk_recursive(&self, parent_oid: u64, parent_path: &str, snapshot: Option<XidT>, entries: &mut Vec<WalkEntry>) -> Result<()> {
        let catalog_root = self.resolve_catalog_root(snapshot)?;
        let dir_entries = {
            let mut reader = self.reader.borrow_mut();
            catalog::list_directory(&mut *reader, catalog_root, self.vol_omap_root_block, self.block_size, parent_oid)?
        };

        for entry in dir_entries {
            let full_path = if parent_path.is_empty() {
                format!("/{}", entry.name)
            } else {
                format!("{}/{}", parent_path, entry.name)
            };

            let is_dir = entry.kind == EntryKind::Directory;
            let oid = entry.oid;

            entries.push(WalkEntry { path: full_path.clone(), entry });

            if is_dir {
                self.walk_recursive(oid, &full_path, snapshot, entries)?;
            }
        }
        Ok(())
    }
}

/// A `Read + Seek` view of a file's extents over a `VolumeHandle`'s
/// shared reader, returned by `VolumeHandle::open_file`.
pub struct VolumeFileReader<R> {
    reader: SharedReader<R>,
    logical_size: u64,
    extent_map: Vec<(u64, u64, u64)>,
    position: u64,
}

impl<R: Read + Seek> VolumeFileReader<R> {
    fn new(reader: SharedReader<R>, block_size: u32, extents: Vec<catalog::FileExtentVal>, logical_size: u64) -> Self {
        let block_size = block_size as u64;
        let mut extent_map = Vec::new();
        let mut logical_offset = 0u64;
        for extent in &extents {
            let length = extent.length();
            if length == 0 {
                continue;
            }
            let physical_start = extent.phys_block_num * block_size;
            extent_map.push((logical_offset, physical_start, length));
            logical_offset += length;
        }
        VolumeFileReader { reader, logical_size, extent_map, position: 0 }
    }

    fn logical_to_physical(&self, logical_offset: u64) -> Option<(u64, u64)> {
        for &(log_start, phys_start, length) in &self.extent_map {
            if logical_offset >= log_start && logical_offset < log_start + length {
                return Some((phys_start + (logical_offset - log_start), log_start + length - logical_offset));
            }
        }
        None
    }
}

impl<R: Read + Seek> Read for VolumeFileReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.position >= self.logical_size {
            return Ok(0);
        }
        let remaining = (self.logical_size - self.position) as usize;
        let to_read = buf.len().min(remaining);
        if to_read == 0 {
            return Ok(0);
        }

        let mut total_read = 0;
        let mut reader = self.reader.borrow_mut();
        while total_read < to_read {
            let logical_pos = self.position + total_read as u64;
            let (physical_pos, extent_remaining) = self.logical_to_physical(logical_pos).ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "logical offset beyond extent map")
            })?;
            let chunk_size = ((to_read - total_read) as u64).min(extent_remaining) as usize;

            reader.seek(std::io::SeekFrom::Start(physical_pos))?;
            reader.read_exact(&mut buf[total_read..total_read + chunk_size])?;
            total_read += chunk_size;
        }

        self.position += total_read as u64;
        Ok(total_read)
    }
}

impl<R: Read + Seek> Seek for VolumeFileReader<R> {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            std::io::SeekFrom::Start(offset) => offset as i64,
            std::io::SeekFrom::Current(offset) => self.position as i64 + offset,
            std::io::SeekFrom::End(offset) => self.logical_size as i64 + offset,
        };
        if new_pos < 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "seek before start of file"));
        }
        self.position = new_pos as u64;
        Ok(self.position)
    }
}

/// Resolve a GPT-discovered APFS container partition's byte offset, for
/// callers of `ApfsContainer::open` working from a whole-disk image.
pub fn find_apfs_partition_offset<D: crate::blockio::BlockDevice>(device: &mut D, logical_block_size: u64) -> Result<Option<u64>> {
    let (_header, partitions) = gpt::read_partitions(device, logical_block_size)?;
    Ok(partitions.into_iter().find(|p| p.is_apfs_container()).map(|p| p.offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_basic() {
        assert!(glob_match("*.plist", "Info.plist"));
        assert!(!glob_match("*.plist", "Info.plist.bak"));
        assert!(glob_match("IMG_????.JPG", "IMG_0001.JPG"));
    }

    #[test]
    fn test_discover_criteria_defaults_capped() {
        let criteria = DiscoverCriteria::new();
        assert_eq!(criteria.max_results, DiscoverCriteria::DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn test_discover_criteria_matches_extension() {
        let criteria = DiscoverCriteria {
            extension: Some("plist".into()),
            ..DiscoverCriteria::new()
        };
        let entry = DirEntry {
            name: "Info.plist".into(),
            oid: 1,
            kind: EntryKind::File,
            size: 10,
            create_time: 0,
            modify_time: 0,
        };
        assert!(criteria.matches("Info.plist", &entry).unwrap());
        assert!(!criteria.matches("Info.txt", &entry).unwrap());
    }

    #[test]
    fn test_discover_criteria_rejects_bad_regex() {
        let criteria = DiscoverCriteria {
            regex: Some("(".into()),
            ..DiscoverCriteria::new()
        };
        let entry = DirEntry {
            name: "x".into(),
            oid: 1,
            kind: EntryKind::File,
            size: 0,
            create_time: 0,
            modify_time: 0,
        };
        assert!(criteria.matches("x", &entry).is_err());
    }
}
