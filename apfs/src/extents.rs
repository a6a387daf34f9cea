use std::io::{Read, Seek, SeekFrom, Write};

use crate::catalog::FileExtentVal;
use crate::error::Result;

/// Read file data from extents, streaming to a writer.
/// Returns the number of bytes written.
pub fn read_file_data<R: Read + Seek, W: Write>(
    reader: &mut R,
    block_size: u32,
    extents: &[FileExtentVal],
    logical_size: u64,
    writer: &mut W,
) -> Result<u64> {
    if logical_size == 0 {
        return Ok(0);
    }

    let block_size = block_size as u64;
    let mut bytes_written: u64 = 0;
    let mut buf = vec![0u8; block_size as usize];

    for extent in extents {
        if bytes_written >= logical_size {
            break;
        }

        let extent_length = extent.length();
        let phys_start = extent.phys_block_num * block_size;

        let mut extent_offset = 0u64;
        while extent_offset < extent_length && bytes_written < logical_size {
            let remaining_in_file = logical_size - bytes_written;
            let remaining_in_extent = extent_length - extent_offset;
            let to_read = remaining_in_file.min(remaining_in_extent).min(block_size) as usize;

            reader.seek(SeekFrom::Start(phys_start + extent_offset))?;
            reader.read_exact(&mut buf[..to_read])?;
            writer.write_all(&buf[..to_read])?;

            bytes_written += to_read as u64;
            extent_offset += to_read as u64;
        }
    }

    Ok(bytes_written)
}

#[cfg(test)]
mod tests {
    /// Requires ../tests/appfs.raw fixture. Run with `cargo test -- --ignored`.
    #[test]
    #[ignore]
    fn test_read_file() {
        let file = std::fs::File::open("../tests/appfs.raw").unwrap();
        let reader = std::io::BufReader::new(file);
        let container = crate::container::ApfsContainer::open(reader, None).unwrap();

        let vol = container.volumes().unwrap().into_iter().next().expect("container should have a volume");
        let walk = vol.walk(None).unwrap();
        let small_file = walk.iter()
            .find(|e| e.entry.kind == crate::EntryKind::File && e.entry.size > 0 && e.entry.size < 100_000);

        let entry = small_file.expect("Should find a small file in the test image");
        let data = vol.read_file(&entry.path, None).unwrap();
        assert!(!data.is_empty(), "File data should not be empty");
        assert_eq!(data.len() as u64, entry.entry.size);
    }
}
