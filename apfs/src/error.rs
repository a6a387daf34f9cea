use thiserror::Error;

/// Error taxonomy for every failure mode the on-disk engine can observe.
///
/// Parsers never panic: a short buffer, an out-of-bounds offset, or a
/// signature mismatch always produces one of these variants carrying
/// enough context (offsets, expected/observed values) to explain itself.
#[derive(Error, Debug)]
pub enum ApfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read: needed {needed} bytes, got {got} at offset {offset}")]
    IoShortRead { offset: u64, needed: usize, got: usize },

    #[error("invalid magic: expected 0x{expected:08X}, observed 0x{observed:08X}")]
    InvalidMagic { expected: u32, observed: u32 },

    #[error("invalid version: expected {expected}, observed {observed}")]
    InvalidVersion { expected: u32, observed: u32 },

    #[error("structure too small: {0}")]
    StructureTooSmall(String),

    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("invalid checksum")]
    InvalidChecksum,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid B-tree: {0}")]
    InvalidBTree(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    #[error("no volume found in container")]
    NoVolume,
}

pub type Result<T> = std::result::Result<T, ApfsError>;
