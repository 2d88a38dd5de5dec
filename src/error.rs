// src/error.rs
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Broad classification of an [`ArchiveError`].
///
/// `Config`, `Ordering` and `Index` are caller bugs and will fail the same way
/// on retry. `Io` and `Time` come from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Ordering,
    Index,
    Io,
    Time,
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unrecognized sample type: {0}")]
    UnknownSampleType(String),

    #[error("Empty write: buffer holds no samples")]
    EmptyWrite,

    #[error("First buffer offset must be 0, found {0}")]
    NonzeroFirstOffset(u64),

    #[error("Sample positions not strictly increasing at run {index}")]
    PositionsNotIncreasing { index: usize },

    #[error("Write at sample {requested} precedes next writable sample {expected}")]
    WriteBeforeCursor { requested: u64, expected: u64 },

    #[error("Writer closed")]
    WriterClosed,

    #[error("Write request declares no runs")]
    NoRuns,

    #[error("Run arrays differ in length: {positions} positions, {offsets} offsets")]
    MismatchedRuns { positions: usize, offsets: usize },

    #[error("Buffer offsets not strictly increasing at run {index}")]
    OffsetsNotIncreasing { index: usize },

    #[error("Run {index} advances {offset_advance} samples in the buffer but only {position_advance} in time")]
    RunOverflow { index: usize, offset_advance: u64, position_advance: u64 },

    #[error("Run {index} starts at offset {offset}, past the end of a {length}-sample buffer")]
    OffsetOutOfBuffer { index: usize, offset: u64, length: u64 },

    #[error("Sample position {position} overflows the absolute sample range")]
    PositionOverflow { position: u64 },

    #[error("Buffer of {bytes} bytes is not a whole number of {sample_size}-byte samples")]
    PartialSample { bytes: usize, sample_size: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot create directory {path}: {source}")]
    CreateDirectory { path: PathBuf, source: io::Error },

    #[error("Cannot create container {path}: {source}")]
    CreateContainer { path: PathBuf, source: io::Error },

    #[error("Invalid container tag: expected {expected}, found {found}")]
    InvalidTag { expected: String, found: String },

    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u32),

    #[error("Corrupt container: {0}")]
    Corrupt(String),

    #[error("Checksum mismatch in {dataset} at row {row}: expected {expected:#010x}, found {actual:#010x}")]
    ChecksumMismatch { dataset: String, row: u64, expected: u32, actual: u32 },

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Region rows {first}..{end} outside dataset {dataset} with {rows} rows")]
    RegionOutOfBounds { dataset: String, first: u64, end: u64, rows: u64 },

    #[error("Invalid UTF-8 in string data")]
    InvalidUtf8,

    #[error("Time conversion failed: {0}")]
    Time(String),
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::Config(_) | ArchiveError::UnknownSampleType(_) => ErrorKind::Config,

            ArchiveError::EmptyWrite
            | ArchiveError::NonzeroFirstOffset(_)
            | ArchiveError::PositionsNotIncreasing { .. }
            | ArchiveError::WriteBeforeCursor { .. }
            | ArchiveError::WriterClosed => ErrorKind::Ordering,

            ArchiveError::NoRuns
            | ArchiveError::MismatchedRuns { .. }
            | ArchiveError::OffsetsNotIncreasing { .. }
            | ArchiveError::RunOverflow { .. }
            | ArchiveError::OffsetOutOfBuffer { .. }
            | ArchiveError::PositionOverflow { .. }
            | ArchiveError::PartialSample { .. } => ErrorKind::Index,

            ArchiveError::Io(_)
            | ArchiveError::CreateDirectory { .. }
            | ArchiveError::CreateContainer { .. }
            | ArchiveError::InvalidTag { .. }
            | ArchiveError::UnsupportedVersion(_)
            | ArchiveError::Corrupt(_)
            | ArchiveError::ChecksumMismatch { .. }
            | ArchiveError::DatasetNotFound(_)
            | ArchiveError::RegionOutOfBounds { .. }
            | ArchiveError::InvalidUtf8 => ErrorKind::Io,

            ArchiveError::Time(_) => ErrorKind::Time,
        }
    }

    /// True when the failure came from the environment and a caller may
    /// reasonably try again after inspecting the writer's position.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Io
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
