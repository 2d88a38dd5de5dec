// src/lib.rs
//! # rfarchive
//!
//! Gap-aware archiving of continuous sample streams, such as radio-frequency
//! recordings, into time-bucketed directories of self-describing container files.
//!
//! ## Layout
//!
//! ```text
//! <directory>/<YYYY-MM-DDTHH:MM:SS>/rf@<unix seconds>.<milliseconds>.rfc
//! ```
//!
//! Each file holds `samples_per_file` sample periods in the `rf_data` dataset and
//! a sparse `rf_data_index` of `(absolute sample, file offset)` rows marking
//! where each contiguous run begins. A new subdirectory starts every
//! `files_per_directory` files.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rfarchive::*;
//!
//! fn main() -> Result<()> {
//!     let start = 1_394_368_230 * 1_000_000; // 2014-03-09T12:30:30Z at 1 MHz
//!     let config = ChannelConfig::new("/data/ch0", "<i2".parse()?, 1_000_000, 100, start, 1.0e6)
//!         .complex(true)
//!         .checksum(true);
//!
//!     let mut writer = ChannelWriter::open(config)?;
//!
//!     // One contiguous block of 1000 complex samples
//!     let block = vec![[0i16; 2]; 1000];
//!     writer.write_samples(0, &block)?;
//!
//!     // Two runs in one buffer with a gap between them
//!     writer.write_sample_blocks(&[1000, 5000], &[0, 500], &block)?;
//!
//!     writer.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Reading a file back
//!
//! ```rust,no_run
//! use rfarchive::*;
//!
//! fn main() -> Result<()> {
//!     let mut reader = ContainerReader::open("/data/ch0/2014-03-09T12:30:30/rf@1394368230.000.rfc")?;
//!     for [sample, offset] in reader.read_index(INDEX_DATASET)? {
//!         println!("sample {} at row {}", sample, offset);
//!     }
//!     Ok(())
//! }
//! ```

// Modules
pub mod config;
pub mod container;
pub mod error;
pub mod fill;
pub mod time;
pub mod types;
pub mod writer;

// Re-export commonly used types at the crate root for convenience
pub use error::{ArchiveError, ErrorKind, Result};

pub use config::ChannelConfig;

pub use types::{AttributeValue, ByteOrder, ElementType, SampleKind, SampleType};

pub use fill::{fill_pattern, FillPattern};

pub use time::{sample_to_calendar, SampleTime};

pub use container::{ContainerHeader, ContainerReader, ContainerWriter, DatasetId, DatasetSpec};

pub use writer::{
    ChannelWriter,
    FileCreated,
    IndexRow,
    RunTable,
    WriteCursor,
    DATA_DATASET,
    INDEX_DATASET,
};

// Prelude module for glob imports
pub mod prelude {
    //! Convenient imports for common use cases.
    //!
    //! ```rust
    //! use rfarchive::prelude::*;
    //! ```

    pub use crate::config::ChannelConfig;
    pub use crate::error::{ArchiveError, Result};
    pub use crate::types::SampleType;
    pub use crate::writer::{ChannelWriter, FileCreated};
}

/// Format version stamped on every file
pub const FORMAT_VERSION: &str = "1.0";

/// Zero point of every absolute sample position
pub const EPOCH: &str = "1970-01-01T00:00:00Z";

pub const TIME_DESCRIPTION: &str = "All times in this format are in number of samples since the epoch \
in the epoch attribute. The first sample time will be sample_rate * UTC time at first sample. \
Attribute init_utc_timestamp records this init UTC time so that a conversion to any other time is \
possible given the number of leapseconds difference at init_utc_timestamp. Leapseconds that occur \
during data recording are included in the data.";

/// File extension of container files
pub const CONTAINER_EXTENSION: &str = "rfc";

/// The library version
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");
