// src/config.rs
//! Channel configuration.

use crate::error::{ArchiveError, Result};
use crate::types::{ElementType, SampleType};
use std::path::{Path, PathBuf};

/// Upper bound on samples per file, keeping file names and row counts sane
pub const MAX_SAMPLES_PER_FILE: u64 = 100_000_000_000;

/// Highest deflate level accepted for `compression_level`
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Configuration for one archived channel.
///
/// The required values go through [`ChannelConfig::new`]; the rest start at
/// their defaults and are adjusted with the builder setters.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Existing directory that receives the time-bucketed subdirectories.
    pub directory: PathBuf,

    /// Declared type of one scalar sample value.
    pub sample_type: SampleType,

    /// Each sample is a (real, imaginary) pair.
    pub is_complex: bool,

    /// Parallel values stored per sample period.
    pub subchannels: u32,

    /// Sample periods covered by one container file.
    pub samples_per_file: u64,

    /// Files per subdirectory before a new one is started.
    pub files_per_directory: u64,

    /// Absolute sample position of position 0, in samples since the epoch.
    pub start_offset: u64,

    /// Samples per second.
    pub sample_rate: f64,

    /// Identifier stamped on every file. A random v4 UUID when unset.
    pub channel_id: String,

    /// Deflate level, 0 disables compression.
    pub compression_level: u32,

    /// Store a CRC-32 per chunk.
    pub checksum: bool,

    /// Print a `.` to stdout for each file created.
    pub progress: bool,
}

impl ChannelConfig {
    pub fn new(
        directory: impl Into<PathBuf>,
        sample_type: SampleType,
        samples_per_file: u64,
        files_per_directory: u64,
        start_offset: u64,
        sample_rate: f64,
    ) -> Self {
        Self {
            directory: directory.into(),
            sample_type,
            is_complex: true,
            subchannels: 1,
            samples_per_file,
            files_per_directory,
            start_offset,
            sample_rate,
            channel_id: uuid::Uuid::new_v4().to_string(),
            compression_level: 0,
            checksum: false,
            progress: false,
        }
    }

    #[must_use]
    pub fn complex(mut self, value: bool) -> Self {
        self.is_complex = value;
        self
    }

    #[must_use]
    pub fn subchannels(mut self, count: u32) -> Self {
        self.subchannels = count;
        self
    }

    #[must_use]
    pub fn channel_id(mut self, id: impl Into<String>) -> Self {
        self.channel_id = id.into();
        self
    }

    /// Sets the deflate level (0-9).
    #[must_use]
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    #[must_use]
    pub fn checksum(mut self, value: bool) -> Self {
        self.checksum = value;
        self
    }

    #[must_use]
    pub fn progress(mut self, value: bool) -> Self {
        self.progress = value;
        self
    }

    pub fn element_type(&self) -> ElementType {
        ElementType::new(self.sample_type, self.is_complex)
    }

    /// Bytes occupied by one sample period across all subchannels
    pub fn bytes_per_sample(&self) -> usize {
        self.element_type().size() * self.subchannels as usize
    }

    /// Data must be chunked whenever a per-chunk filter is active
    pub fn needs_chunking(&self) -> bool {
        self.compression_level > 0 || self.checksum
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Check every value and that the top-level directory exists.
    pub fn validate(&self) -> Result<()> {
        if !self.sample_type.is_supported() {
            return Err(ArchiveError::UnknownSampleType(self.sample_type.to_string()));
        }
        if self.subchannels < 1 {
            return Err(ArchiveError::Config("subchannels must be at least 1".into()));
        }
        if self.samples_per_file == 0 {
            return Err(ArchiveError::Config("samples_per_file must be positive".into()));
        }
        if self.samples_per_file > MAX_SAMPLES_PER_FILE {
            return Err(ArchiveError::Config(format!(
                "samples_per_file {} exceeds {}",
                self.samples_per_file, MAX_SAMPLES_PER_FILE
            )));
        }
        if self.files_per_directory == 0 {
            return Err(ArchiveError::Config("files_per_directory must be positive".into()));
        }
        if self.start_offset == 0 {
            return Err(ArchiveError::Config("start_offset must be positive".into()));
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ArchiveError::Config(format!(
                "sample_rate must be positive and finite, got {}",
                self.sample_rate
            )));
        }
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(ArchiveError::Config(format!(
                "compression_level {} outside 0..={}",
                self.compression_level, MAX_COMPRESSION_LEVEL
            )));
        }
        if self.channel_id.is_empty() {
            return Err(ArchiveError::Config("channel_id must not be empty".into()));
        }
        if !self.directory.is_dir() {
            return Err(ArchiveError::Config(format!(
                "{} is not an existing directory",
                self.directory.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &Path) -> ChannelConfig {
        ChannelConfig::new(dir, SampleType::i16(), 1000, 10, 1_394_368_230 * 100, 100.0)
    }

    #[test]
    fn defaults() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        assert!(config.is_complex);
        assert_eq!(config.subchannels, 1);
        assert_eq!(config.compression_level, 0);
        assert!(!config.checksum);
        assert!(!config.needs_chunking());
        assert!(uuid::Uuid::parse_str(&config.channel_id).is_ok());
        config.validate().unwrap();
    }

    #[test]
    fn builder_pattern() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path())
            .complex(false)
            .subchannels(4)
            .channel_id("abc")
            .compression_level(3)
            .checksum(true);

        assert_eq!(config.bytes_per_sample(), 8);
        assert_eq!(config.channel_id, "abc");
        assert!(config.needs_chunking());
        config.validate().unwrap();
    }

    #[test]
    fn bytes_per_sample_counts_complex_parts() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path()).subchannels(2);
        assert_eq!(config.bytes_per_sample(), 8);
    }

    #[test]
    fn rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let base = config(dir.path());

        let cases = vec![
            ChannelConfig { samples_per_file: 0, ..base.clone() },
            ChannelConfig { samples_per_file: MAX_SAMPLES_PER_FILE + 1, ..base.clone() },
            ChannelConfig { files_per_directory: 0, ..base.clone() },
            ChannelConfig { start_offset: 0, ..base.clone() },
            ChannelConfig { sample_rate: 0.0, ..base.clone() },
            ChannelConfig { sample_rate: f64::INFINITY, ..base.clone() },
            ChannelConfig { subchannels: 0, ..base.clone() },
            base.clone().compression_level(10),
            base.clone().channel_id(""),
        ];
        for case in cases {
            let err = case.validate().unwrap_err();
            assert!(matches!(err, ArchiveError::Config(_)), "{:?}", err);
        }
    }

    #[test]
    fn rejects_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(config(&missing).validate().is_err());

        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(config(&file).validate().is_err());
    }
}
