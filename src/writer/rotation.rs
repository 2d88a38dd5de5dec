// src/writer/rotation.rs
use crate::config::ChannelConfig;
use crate::error::{ArchiveError, Result};
use crate::time::{sample_to_calendar, split_seconds};
use crate::writer::gap_index::RunTable;
use crate::CONTAINER_EXTENSION;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const PICOS_PER_MILLI: u64 = 1_000_000_000;

/// Reported to the progress callback each time a file is created
#[derive(Debug, Clone, Copy)]
pub struct FileCreated<'a> {
    pub sequence: u64,
    pub path: &'a Path,
    /// Absolute position of the file's first sample
    pub anchor_sample: u64,
    pub new_directory: bool,
}

/// Progress callback invoked once per created file
pub type ProgressFn = Box<dyn FnMut(&FileCreated<'_>) + Send>;

/// Decides when files and directories roll over and what they are called
pub struct RotationPolicy {
    directory: PathBuf,
    files_per_directory: u64,
    start_offset: u64,
    sample_rate: f64,
    progress: Option<ProgressFn>,
}

impl RotationPolicy {
    pub fn new(config: &ChannelConfig) -> Self {
        let progress: Option<ProgressFn> = if config.progress { Some(Box::new(print_dot)) } else { None };
        RotationPolicy {
            directory: config.directory.clone(),
            files_per_directory: config.files_per_directory,
            start_offset: config.start_offset,
            sample_rate: config.sample_rate,
            progress,
        }
    }

    pub fn set_progress(&mut self, progress: Option<ProgressFn>) {
        self.progress = progress;
    }

    /// Relative position of the first sample the next file will hold.
    ///
    /// `consumed` may fall strictly between two run starts.
    pub fn next_file_anchor(runs: &RunTable, consumed: u64) -> u64 {
        runs.position_of(consumed)
    }

    pub fn should_start_new_directory(&self, sequence: u64) -> bool {
        sequence % self.files_per_directory == 0
    }

    fn absolute(&self, anchor: u64) -> Result<u64> {
        anchor
            .checked_add(self.start_offset)
            .ok_or(ArchiveError::PositionOverflow { position: anchor })
    }

    /// `YYYY-MM-DDTHH:MM:SS` of the anchor sample
    pub fn directory_name(&self, anchor: u64) -> Result<String> {
        let time = sample_to_calendar(self.absolute(anchor)?, self.sample_rate)?;
        Ok(time.directory_name())
    }

    /// `rf@<unix seconds>.<milliseconds>.rfc` of the anchor sample.
    ///
    /// Milliseconds are rounded to nearest, carrying into the seconds.
    pub fn file_name(&self, anchor: u64) -> Result<String> {
        let (mut seconds, picoseconds) = split_seconds(self.absolute(anchor)?, self.sample_rate)?;
        let mut millis = (picoseconds + PICOS_PER_MILLI / 2) / PICOS_PER_MILLI;
        if millis == 1000 {
            seconds += 1;
            millis = 0;
        }
        Ok(format!("rf@{:07}.{:03}.{}", seconds, millis, CONTAINER_EXTENSION))
    }

    /// Create the subdirectory for `anchor`. An existing path is an error.
    pub fn create_directory(&self, anchor: u64) -> Result<String> {
        let name = self.directory_name(anchor)?;
        let path = self.directory.join(&name);
        fs::create_dir(&path).map_err(|source| ArchiveError::CreateDirectory { path: path.clone(), source })?;
        tracing::debug!(path = %path.display(), "created directory");
        Ok(name)
    }

    pub fn file_path(&self, sub_directory: &str, anchor: u64) -> Result<PathBuf> {
        Ok(self.directory.join(sub_directory).join(self.file_name(anchor)?))
    }

    pub fn file_created(&mut self, event: &FileCreated<'_>) {
        tracing::debug!(
            sequence = event.sequence,
            anchor = event.anchor_sample,
            path = %event.path.display(),
            "created file"
        );
        if let Some(progress) = self.progress.as_mut() {
            progress(event);
        }
    }
}

impl fmt::Debug for RotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationPolicy")
            .field("directory", &self.directory)
            .field("files_per_directory", &self.files_per_directory)
            .field("start_offset", &self.start_offset)
            .field("sample_rate", &self.sample_rate)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

fn print_dot(_: &FileCreated<'_>) {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b".");
    let _ = stdout.flush();
}
