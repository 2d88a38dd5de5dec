// src/writer/channel_writer.rs
use crate::config::ChannelConfig;
use crate::container::{ContainerWriter, DatasetId, DatasetSpec};
use crate::error::{ArchiveError, Result};
use crate::fill::FillPattern;
use crate::types::{AttributeValue, ByteOrder, ElementType, SampleType};
use crate::writer::gap_index::{GapIndexBuilder, IndexRow, IndexWindow, RunTable};
use crate::writer::rotation::{FileCreated, ProgressFn, RotationPolicy};
use crate::{EPOCH, FORMAT_VERSION, TIME_DESCRIPTION};
use bytemuck::Pod;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DATA_DATASET: &str = "rf_data";
pub const INDEX_DATASET: &str = "rf_data_index";

/// Rows per chunk of the index dataset
const INDEX_CHUNK_ROWS: u64 = 100;

/// Where the next sample lands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteCursor {
    /// Next relative sample position that may be written
    pub global_index: u64,
    /// Ordinal of the current or most recent file
    pub file_sequence: Option<u64>,
    /// Next row of the open file's sample dataset
    pub dataset_index: u64,
    /// Rows left in the open file's sample dataset
    pub dataset_avail: u64,
    /// Rows in the open file's index dataset
    pub index_rows_written: u64,
    /// Name of the current subdirectory
    pub sub_directory: Option<String>,
}

struct OpenFile {
    container: ContainerWriter,
    data: DatasetId,
    index: Option<DatasetId>,
    /// In-file offset of the newest index row
    last_index_offset: Option<u64>,
}

/// Writes one channel's samples into time-bucketed container files.
///
/// Writes must move forward: every call starts at or after
/// [`next_sample`](Self::next_sample). A call may span any number of files,
/// and a failure part way through leaves everything before it on disk with
/// the cursor pointing just past it.
pub struct ChannelWriter {
    config: ChannelConfig,
    element: ElementType,
    fill: FillPattern,
    bytes_per_sample: usize,
    init_utc_timestamp: u64,
    chunk_rows: Option<u64>,

    rotation: RotationPolicy,
    gap_index: GapIndexBuilder,

    cursor: WriteCursor,
    file: Option<OpenFile>,
    /// Sequence the current subdirectory was created for
    directory_sequence: Option<u64>,
    closed: bool,

    samples_written: u64,
    gap_samples: u64,
    files_created: u64,
}

impl ChannelWriter {
    pub fn open(config: ChannelConfig) -> Result<Self> {
        config.validate()?;

        let element = config.element_type();
        let writer = ChannelWriter {
            element,
            fill: FillPattern::for_element(element),
            bytes_per_sample: config.bytes_per_sample(),
            init_utc_timestamp: unix_now(),
            chunk_rows: None,
            rotation: RotationPolicy::new(&config),
            gap_index: GapIndexBuilder::new(config.start_offset),
            cursor: WriteCursor::default(),
            file: None,
            directory_sequence: None,
            closed: false,
            samples_written: 0,
            gap_samples: 0,
            files_created: 0,
            config,
        };

        tracing::info!(
            directory = %writer.config.directory.display(),
            channel_id = %writer.config.channel_id,
            sample_type = %writer.config.sample_type,
            samples_per_file = writer.config.samples_per_file,
            "opened channel writer"
        );
        Ok(writer)
    }

    /// Install a callback run after each file is created
    #[must_use]
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: FnMut(&FileCreated<'_>) + Send + 'static,
    {
        let progress: ProgressFn = Box::new(progress);
        self.rotation.set_progress(Some(progress));
        self
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn cursor(&self) -> &WriteCursor {
        &self.cursor
    }

    /// Samples stored so far, gaps excluded
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Positions skipped so far, between calls and inside them
    pub fn gap_samples(&self) -> u64 {
        self.gap_samples
    }

    /// First relative position the next write may start at
    pub fn next_sample(&self) -> u64 {
        self.cursor.global_index
    }

    pub fn files_created(&self) -> u64 {
        self.files_created
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write a contiguous buffer starting at relative position `position`
    pub fn write(&mut self, position: u64, buffer: &[u8]) -> Result<()> {
        self.write_blocks(&[position], &[0], buffer)
    }

    /// Typed form of [`write`](Self::write)
    pub fn write_samples<T: Pod>(&mut self, position: u64, samples: &[T]) -> Result<()> {
        self.write(position, bytemuck::cast_slice(samples))
    }

    /// Typed form of [`write_blocks`](Self::write_blocks)
    pub fn write_sample_blocks<T: Pod>(&mut self, positions: &[u64], offsets: &[u64], samples: &[T]) -> Result<()> {
        self.write_blocks(positions, offsets, bytemuck::cast_slice(samples))
    }

    /// Write a buffer made of runs.
    ///
    /// Run `i` starts at buffer sample `offsets[i]` and relative position
    /// `positions[i]`. Offsets count samples, not bytes.
    pub fn write_blocks(&mut self, positions: &[u64], offsets: &[u64], buffer: &[u8]) -> Result<()> {
        let runs = self.validate_request(positions, offsets, buffer)?;
        let total = runs.buffer_len();

        if self.config.needs_chunking() && self.chunk_rows.is_none() {
            self.chunk_rows = Some(total.min(self.config.samples_per_file));
        }

        let mut consumed = 0u64;
        while consumed < total {
            if self.file.is_none() {
                self.open_next_file(&runs, consumed)?;
            }
            let count = (total - consumed).min(self.cursor.dataset_avail);
            self.write_slice(&runs, buffer, consumed, count)?;
            consumed += count;

            if self.cursor.dataset_avail == 0 {
                self.close_file()?;
            }
        }
        Ok(())
    }

    /// Finalize the open file. Later writes fail with `WriterClosed`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.close_file()?;
        tracing::info!(
            samples = self.samples_written,
            gaps = self.gap_samples,
            files = self.files_created,
            "closed channel writer"
        );
        Ok(())
    }

    /// Every check a request must pass before any state changes
    fn validate_request(&self, positions: &[u64], offsets: &[u64], buffer: &[u8]) -> Result<RunTable> {
        if self.closed {
            return Err(ArchiveError::WriterClosed);
        }
        if buffer.is_empty() {
            return Err(ArchiveError::EmptyWrite);
        }
        if buffer.len() % self.bytes_per_sample != 0 {
            return Err(ArchiveError::PartialSample {
                bytes: buffer.len(),
                sample_size: self.bytes_per_sample,
            });
        }

        let runs = RunTable::new(positions, offsets, (buffer.len() / self.bytes_per_sample) as u64)?;
        let first = runs.first().position;
        if first < self.cursor.global_index {
            return Err(ArchiveError::WriteBeforeCursor {
                requested: first,
                expected: self.cursor.global_index,
            });
        }
        runs.end_position()
            .checked_add(self.config.start_offset)
            .ok_or(ArchiveError::PositionOverflow { position: runs.last().position })?;
        Ok(runs)
    }

    /// Write `count` buffer samples from `consumed` into the open file
    fn write_slice(&mut self, runs: &RunTable, buffer: &[u8], consumed: u64, count: u64) -> Result<()> {
        let window = IndexWindow {
            first: consumed,
            capacity: self.cursor.dataset_avail,
            dataset_index: self.cursor.dataset_index,
            expected: self.cursor.global_index,
        };
        let rows = self.gap_index.rows(runs, &window);

        let start = consumed as usize * self.bytes_per_sample;
        let end = (consumed + count) as usize * self.bytes_per_sample;
        // Index first: a failed data write then leaves a row a retry overwrites
        self.append_index_rows(&rows)?;
        let file = self.file.as_mut().ok_or(ArchiveError::WriterClosed)?;
        file.container.write_rows(file.data, self.cursor.dataset_index, &buffer[start..end])?;

        let next = runs.position_after(consumed + count);
        self.gap_samples += next - self.cursor.global_index - count;
        self.samples_written += count;

        self.cursor.global_index = next;
        self.cursor.dataset_index += count;
        self.cursor.dataset_avail -= count;
        Ok(())
    }

    /// Append `rows` to the open file's index.
    ///
    /// A first row at the same offset as the newest stored row replaces it.
    /// That row anchored samples that never arrived: a trailing run, or a
    /// slice whose data write failed.
    fn append_index_rows(&mut self, rows: &[IndexRow]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let file = self.file.as_mut().ok_or(ArchiveError::WriterClosed)?;

        let bytes: Vec<u8> = rows.iter().flat_map(|r| r.to_le_bytes()).collect();
        let stored = self.cursor.index_rows_written;
        let first_row = if file.last_index_offset == Some(first.offset) { stored - 1 } else { stored };
        let new_rows = first_row + rows.len() as u64;

        let id = match file.index {
            Some(id) => {
                if new_rows > stored {
                    file.container.set_extent(id, new_rows)?;
                }
                id
            }
            None => {
                let element = ElementType::Scalar(SampleType::u64().with_order(ByteOrder::Little));
                let spec = DatasetSpec::new(INDEX_DATASET, element, &[new_rows, 2])
                    .extensible()
                    .chunked(INDEX_CHUNK_ROWS);
                let id = file.container.create_dataset(spec)?;
                file.index = Some(id);
                id
            }
        };
        file.container.write_rows(id, first_row, &bytes)?;
        file.last_index_offset = rows.last().map(|r| r.offset);
        self.cursor.index_rows_written = self.cursor.index_rows_written.max(new_rows);
        Ok(())
    }

    fn open_next_file(&mut self, runs: &RunTable, consumed: u64) -> Result<()> {
        let anchor = RotationPolicy::next_file_anchor(runs, consumed);
        let sequence = self.cursor.file_sequence.map_or(0, |s| s + 1);

        let new_directory = self.cursor.sub_directory.is_none()
            || (self.rotation.should_start_new_directory(sequence)
                && self.directory_sequence != Some(sequence));
        if new_directory {
            let name = self.rotation.create_directory(anchor)?;
            self.cursor.sub_directory = Some(name);
            self.directory_sequence = Some(sequence);
        }

        let sub_directory = self.cursor.sub_directory.as_deref().unwrap_or_default();
        let path = self.rotation.file_path(sub_directory, anchor)?;
        let file = self.create_file(&path, sequence)?;

        self.file = Some(file);
        self.cursor.file_sequence = Some(sequence);
        self.cursor.dataset_index = 0;
        self.cursor.dataset_avail = self.config.samples_per_file;
        self.cursor.index_rows_written = 0;
        self.files_created += 1;

        self.rotation.file_created(&FileCreated {
            sequence,
            path: &path,
            anchor_sample: anchor + self.config.start_offset,
            new_directory,
        });
        Ok(())
    }

    fn create_file(&self, path: &Path, sequence: u64) -> Result<OpenFile> {
        let mut container = ContainerWriter::create(path)?;

        let mut dims = vec![self.config.samples_per_file];
        if self.config.is_complex || self.config.subchannels > 1 {
            dims.push(self.config.subchannels as u64);
        }
        let mut spec = DatasetSpec::new(DATA_DATASET, self.element, &dims).fill(self.fill.clone());
        if let Some(chunk_rows) = self.chunk_rows {
            spec = spec
                .chunked(chunk_rows)
                .deflate(self.config.compression_level)
                .checksum(self.config.checksum);
        }
        let data = container.create_dataset(spec)?;

        for (name, value) in self.file_attributes(sequence) {
            container.set_attribute(data, name, value)?;
        }
        Ok(OpenFile { container, data, index: None, last_index_offset: None })
    }

    fn file_attributes(&self, sequence: u64) -> Vec<(&'static str, AttributeValue)> {
        vec![
            ("sequence_num", AttributeValue::I64(sequence as i64)),
            ("num_subchannels", AttributeValue::I32(self.config.subchannels as i32)),
            ("is_complex", AttributeValue::I32(self.config.is_complex as i32)),
            ("samples_per_file", AttributeValue::U64(self.config.samples_per_file)),
            ("sample_rate", AttributeValue::Double(self.config.sample_rate)),
            ("init_utc_timestamp", AttributeValue::U64(self.init_utc_timestamp)),
            ("computer_time", AttributeValue::U64(unix_now())),
            ("channel_id", AttributeValue::from(self.config.channel_id.as_str())),
            ("epoch", AttributeValue::from(EPOCH)),
            ("time_description", AttributeValue::from(TIME_DESCRIPTION)),
            ("format_version", AttributeValue::from(FORMAT_VERSION)),
        ]
    }

    fn close_file(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            self.cursor.dataset_index = 0;
            self.cursor.dataset_avail = 0;
            file.container.finalize()?;
        }
        Ok(())
    }

    /// Path of the file currently receiving samples
    pub fn current_file(&self) -> Option<PathBuf> {
        self.file.as_ref().map(|f| f.container.path().to_path_buf())
    }
}

impl fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelWriter")
            .field("directory", &self.config.directory)
            .field("cursor", &self.cursor)
            .field("samples_written", &self.samples_written)
            .field("gap_samples", &self.gap_samples)
            .field("files_created", &self.files_created)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close channel writer on drop");
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerReader;
    use tempfile::TempDir;

    const START: u64 = 1_394_368_230 * 100;

    fn config(dir: &Path) -> ChannelConfig {
        ChannelConfig::new(dir, SampleType::i16(), 40, 10, START, 100.0).complex(false)
    }

    fn samples(range: std::ops::Range<i16>) -> Vec<i16> {
        range.collect()
    }

    #[test]
    fn test_continuous_writes_share_a_file() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChannelWriter::open(config(dir.path())).unwrap();
        writer.write_samples(0, &samples(0..10)).unwrap();
        writer.write_samples(10, &samples(10..20)).unwrap();

        assert_eq!(writer.files_created(), 1);
        assert_eq!(writer.next_sample(), 20);
        assert_eq!(writer.cursor().dataset_index, 20);
        assert_eq!(writer.cursor().dataset_avail, 20);
        assert_eq!(writer.cursor().index_rows_written, 1);
        assert_eq!(writer.samples_written(), 20);
        assert_eq!(writer.gap_samples(), 0);

        let path = writer.current_file().unwrap();
        writer.close().unwrap();

        let mut reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.read_index(INDEX_DATASET).unwrap(), vec![[START, 0]]);
        let data = reader.read_rows(DATA_DATASET, 0, 21).unwrap();
        let values: Vec<i16> = data.chunks_exact(2).map(|c| i16::from_ne_bytes([c[0], c[1]])).collect();
        assert_eq!(&values[..20], &samples(0..20)[..]);
        assert_eq!(values[20], i16::MIN);
    }

    #[test]
    fn test_gap_between_calls_adds_index_row() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChannelWriter::open(config(dir.path())).unwrap();
        writer.write_samples(0, &samples(0..10)).unwrap();
        writer.write_samples(25, &samples(0..10)).unwrap();

        assert_eq!(writer.next_sample(), 35);
        assert_eq!(writer.gap_samples(), 15);
        assert_eq!(writer.cursor().index_rows_written, 2);

        let path = writer.current_file().unwrap();
        drop(writer);
        let mut reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.read_index(INDEX_DATASET).unwrap(), vec![[START, 0], [START + 25, 10]]);
    }

    #[test]
    fn test_rejected_write_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChannelWriter::open(config(dir.path())).unwrap();
        writer.write_samples(0, &samples(0..10)).unwrap();
        let before = writer.cursor().clone();

        let err = writer.write_samples(5, &samples(0..10)).unwrap_err();
        assert!(matches!(err, ArchiveError::WriteBeforeCursor { requested: 5, expected: 10 }));
        assert!(matches!(writer.write(10, &[]), Err(ArchiveError::EmptyWrite)));
        assert!(matches!(writer.write(10, &[0u8; 3]), Err(ArchiveError::PartialSample { .. })));
        assert!(matches!(
            writer.write_sample_blocks(&[10, 12], &[0, 5], &samples(0..10)),
            Err(ArchiveError::RunOverflow { .. })
        ));

        assert_eq!(writer.cursor(), &before);
        assert_eq!(writer.samples_written(), 10);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChannelWriter::open(config(dir.path())).unwrap();
        writer.write_samples(0, &samples(0..5)).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(writer.is_closed());

        let err = writer.write_samples(5, &samples(0..5)).unwrap_err();
        assert!(matches!(err, ArchiveError::WriterClosed));
        assert_eq!(err.kind(), crate::error::ErrorKind::Ordering);
    }

    #[test]
    fn test_chunking_fixed_by_first_write() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChannelWriter::open(config(dir.path()).checksum(true)).unwrap();
        writer.write_samples(0, &samples(0..15)).unwrap();
        writer.write_samples(15, &samples(0..100)).unwrap();
        assert_eq!(writer.chunk_rows, Some(15));

        let path = writer.current_file().unwrap();
        drop(writer);
        let reader = ContainerReader::open(&path).unwrap();
        let spec = reader.dataset(DATA_DATASET).unwrap();
        assert_eq!(spec.chunk_rows, 15);
        assert!(spec.checksum);
    }

    #[test]
    fn test_no_chunking_without_filters() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChannelWriter::open(config(dir.path())).unwrap();
        writer.write_samples(0, &samples(0..15)).unwrap();
        assert_eq!(writer.chunk_rows, None);
    }

    #[test]
    fn test_subchannels_make_two_dimensional_data() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChannelWriter::open(config(dir.path()).subchannels(3)).unwrap();
        writer.write_samples(0, &samples(0..30)).unwrap();
        assert_eq!(writer.samples_written(), 10);

        let path = writer.current_file().unwrap();
        drop(writer);
        let reader = ContainerReader::open(&path).unwrap();
        let spec = reader.dataset(DATA_DATASET).unwrap();
        assert_eq!(spec.dims.as_slice(), &[40, 3]);
        assert_eq!(reader.attribute(DATA_DATASET, "num_subchannels"), Some(&AttributeValue::I32(3)));
    }
    #[test]
    fn test_complex_data_keeps_subchannel_dimension() {
        let dir = TempDir::new().unwrap();
        let config = ChannelConfig::new(dir.path(), SampleType::i16(), 40, 10, START, 100.0);
        let mut writer = ChannelWriter::open(config).unwrap();
        writer.write_samples(0, &samples(0..20)).unwrap();

        let path = writer.current_file().unwrap();
        drop(writer);
        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.dataset(DATA_DATASET).unwrap().dims.as_slice(), &[40, 1]);
    }

    #[test]
    fn test_stale_index_row_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChannelWriter::open(config(dir.path())).unwrap();
        writer.write_samples(0, &samples(0..10)).unwrap();

        // Row stored for a slice whose samples never landed
        writer.append_index_rows(&[IndexRow { sample: START + 20, offset: 10 }]).unwrap();
        assert_eq!(writer.cursor().index_rows_written, 2);
        assert_eq!(writer.next_sample(), 10);

        writer.write_samples(25, &samples(0..10)).unwrap();
        assert_eq!(writer.cursor().index_rows_written, 2);

        let path = writer.current_file().unwrap();
        drop(writer);
        let mut reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.read_index(INDEX_DATASET).unwrap(), vec![[START, 0], [START + 25, 10]]);
    }

    #[test]
    fn test_debug_names_directory() {
        let dir = TempDir::new().unwrap();
        let writer = ChannelWriter::open(config(dir.path())).unwrap();
        let text = format!("{:?}", writer);
        assert!(text.starts_with("ChannelWriter"));
        assert!(text.contains("gap_samples: 0"));
    }
}
