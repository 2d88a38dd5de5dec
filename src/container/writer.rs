// src/container/writer.rs
use super::{
    ContainerHeader, DatasetId, DatasetSpec, RecordKind, FILTER_CRC32, FILTER_DEFLATE,
    RECORD_HEADER_SIZE,
};
use crate::error::{ArchiveError, Result};
use crate::types::{write_string, AttributeValue};
use byteorder::{LittleEndian, WriteBytesExt};
use bytes::{BufMut, BytesMut};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only container writer.
///
/// The lead-in is written with [`ContainerHeader::INCOMPLETE_MARKER`] as the
/// body length and patched by [`finalize`](Self::finalize). Dropping an
/// unfinalized writer finalizes it and discards any error.
pub struct ContainerWriter {
    file: BufWriter<File>,
    path: PathBuf,
    datasets: Vec<DatasetSpec>,
    body_len: u64,
    record_count: u64,
    finalized: bool,
}

impl ContainerWriter {
    /// Create a new container. Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| ArchiveError::CreateContainer { path: path.clone(), source })?;

        let mut writer = ContainerWriter {
            file: BufWriter::new(file),
            path,
            datasets: Vec::new(),
            body_len: 0,
            record_count: 0,
            finalized: false,
        };
        writer.write_lead_in()?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dataset(&self, id: DatasetId) -> Option<&DatasetSpec> {
        self.datasets.get(id.0 as usize)
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn create_dataset(&mut self, spec: DatasetSpec) -> Result<DatasetId> {
        self.check_open()?;
        spec.validate()?;
        if self.datasets.iter().any(|d| d.name == spec.name) {
            return Err(ArchiveError::Config(format!("dataset {} already exists", spec.name)));
        }

        let id = DatasetId(self.datasets.len() as u32);
        let mut body = BytesMut::with_capacity(128).writer();
        body.write_u32::<LittleEndian>(id.0)?;
        spec.write_to(&mut body)?;
        self.write_record(RecordKind::Dataset, &body.into_inner())?;

        self.datasets.push(spec);
        Ok(id)
    }

    pub fn set_attribute(&mut self, id: DatasetId, name: &str, value: AttributeValue) -> Result<()> {
        self.check_open()?;
        self.spec(id)?;

        let mut body = BytesMut::with_capacity(64).writer();
        body.write_u32::<LittleEndian>(id.0)?;
        write_string(&mut body, name)?;
        value.write_to(&mut body)?;
        self.write_record(RecordKind::Attribute, &body.into_inner())
    }

    /// Grow dimension 0 of an extensible dataset to `rows`
    pub fn set_extent(&mut self, id: DatasetId, rows: u64) -> Result<()> {
        self.check_open()?;
        let spec = self.spec(id)?;
        if !spec.is_extensible() {
            return Err(ArchiveError::Config(format!("dataset {} is not extensible", spec.name)));
        }
        if rows < spec.rows() {
            return Err(ArchiveError::Config(format!(
                "dataset {} cannot shrink from {} to {} rows",
                spec.name,
                spec.rows(),
                rows
            )));
        }

        let mut body = BytesMut::with_capacity(12);
        body.put_u32_le(id.0);
        body.put_u64_le(rows);
        self.write_record(RecordKind::Extent, &body)?;

        if let Some(spec) = self.datasets.get_mut(id.0 as usize) {
            spec.dims[0] = rows;
        }
        Ok(())
    }

    /// Write whole rows starting at `first_row`.
    ///
    /// With filters active the rows are split at chunk boundaries and each
    /// piece is stored as its own DATA record.
    pub fn write_rows(&mut self, id: DatasetId, first_row: u64, data: &[u8]) -> Result<()> {
        self.check_open()?;
        let spec = self.spec(id)?;
        let row_size = spec.row_size();

        if data.len() % row_size != 0 {
            return Err(ArchiveError::PartialSample { bytes: data.len(), sample_size: row_size });
        }
        let row_count = (data.len() / row_size) as u64;
        let end = first_row.saturating_add(row_count);
        if end > spec.rows() {
            return Err(ArchiveError::RegionOutOfBounds {
                dataset: spec.name.clone(),
                first: first_row,
                end,
                rows: spec.rows(),
            });
        }
        if row_count == 0 {
            return Ok(());
        }

        if !spec.has_filters() {
            return self.write_data_record(id, first_row, row_count, 0, 0, data);
        }

        let chunk_rows = spec.chunk_rows;
        let level = spec.compression_level;
        let mask = spec.filter_mask();

        let mut row = first_row;
        while row < end {
            let chunk_end = ((row / chunk_rows) + 1) * chunk_rows;
            let piece_end = chunk_end.min(end);
            let start = ((row - first_row) as usize) * row_size;
            let stop = ((piece_end - first_row) as usize) * row_size;

            let stored = if mask & FILTER_DEFLATE != 0 {
                deflate(&data[start..stop], level)?
            } else {
                data[start..stop].to_vec()
            };
            let crc = if mask & FILTER_CRC32 != 0 { crc32fast::hash(&stored) } else { 0 };

            self.write_data_record(id, row, piece_end - row, mask, crc, &stored)?;
            row = piece_end;
        }
        Ok(())
    }

    /// Patch the lead-in with the final body length and sync to disk.
    ///
    /// Later calls are no-ops.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        self.file.flush()?;
        let end = self.file.stream_position()?;
        self.file.seek(SeekFrom::Start(ContainerHeader::BODY_LEN_OFFSET))?;
        self.file.write_u64::<LittleEndian>(self.body_len)?;
        self.file.write_u64::<LittleEndian>(self.record_count)?;
        self.file.seek(SeekFrom::Start(end))?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        tracing::debug!(path = %self.path.display(), records = self.record_count, "container finalized");
        Ok(())
    }

    fn write_lead_in(&mut self) -> Result<()> {
        self.file.write_all(ContainerHeader::TAG)?;
        self.file.write_u32::<LittleEndian>(ContainerHeader::VERSION)?;
        self.file.write_u32::<LittleEndian>(0)?; // flags
        self.file.write_u64::<LittleEndian>(ContainerHeader::INCOMPLETE_MARKER)?;
        self.file.write_u64::<LittleEndian>(0)?; // record count placeholder
        Ok(())
    }

    fn write_data_record(
        &mut self,
        id: DatasetId,
        first_row: u64,
        row_count: u64,
        mask: u8,
        crc: u32,
        payload: &[u8],
    ) -> Result<()> {
        let mut body = BytesMut::with_capacity(25 + payload.len());
        body.put_u32_le(id.0);
        body.put_u64_le(first_row);
        body.put_u64_le(row_count);
        body.put_u8(mask);
        body.put_u32_le(crc);
        body.put_slice(payload);
        self.write_record(RecordKind::Data, &body)
    }

    fn write_record(&mut self, kind: RecordKind, body: &[u8]) -> Result<()> {
        self.file.write_u8(kind as u8)?;
        self.file.write_u64::<LittleEndian>(body.len() as u64)?;
        self.file.write_all(body)?;
        self.body_len += RECORD_HEADER_SIZE + body.len() as u64;
        self.record_count += 1;
        Ok(())
    }

    fn spec(&self, id: DatasetId) -> Result<&DatasetSpec> {
        self.datasets
            .get(id.0 as usize)
            .ok_or_else(|| ArchiveError::DatasetNotFound(format!("#{}", id.0)))
    }

    fn check_open(&self) -> Result<()> {
        if self.finalized {
            return Err(ArchiveError::Corrupt(format!("{} is already finalized", self.path.display())));
        }
        Ok(())
    }
}

impl fmt::Debug for ContainerWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerWriter")
            .field("path", &self.path)
            .field("datasets", &self.datasets.len())
            .field("body_len", &self.body_len)
            .field("record_count", &self.record_count)
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl Drop for ContainerWriter {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
