// src/container/reader.rs
use super::{
    ContainerHeader, DatasetSpec, RecordKind, FILTER_CRC32, FILTER_DEFLATE, RECORD_HEADER_SIZE,
};
use crate::error::{ArchiveError, Result};
use crate::types::{read_string, AttributeValue, ByteOrder, SampleKind};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

#[cfg(feature = "mmap")]
use memmap2::Mmap;

/// Trait alias for Read + Seek
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Location of one DATA record's payload
#[derive(Debug, Clone)]
struct DataExtent {
    first_row: u64,
    row_count: u64,
    mask: u8,
    crc: u32,
    offset: u64,
    len: u64,
}

#[derive(Debug)]
struct DatasetEntry {
    spec: DatasetSpec,
    attributes: Vec<(String, AttributeValue)>,
    extents: Vec<DataExtent>,
}

/// Reads a container back, finalized or not.
///
/// An unfinalized container is read up to its last complete record.
pub struct ContainerReader<R: ReadSeek> {
    file: R,
    datasets: Vec<DatasetEntry>,
    by_name: HashMap<String, usize>,
    finalized: bool,
    record_count: u64,
}

impl ContainerReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::with_capacity(65536, file))
    }
}

/// Constructor for memory-mapped file I/O (requires "mmap" feature)
#[cfg(feature = "mmap")]
impl ContainerReader<Cursor<Mmap>> {
    pub fn open_mmap(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_reader(Cursor::new(mmap))
    }
}

impl<R: ReadSeek> ContainerReader<R> {
    pub fn from_reader(file: R) -> Result<Self> {
        let mut reader = ContainerReader {
            file,
            datasets: Vec::new(),
            by_name: HashMap::new(),
            finalized: false,
            record_count: 0,
        };
        reader.parse()?;
        Ok(reader)
    }

    /// True when the lead-in was patched by a clean finalize
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Records successfully parsed
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn datasets(&self) -> impl Iterator<Item = &DatasetSpec> {
        self.datasets.iter().map(|d| &d.spec)
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetSpec> {
        self.entry(name).map(|d| &d.spec)
    }

    pub fn attribute(&self, dataset: &str, name: &str) -> Option<&AttributeValue> {
        let entry = self.entry(dataset).ok()?;
        entry.attributes.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn attributes(&self, dataset: &str) -> Result<&[(String, AttributeValue)]> {
        Ok(&self.entry(dataset)?.attributes)
    }

    /// Read `count` rows starting at `first`.
    ///
    /// Rows never written hold the dataset's fill pattern. Checksummed pieces
    /// are verified before use.
    pub fn read_rows(&mut self, dataset: &str, first: u64, count: u64) -> Result<Vec<u8>> {
        let index = *self
            .by_name
            .get(dataset)
            .ok_or_else(|| ArchiveError::DatasetNotFound(dataset.to_string()))?;
        let entry = &self.datasets[index];
        let spec = &entry.spec;

        let end = first.saturating_add(count);
        if end > spec.rows() {
            return Err(ArchiveError::RegionOutOfBounds {
                dataset: spec.name.clone(),
                first,
                end,
                rows: spec.rows(),
            });
        }

        let row_size = spec.row_size();
        let mut out = spec.fill.repeat((count * spec.columns()) as usize);
        let extents: Vec<DataExtent> = entry
            .extents
            .iter()
            .filter(|e| e.first_row < end && e.first_row + e.row_count > first)
            .cloned()
            .collect();

        for extent in extents {
            let rows = self.load_extent(index, &extent)?;
            if rows.len() != extent.row_count as usize * row_size {
                return Err(ArchiveError::Corrupt(format!(
                    "{} rows at {} decode to {} bytes",
                    extent.row_count,
                    extent.first_row,
                    rows.len()
                )));
            }

            let lo = extent.first_row.max(first);
            let hi = (extent.first_row + extent.row_count).min(end);
            let src = ((lo - extent.first_row) as usize) * row_size;
            let dst = ((lo - first) as usize) * row_size;
            let len = ((hi - lo) as usize) * row_size;
            out[dst..dst + len].copy_from_slice(&rows[src..src + len]);
        }
        Ok(out)
    }

    /// Read a two-column unsigned 64-bit dataset as `[sample, offset]` pairs
    pub fn read_index(&mut self, dataset: &str) -> Result<Vec<[u64; 2]>> {
        let spec = self.dataset(dataset)?;
        let sample_type = spec.element.sample_type();
        if spec.element.is_complex()
            || sample_type.kind != SampleKind::UInt
            || sample_type.width != 8
            || spec.columns() != 2
        {
            return Err(ArchiveError::Corrupt(format!("{} is not an index dataset", dataset)));
        }
        let order = sample_type.order;
        let rows = spec.rows();

        let bytes = self.read_rows(dataset, 0, rows)?;
        let decode = |b: &[u8]| match order {
            ByteOrder::Little => LittleEndian::read_u64(b),
            ByteOrder::Big => BigEndian::read_u64(b),
        };
        Ok(bytes.chunks_exact(16).map(|row| [decode(&row[..8]), decode(&row[8..])]).collect())
    }

    fn entry(&self, name: &str) -> Result<&DatasetEntry> {
        self.by_name
            .get(name)
            .map(|i| &self.datasets[*i])
            .ok_or_else(|| ArchiveError::DatasetNotFound(name.to_string()))
    }

    fn load_extent(&mut self, index: usize, extent: &DataExtent) -> Result<Vec<u8>> {
        let mut stored = vec![0u8; extent.len as usize];
        self.file.seek(SeekFrom::Start(extent.offset))?;
        self.file.read_exact(&mut stored)?;

        if extent.mask & FILTER_CRC32 != 0 {
            let actual = crc32fast::hash(&stored);
            if actual != extent.crc {
                return Err(ArchiveError::ChecksumMismatch {
                    dataset: self.datasets[index].spec.name.clone(),
                    row: extent.first_row,
                    expected: extent.crc,
                    actual,
                });
            }
        }

        if extent.mask & FILTER_DEFLATE != 0 {
            let mut rows = Vec::with_capacity(stored.len() * 2);
            DeflateDecoder::new(stored.as_slice()).read_to_end(&mut rows)?;
            Ok(rows)
        } else {
            Ok(stored)
        }
    }

    fn parse(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let file_size = self.file.seek(SeekFrom::End(0))?;
        self.file.seek(SeekFrom::Start(0))?;

        if file_size < ContainerHeader::LEAD_IN_SIZE as u64 {
            return Err(ArchiveError::Corrupt(format!("{} bytes is shorter than the lead-in", file_size)));
        }

        let mut tag = [0u8; 4];
        self.file.read_exact(&mut tag)?;
        if &tag != ContainerHeader::TAG {
            return Err(ArchiveError::InvalidTag {
                expected: String::from_utf8_lossy(ContainerHeader::TAG).to_string(),
                found: String::from_utf8_lossy(&tag).to_string(),
            });
        }
        let version = self.file.read_u32::<LittleEndian>()?;
        if version != ContainerHeader::VERSION {
            return Err(ArchiveError::UnsupportedVersion(version));
        }
        let _flags = self.file.read_u32::<LittleEndian>()?;
        let body_len = self.file.read_u64::<LittleEndian>()?;
        let _record_count = self.file.read_u64::<LittleEndian>()?;

        let lead_in = ContainerHeader::LEAD_IN_SIZE as u64;
        let body_end = if body_len == ContainerHeader::INCOMPLETE_MARKER {
            file_size
        } else {
            self.finalized = true;
            lead_in.saturating_add(body_len).min(file_size)
        };

        let mut pos = lead_in;
        while body_end - pos >= RECORD_HEADER_SIZE {
            self.file.seek(SeekFrom::Start(pos))?;
            let kind = self.file.read_u8()?;
            let len = self.file.read_u64::<LittleEndian>()?;
            let body_start = pos + RECORD_HEADER_SIZE;

            // Torn tail of an unfinalized container
            if len > body_end - body_start {
                if self.finalized {
                    return Err(ArchiveError::Corrupt(format!("record at {} overruns the body", pos)));
                }
                tracing::debug!(offset = pos, "stopping at incomplete record");
                break;
            }

            let kind = RecordKind::from_u8(kind)
                .ok_or_else(|| ArchiveError::Corrupt(format!("record kind {} at {}", kind, pos)))?;
            self.parse_record(kind, body_start, len)?;
            self.record_count += 1;
            pos = body_start + len;
        }
        Ok(())
    }

    fn parse_record(&mut self, kind: RecordKind, body_start: u64, len: u64) -> Result<()> {
        if kind == RecordKind::Data {
            const DATA_HEADER: u64 = 4 + 8 + 8 + 1 + 4;
            if len < DATA_HEADER {
                return Err(ArchiveError::Corrupt(format!("short DATA record at {}", body_start)));
            }
            let id = self.file.read_u32::<LittleEndian>()?;
            let extent = DataExtent {
                first_row: self.file.read_u64::<LittleEndian>()?,
                row_count: self.file.read_u64::<LittleEndian>()?,
                mask: self.file.read_u8()?,
                crc: self.file.read_u32::<LittleEndian>()?,
                offset: body_start + DATA_HEADER,
                len: len - DATA_HEADER,
            };
            let entry = self.entry_by_id(id)?;
            if extent.first_row.saturating_add(extent.row_count) > entry.spec.max_dims[0] {
                return Err(ArchiveError::Corrupt(format!("DATA rows past the end of {}", entry.spec.name)));
            }
            entry.extents.push(extent);
            return Ok(());
        }

        let mut body = vec![0u8; len as usize];
        self.file.read_exact(&mut body)?;
        let mut body = Cursor::new(body);
        let id = body.read_u32::<LittleEndian>()?;

        match kind {
            RecordKind::Dataset => {
                if id as usize != self.datasets.len() {
                    return Err(ArchiveError::Corrupt(format!("dataset id {} out of sequence", id)));
                }
                let spec = DatasetSpec::read_from(&mut body)?;
                self.by_name.insert(spec.name.clone(), self.datasets.len());
                self.datasets.push(DatasetEntry { spec, attributes: Vec::new(), extents: Vec::new() });
            }
            RecordKind::Attribute => {
                let name = read_string(&mut body)?;
                let value = AttributeValue::read_from(&mut body)?;
                self.entry_by_id(id)?.attributes.push((name, value));
            }
            RecordKind::Extent => {
                let rows = body.read_u64::<LittleEndian>()?;
                let entry = self.entry_by_id(id)?;
                if rows > entry.spec.max_dims[0] {
                    return Err(ArchiveError::Corrupt(format!("extent {} past maximum of {}", rows, entry.spec.name)));
                }
                entry.spec.dims[0] = rows;
            }
            RecordKind::Data => return Err(ArchiveError::Corrupt("nested DATA record".into())),
        }
        Ok(())
    }

    fn entry_by_id(&mut self, id: u32) -> Result<&mut DatasetEntry> {
        self.datasets
            .get_mut(id as usize)
            .ok_or_else(|| ArchiveError::Corrupt(format!("unknown dataset id {}", id)))
    }
}
