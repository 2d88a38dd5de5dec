// src/container/mod.rs
//! Self-describing record container holding typed, optionally filtered datasets.
//!
//! A container starts with a 28-byte lead-in followed by a flat sequence of
//! records. Every record is `kind: u8`, `len: u64` and `len` body bytes, so a
//! reader can skip what it does not need and stop cleanly at a torn tail.
//! All integers are little-endian.

pub mod reader;
pub mod writer;

pub use reader::{ContainerReader, ReadSeek};
pub use writer::ContainerWriter;

use crate::error::{ArchiveError, Result};
use crate::fill::FillPattern;
use crate::types::{read_string, write_string, ElementType};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use smallvec::SmallVec;
use std::io::{Read, Write};

/// Container lead-in constants
pub struct ContainerHeader;

impl ContainerHeader {
    pub const LEAD_IN_SIZE: usize = 28;
    pub const TAG: &'static [u8; 4] = b"RFCn";
    pub const VERSION: u32 = 1;
    /// `body_len` value of a container that was never finalized
    pub const INCOMPLETE_MARKER: u64 = 0xFFFFFFFFFFFFFFFF;
    /// Byte offset of `body_len` within the lead-in
    pub(crate) const BODY_LEN_OFFSET: u64 = 12;
}

/// kind + length prefix of every record
pub(crate) const RECORD_HEADER_SIZE: u64 = 9;

/// Dimension size meaning "may grow without bound"
pub const UNLIMITED: u64 = u64::MAX;

/// DATA record filter bits
pub(crate) const FILTER_DEFLATE: u8 = 0b01;
pub(crate) const FILTER_CRC32: u8 = 0b10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum RecordKind {
    Dataset = 1,
    Attribute = 2,
    Extent = 3,
    Data = 4,
}

impl RecordKind {
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordKind::Dataset),
            2 => Some(RecordKind::Attribute),
            3 => Some(RecordKind::Extent),
            4 => Some(RecordKind::Data),
            _ => None,
        }
    }
}

/// Handle to a dataset inside one open container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetId(pub(crate) u32);

/// Shape, type and storage options of one dataset.
///
/// Dimension 0 counts rows; a row is one element for rank 1, or `dims[1]`
/// elements for rank 2.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    pub name: String,
    pub element: ElementType,
    pub dims: SmallVec<[u64; 2]>,
    pub max_dims: SmallVec<[u64; 2]>,
    /// Rows per stored chunk, 0 for contiguous storage
    pub chunk_rows: u64,
    pub compression_level: u32,
    pub checksum: bool,
    pub fill: FillPattern,
}

impl DatasetSpec {
    /// A fixed-shape, contiguous dataset filled with the element's gap pattern
    pub fn new(name: impl Into<String>, element: ElementType, dims: &[u64]) -> Self {
        DatasetSpec {
            name: name.into(),
            element,
            dims: SmallVec::from_slice(dims),
            max_dims: SmallVec::from_slice(dims),
            chunk_rows: 0,
            compression_level: 0,
            checksum: false,
            fill: FillPattern::for_element(element),
        }
    }

    /// Let dimension 0 grow without bound
    #[must_use]
    pub fn extensible(mut self) -> Self {
        if let Some(rows) = self.max_dims.first_mut() {
            *rows = UNLIMITED;
        }
        self
    }

    #[must_use]
    pub fn chunked(mut self, rows: u64) -> Self {
        self.chunk_rows = rows;
        self
    }

    #[must_use]
    pub fn deflate(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    #[must_use]
    pub fn checksum(mut self, value: bool) -> Self {
        self.checksum = value;
        self
    }

    #[must_use]
    pub fn fill(mut self, fill: FillPattern) -> Self {
        self.fill = fill;
        self
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Current row count
    pub fn rows(&self) -> u64 {
        self.dims.first().copied().unwrap_or(0)
    }

    /// Elements per row
    pub fn columns(&self) -> u64 {
        self.dims.iter().skip(1).product()
    }

    pub fn row_size(&self) -> usize {
        self.element.size() * self.columns() as usize
    }

    pub fn is_extensible(&self) -> bool {
        self.max_dims.first() == Some(&UNLIMITED)
    }

    pub(crate) fn has_filters(&self) -> bool {
        self.compression_level > 0 || self.checksum
    }

    /// DATA record filter bits for this dataset
    pub(crate) fn filter_mask(&self) -> u8 {
        let mut mask = 0;
        if self.compression_level > 0 {
            mask |= FILTER_DEFLATE;
        }
        if self.checksum {
            mask |= FILTER_CRC32;
        }
        mask
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ArchiveError::Config("dataset name must not be empty".into()));
        }
        if !matches!(self.rank(), 1 | 2) || self.max_dims.len() != self.rank() {
            return Err(ArchiveError::Config(format!("dataset {} must have rank 1 or 2", self.name)));
        }
        if self.dims.iter().zip(&self.max_dims).any(|(d, m)| d > m) {
            return Err(ArchiveError::Config(format!("dataset {} exceeds its maximum shape", self.name)));
        }
        if self.rank() == 2 && (self.dims[1] == 0 || self.dims[1] != self.max_dims[1]) {
            return Err(ArchiveError::Config(format!("dataset {} has an invalid column count", self.name)));
        }
        if self.compression_level > 9 {
            return Err(ArchiveError::Config(format!(
                "dataset {} deflate level {} outside 0..=9",
                self.name, self.compression_level
            )));
        }
        if (self.has_filters() || self.is_extensible()) && self.chunk_rows == 0 {
            return Err(ArchiveError::Config(format!("dataset {} requires chunked storage", self.name)));
        }
        if self.fill.len() != self.element.size() {
            return Err(ArchiveError::Config(format!(
                "dataset {} fill is {} bytes, element is {}",
                self.name,
                self.fill.len(),
                self.element.size()
            )));
        }
        Ok(())
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write_string(writer, &self.name)?;
        self.element.write_to(writer)?;
        writer.write_u8(self.rank() as u8)?;
        for dim in &self.dims {
            writer.write_u64::<LittleEndian>(*dim)?;
        }
        for dim in &self.max_dims {
            writer.write_u64::<LittleEndian>(*dim)?;
        }
        writer.write_u64::<LittleEndian>(self.chunk_rows)?;
        writer.write_u8(self.compression_level as u8)?;
        writer.write_u8(self.checksum as u8)?;
        writer.write_u8(self.fill.len() as u8)?;
        writer.write_all(self.fill.bytes())
    }

    pub(crate) fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let name = read_string(reader)?;
        let element = ElementType::read_from(reader)?;
        let rank = reader.read_u8()? as usize;
        if !matches!(rank, 1 | 2) {
            return Err(ArchiveError::Corrupt(format!("dataset {} has rank {}", name, rank)));
        }

        let mut dims = SmallVec::new();
        for _ in 0..rank {
            dims.push(reader.read_u64::<LittleEndian>()?);
        }
        let mut max_dims = SmallVec::new();
        for _ in 0..rank {
            max_dims.push(reader.read_u64::<LittleEndian>()?);
        }

        let chunk_rows = reader.read_u64::<LittleEndian>()?;
        let compression_level = reader.read_u8()? as u32;
        let checksum = reader.read_u8()? != 0;
        let fill_len = reader.read_u8()? as usize;
        let mut fill = vec![0u8; fill_len];
        reader.read_exact(&mut fill)?;

        let spec = DatasetSpec {
            name,
            element,
            dims,
            max_dims,
            chunk_rows,
            compression_level,
            checksum,
            fill: FillPattern::from_bytes(&fill),
        };
        spec.validate().map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleType;
    use std::io::Cursor;

    #[test]
    fn test_lead_in_layout() {
        // tag + version + flags + body_len + record_count
        assert_eq!(ContainerHeader::LEAD_IN_SIZE, 4 + 4 + 4 + 8 + 8);
        assert_eq!(ContainerHeader::BODY_LEN_OFFSET, 12);
    }

    #[test]
    fn test_dataset_shape() {
        let element = ElementType::new(SampleType::i16(), true);
        let spec = DatasetSpec::new("rf_data", element, &[40, 3]);
        assert_eq!(spec.rows(), 40);
        assert_eq!(spec.columns(), 3);
        assert_eq!(spec.row_size(), 12);
        assert!(!spec.is_extensible());
        spec.validate().unwrap();

        let spec = DatasetSpec::new("rf_data", element, &[40]);
        assert_eq!(spec.columns(), 1);
        assert_eq!(spec.row_size(), 4);
    }

    #[test]
    fn test_filters_require_chunks() {
        let element = ElementType::new(SampleType::f32(), false);
        let spec = DatasetSpec::new("x", element, &[10]).deflate(4);
        assert!(spec.validate().is_err());
        assert!(spec.clone().chunked(5).validate().is_ok());
        assert_eq!(spec.chunked(5).checksum(true).filter_mask(), FILTER_DEFLATE | FILTER_CRC32);

        let spec = DatasetSpec::new("idx", ElementType::new(SampleType::u64(), false), &[0, 2]).extensible();
        assert!(spec.validate().is_err());
        assert!(spec.chunked(100).validate().is_ok());
    }

    #[test]
    fn test_spec_encoding() {
        let element = ElementType::new(SampleType::i32(), false);
        let spec = DatasetSpec::new("idx", element, &[1, 2]).extensible().chunked(100).checksum(true);
        let mut buf = Vec::new();
        spec.write_to(&mut buf).unwrap();
        let decoded = DatasetSpec::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, spec);
        assert!(decoded.is_extensible());
    }
}
