// src/types.rs
use crate::error::{ArchiveError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Byte order of stored sample values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ByteOrder {
    Little = 0,
    Big = 1,
}

impl ByteOrder {
    /// Byte order of the host this code runs on
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn is_native(&self) -> bool {
        *self == Self::native()
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ByteOrder::Little),
            1 => Some(ByteOrder::Big),
            _ => None,
        }
    }
}

/// Numeric category of a sample value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SampleKind {
    Int = 0,
    UInt = 1,
    Float = 2,
}

impl SampleKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SampleKind::Int),
            1 => Some(SampleKind::UInt),
            2 => Some(SampleKind::Float),
            _ => None,
        }
    }
}

/// Declared type of one scalar sample value: byte order, category and width.
///
/// Parses from the compact notation used by array libraries, for example
/// `"<i2"`, `">f8"`, `"u1"`, `"d"`. A missing or `=` order character means the
/// host's native order; `|` is accepted for single-byte types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleType {
    pub order: ByteOrder,
    pub kind: SampleKind,
    pub width: u8,
}

impl SampleType {
    pub const fn new(order: ByteOrder, kind: SampleKind, width: u8) -> Self {
        SampleType { order, kind, width }
    }

    pub const fn i8() -> Self {
        Self::new(ByteOrder::native(), SampleKind::Int, 1)
    }

    pub const fn i16() -> Self {
        Self::new(ByteOrder::native(), SampleKind::Int, 2)
    }

    pub const fn i32() -> Self {
        Self::new(ByteOrder::native(), SampleKind::Int, 4)
    }

    pub const fn i64() -> Self {
        Self::new(ByteOrder::native(), SampleKind::Int, 8)
    }

    pub const fn u8() -> Self {
        Self::new(ByteOrder::native(), SampleKind::UInt, 1)
    }

    pub const fn u16() -> Self {
        Self::new(ByteOrder::native(), SampleKind::UInt, 2)
    }

    pub const fn u32() -> Self {
        Self::new(ByteOrder::native(), SampleKind::UInt, 4)
    }

    pub const fn u64() -> Self {
        Self::new(ByteOrder::native(), SampleKind::UInt, 8)
    }

    pub const fn f32() -> Self {
        Self::new(ByteOrder::native(), SampleKind::Float, 4)
    }

    pub const fn f64() -> Self {
        Self::new(ByteOrder::native(), SampleKind::Float, 8)
    }

    /// Same category and width, stored in `order`
    pub const fn with_order(self, order: ByteOrder) -> Self {
        Self::new(order, self.kind, self.width)
    }

    /// Check that the width is one this crate can store for the category
    pub fn is_supported(&self) -> bool {
        match self.kind {
            SampleKind::Int | SampleKind::UInt => matches!(self.width, 1 | 2 | 4 | 8),
            SampleKind::Float => matches!(self.width, 4 | 8),
        }
    }

    pub fn size(&self) -> usize {
        self.width as usize
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(self.order as u8)?;
        writer.write_u8(self.kind as u8)?;
        writer.write_u8(self.width)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let order = reader.read_u8()?;
        let kind = reader.read_u8()?;
        let width = reader.read_u8()?;

        let order = ByteOrder::from_u8(order)
            .ok_or_else(|| ArchiveError::Corrupt(format!("byte order code {}", order)))?;
        let kind = SampleKind::from_u8(kind)
            .ok_or_else(|| ArchiveError::Corrupt(format!("sample kind code {}", kind)))?;
        let ty = SampleType::new(order, kind, width);
        if !ty.is_supported() {
            return Err(ArchiveError::Corrupt(format!("sample type {}", ty)));
        }
        Ok(ty)
    }
}

impl FromStr for SampleType {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || ArchiveError::UnknownSampleType(s.to_string());

        let (order, rest) = match s.chars().next() {
            Some('<') => (Some(ByteOrder::Little), &s[1..]),
            Some('>') => (Some(ByteOrder::Big), &s[1..]),
            Some('=') => (Some(ByteOrder::native()), &s[1..]),
            Some('|') => (None, &s[1..]),
            _ => (Some(ByteOrder::native()), s),
        };

        let (kind, width) = match rest {
            "f" => (SampleKind::Float, 4),
            "d" => (SampleKind::Float, 8),
            _ => {
                let mut chars = rest.chars();
                let kind = match chars.next() {
                    Some('i') => SampleKind::Int,
                    Some('u') => SampleKind::UInt,
                    Some('f') => SampleKind::Float,
                    _ => return Err(unknown()),
                };
                let width: u8 = chars.as_str().parse().map_err(|_| unknown())?;
                (kind, width)
            }
        };

        // `|` means "order not applicable", which only holds for single bytes
        let order = match order {
            Some(order) => order,
            None if width == 1 => ByteOrder::native(),
            None => return Err(unknown()),
        };

        let ty = SampleType::new(order, kind, width);
        if ty.is_supported() {
            Ok(ty)
        } else {
            Err(unknown())
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = match self.order {
            ByteOrder::Little => '<',
            ByteOrder::Big => '>',
        };
        let kind = match self.kind {
            SampleKind::Int => 'i',
            SampleKind::UInt => 'u',
            SampleKind::Float => 'f',
        };
        write!(f, "{}{}{}", order, kind, self.width)
    }
}

/// Element stored in one dataset cell: a plain sample or a (real, imaginary) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Scalar(SampleType),
    Complex(SampleType),
}

impl ElementType {
    pub fn new(sample_type: SampleType, is_complex: bool) -> Self {
        if is_complex {
            ElementType::Complex(sample_type)
        } else {
            ElementType::Scalar(sample_type)
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            ElementType::Scalar(t) | ElementType::Complex(t) => *t,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, ElementType::Complex(_))
    }

    pub fn size(&self) -> usize {
        match self {
            ElementType::Scalar(t) => t.size(),
            ElementType::Complex(t) => 2 * t.size(),
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(self.is_complex() as u8)?;
        self.sample_type().write_to(writer)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let complex = reader.read_u8()?;
        let sample_type = SampleType::read_from(reader)?;
        match complex {
            0 => Ok(ElementType::Scalar(sample_type)),
            1 => Ok(ElementType::Complex(sample_type)),
            other => Err(ArchiveError::Corrupt(format!("complex flag {}", other))),
        }
    }
}

/// Value of an attribute attached to a dataset
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    I32(i32),
    I64(i64),
    U64(u64),
    Double(f64),
    String(String),
}

impl AttributeValue {
    const TAG_I32: u8 = 1;
    const TAG_I64: u8 = 2;
    const TAG_U64: u8 = 3;
    const TAG_DOUBLE: u8 = 4;
    const TAG_STRING: u8 = 5;

    fn tag(&self) -> u8 {
        match self {
            AttributeValue::I32(_) => Self::TAG_I32,
            AttributeValue::I64(_) => Self::TAG_I64,
            AttributeValue::U64(_) => Self::TAG_U64,
            AttributeValue::Double(_) => Self::TAG_DOUBLE,
            AttributeValue::String(_) => Self::TAG_STRING,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::I32(v) => Some(*v as i64),
            AttributeValue::I64(v) => Some(*v),
            AttributeValue::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttributeValue::I32(v) => u64::try_from(*v).ok(),
            AttributeValue::I64(v) => u64::try_from(*v).ok(),
            AttributeValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(self.tag())?;
        match self {
            AttributeValue::I32(v) => writer.write_i32::<LittleEndian>(*v),
            AttributeValue::I64(v) => writer.write_i64::<LittleEndian>(*v),
            AttributeValue::U64(v) => writer.write_u64::<LittleEndian>(*v),
            AttributeValue::Double(v) => writer.write_f64::<LittleEndian>(*v),
            AttributeValue::String(s) => write_string(writer, s),
        }
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let tag = reader.read_u8()?;
        let value = match tag {
            Self::TAG_I32 => AttributeValue::I32(reader.read_i32::<LittleEndian>()?),
            Self::TAG_I64 => AttributeValue::I64(reader.read_i64::<LittleEndian>()?),
            Self::TAG_U64 => AttributeValue::U64(reader.read_u64::<LittleEndian>()?),
            Self::TAG_DOUBLE => AttributeValue::Double(reader.read_f64::<LittleEndian>()?),
            Self::TAG_STRING => AttributeValue::String(read_string(reader)?),
            other => return Err(ArchiveError::Corrupt(format!("attribute tag {}", other))),
        };
        Ok(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

pub(crate) fn write_string<W: Write>(writer: &mut W, s: &str) -> std::io::Result<()> {
    let bytes = s.as_bytes();
    writer.write_u32::<LittleEndian>(bytes.len() as u32)?;
    writer.write_all(bytes)
}

pub(crate) fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| ArchiveError::InvalidUtf8)
}
