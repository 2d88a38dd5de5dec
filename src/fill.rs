// src/fill.rs
//! Fill values for never-written sample slots.
//!
//! Integers fill with their most negative value (zero when unsigned) and
//! floats with a quiet NaN. The value is built once in host byte order and then
//! put into the declared order by [`to_order`], so a big-endian channel written
//! on a little-endian host still carries the right literal bytes.

use crate::types::{ByteOrder, ElementType, SampleKind, SampleType};
use smallvec::SmallVec;

/// Raw bytes of one dataset element used to mark gaps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillPattern {
    bytes: SmallVec<[u8; 16]>,
}

impl FillPattern {
    /// Build the fill pattern for `sample_type`, doubled into a
    /// (real, imaginary) pair when `is_complex`.
    pub fn new(sample_type: SampleType, is_complex: bool) -> Self {
        let scalar = to_order(canonical_fill(sample_type), sample_type.order);

        let mut bytes = SmallVec::new();
        bytes.extend_from_slice(&scalar);
        if is_complex {
            bytes.extend_from_slice(&scalar);
        }
        FillPattern { bytes }
    }

    pub fn for_element(element: ElementType) -> Self {
        Self::new(element.sample_type(), element.is_complex())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        FillPattern { bytes: SmallVec::from_slice(bytes) }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The pattern repeated `count` times
    pub fn repeat(&self, count: usize) -> Vec<u8> {
        self.bytes.repeat(count)
    }
}

/// Shorthand for [`FillPattern::new`]
pub fn fill_pattern(sample_type: SampleType, is_complex: bool) -> FillPattern {
    FillPattern::new(sample_type, is_complex)
}

/// Fill value for one scalar, in host byte order
fn canonical_fill(ty: SampleType) -> SmallVec<[u8; 8]> {
    let mut out = SmallVec::new();
    match (ty.kind, ty.width) {
        (SampleKind::UInt, width) => out.extend(std::iter::repeat(0u8).take(width as usize)),
        (SampleKind::Int, 1) => out.extend_from_slice(&i8::MIN.to_ne_bytes()),
        (SampleKind::Int, 2) => out.extend_from_slice(&i16::MIN.to_ne_bytes()),
        (SampleKind::Int, 4) => out.extend_from_slice(&i32::MIN.to_ne_bytes()),
        (SampleKind::Int, 8) => out.extend_from_slice(&i64::MIN.to_ne_bytes()),
        (SampleKind::Float, 4) => out.extend_from_slice(&f32::NAN.to_ne_bytes()),
        (SampleKind::Float, 8) => out.extend_from_slice(&f64::NAN.to_ne_bytes()),
        // SampleType construction rejects every other combination
        (_, width) => out.extend(std::iter::repeat(0u8).take(width as usize)),
    }
    out
}

/// Reorder host-order scalar bytes into `order`
fn to_order(mut native: SmallVec<[u8; 8]>, order: ByteOrder) -> SmallVec<[u8; 8]> {
    if !order.is_native() {
        native.reverse();
    }
    native
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le(kind: SampleKind, width: u8) -> SampleType {
        SampleType::new(ByteOrder::Little, kind, width)
    }

    fn be(kind: SampleKind, width: u8) -> SampleType {
        SampleType::new(ByteOrder::Big, kind, width)
    }

    #[test]
    fn test_signed_integers_fill_with_minimum() {
        assert_eq!(fill_pattern(le(SampleKind::Int, 1), false).bytes(), &[0x80]);
        assert_eq!(fill_pattern(le(SampleKind::Int, 2), false).bytes(), &[0x00, 0x80]);
        assert_eq!(fill_pattern(be(SampleKind::Int, 2), false).bytes(), &[0x80, 0x00]);
        assert_eq!(fill_pattern(le(SampleKind::Int, 4), false).bytes(), &[0, 0, 0, 0x80]);
        assert_eq!(fill_pattern(be(SampleKind::Int, 4), false).bytes(), &[0x80, 0, 0, 0]);
        assert_eq!(
            fill_pattern(be(SampleKind::Int, 8), false).bytes(),
            &[0x80, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_unsigned_integers_fill_with_zero() {
        for width in [1u8, 2, 4, 8] {
            for ty in [le(SampleKind::UInt, width), be(SampleKind::UInt, width)] {
                let fill = fill_pattern(ty, false);
                assert_eq!(fill.len(), width as usize);
                assert!(fill.bytes().iter().all(|b| *b == 0));
            }
        }
    }

    #[test]
    fn test_floats_fill_with_quiet_nan() {
        let fill = fill_pattern(le(SampleKind::Float, 4), false);
        let value = f32::from_le_bytes(fill.bytes().try_into().unwrap());
        assert!(value.is_nan());

        let fill = fill_pattern(be(SampleKind::Float, 8), false);
        let value = f64::from_be_bytes(fill.bytes().try_into().unwrap());
        assert!(value.is_nan());
        // Quiet bit set
        assert_eq!(fill.bytes()[1] & 0x08, 0x08);
    }

    #[test]
    fn test_complex_repeats_pattern_for_each_part() {
        let fill = fill_pattern(be(SampleKind::Int, 2), true);
        assert_eq!(fill.bytes(), &[0x80, 0x00, 0x80, 0x00]);

        let fill = fill_pattern(le(SampleKind::Float, 8), true);
        assert_eq!(fill.len(), 16);
        assert_eq!(&fill.bytes()[..8], &fill.bytes()[8..]);
    }

    #[test]
    fn test_repeat() {
        let fill = fill_pattern(le(SampleKind::Int, 2), false);
        assert_eq!(fill.repeat(3), vec![0x00, 0x80, 0x00, 0x80, 0x00, 0x80]);
        assert!(fill.repeat(0).is_empty());
    }
}
