//! Delta codec for coordinates and dimensions.
//!
//! Each value is encoded against the cached previous value of its
//! dimension with a 2-bit case selector:
//!
//! | selector | meaning                 | data bits                     |
//! |----------|-------------------------|-------------------------------|
//! | `00`     | no change               | none                          |
//! | `01`     | small positive delta    | `lcf`                         |
//! | `10`     | small negative delta    | `lcf`                         |
//! | `11`     | absolute value          | `[sign] + lci + lcf`          |
//!
//! A small delta has magnitude `1..=unit` and is sent modulo `unit`; a
//! zero field therefore stands for exactly one unit.

use serde::{Deserialize, Serialize};

use crate::encoding::bits::{BitReader, BitWriter};
use crate::error::VgsError;

const SEL_SAME: u32 = 0b00;
const SEL_UP: u32 = 0b01;
const SEL_DOWN: u32 = 0b10;
const SEL_ABSOLUTE: u32 = 0b11;

/// Width of the case selector.
pub const SELECTOR_BITS: u32 = 2;

// ── Precision ────────────────────────────────────────────────────

/// Integer-bits / fraction-bits pair shared by every coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precision {
    pub lci: u32,
    pub lcf: u32,
}

impl Default for Precision {
    fn default() -> Self {
        Self { lci: 6, lcf: 10 }
    }
}

impl Precision {
    pub fn new(lci: u32, lcf: u32) -> Result<Self, VgsError> {
        let p = Self { lci, lcf };
        p.validate()?;
        Ok(p)
    }

    pub fn validate(&self) -> Result<(), VgsError> {
        if self.lci + self.lcf == 0 || self.lci + self.lcf > 30 {
            return Err(VgsError::field(
                "precision",
                format!("lci + lcf must be in 1..=30, got {}", self.lci + self.lcf),
            ));
        }
        Ok(())
    }

    /// One unit of fractional resolution, `1 << lcf`.
    pub fn unit(&self) -> i64 {
        1i64 << self.lcf
    }

    pub fn scale(&self) -> f64 {
        self.unit() as f64
    }

    pub fn mask(&self) -> i64 {
        (1i64 << (self.lci + self.lcf)) - 1
    }

    /// Data bits of the absolute case, excluding the selector.
    pub fn absolute_bits(&self, kind: CoordKind) -> u32 {
        self.lci + self.lcf + u32::from(kind.is_signed())
    }

    pub fn quantize(&self, v: f64, kind: CoordKind) -> i64 {
        let q = (v * self.scale()).round() as i64;
        match kind {
            CoordKind::Position => {
                let magnitude = q.unsigned_abs() as i64 & self.mask();
                if q < 0 { -magnitude } else { magnitude }
            }
            CoordKind::Extent => q.max(0) & self.mask(),
        }
    }

    pub fn to_user(&self, q: i64) -> f64 {
        q as f64 / self.scale()
    }
}

// ── CoordKind / Dim ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordKind {
    /// x / y positions; may be negative.
    Position,
    /// Width, height, radius; never negative.
    Extent,
}

impl CoordKind {
    pub fn is_signed(self) -> bool {
        matches!(self, CoordKind::Position)
    }
}

/// Cached previous value of one dimension, as both ends of the wire see it.
///
/// `None` means the dimension was reset and the next value must be sent
/// absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dim(Option<i64>);

impl Dim {
    pub fn reset(&mut self) {
        self.0 = None;
    }

    pub fn value(&self) -> Option<i64> {
        self.0
    }

    pub fn is_reset(&self) -> bool {
        self.0.is_none()
    }
}

// ── Encode / decode ──────────────────────────────────────────────

/// Encode `v` against `dim`, updating the cache. Returns bits written.
pub fn encode(
    w: &mut BitWriter,
    precision: Precision,
    kind: CoordKind,
    dim: &mut Dim,
    v: f64,
) -> u32 {
    let q = precision.quantize(v, kind);
    let unit = precision.unit();
    let bits = match dim.0 {
        Some(prev) if prev == q => {
            w.put(SEL_SAME, SELECTOR_BITS);
            SELECTOR_BITS
        }
        Some(prev) if (q - prev).abs() <= unit => {
            let delta = q - prev;
            let sel = if delta > 0 { SEL_UP } else { SEL_DOWN };
            w.put(sel, SELECTOR_BITS);
            w.put((delta.unsigned_abs() as i64 & (unit - 1)) as u32, precision.lcf);
            SELECTOR_BITS + precision.lcf
        }
        _ => {
            w.put(SEL_ABSOLUTE, SELECTOR_BITS);
            if kind.is_signed() {
                w.put_bool(q < 0);
            }
            w.put(q.unsigned_abs() as u32, precision.lci + precision.lcf);
            SELECTOR_BITS + precision.absolute_bits(kind)
        }
    };
    dim.0 = Some(q);
    bits
}

/// Decode one value written by [`encode`], updating the cache.
pub fn decode(
    r: &mut BitReader<'_>,
    precision: Precision,
    kind: CoordKind,
    dim: &mut Dim,
) -> Result<i64, VgsError> {
    let q = match r.get(SELECTOR_BITS)? {
        SEL_SAME => dim
            .0
            .ok_or(VgsError::ProtocolViolation("no-change against a reset dimension"))?,
        sel @ (SEL_UP | SEL_DOWN) => {
            let prev = dim
                .0
                .ok_or(VgsError::ProtocolViolation("delta against a reset dimension"))?;
            let field = i64::from(r.get(precision.lcf)?);
            let magnitude = if field == 0 { precision.unit() } else { field };
            if sel == SEL_UP { prev + magnitude } else { prev - magnitude }
        }
        _ => {
            let negative = kind.is_signed() && r.get_bool()?;
            let magnitude = i64::from(r.get(precision.lci + precision.lcf)?);
            if negative { -magnitude } else { magnitude }
        }
    };
    dim.0 = Some(q);
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: Precision = Precision { lci: 6, lcf: 10 };

    fn roundtrip(prev: f64, next: f64, kind: CoordKind) -> (u32, i64, Dim) {
        let mut enc = Dim::default();
        let mut dec = Dim::default();
        let mut w = BitWriter::new();
        encode(&mut w, P, kind, &mut enc, prev);
        let first_bits = w.bit_len();
        let bits = encode(&mut w, P, kind, &mut enc, next);
        assert_eq!(w.bit_len(), first_bits + bits as usize);
        let bytes = w.take();
        let mut r = BitReader::new(&bytes);
        decode(&mut r, P, kind, &mut dec).unwrap();
        let got = decode(&mut r, P, kind, &mut dec).unwrap();
        assert_eq!(enc, dec);
        (bits, got, dec)
    }

    #[test]
    fn small_deltas_decode_exactly() {
        let unit = P.unit() as f64 / P.scale();
        for step in [-1.0, -0.5, -1.0 / 1024.0, 1.0 / 1024.0, 0.25, 0.999, 1.0] {
            let prev = 3.5;
            let next = prev + step * unit;
            let (bits, got, _) = roundtrip(prev, next, CoordKind::Position);
            assert_eq!(bits, SELECTOR_BITS + P.lcf, "step {step}");
            assert_eq!(got, P.quantize(next, CoordKind::Position));
        }
    }

    #[test]
    fn large_deltas_fall_back_to_absolute() {
        for (prev, next) in [(0.0, 1.5), (10.0, -10.0), (-3.0, 2.0), (0.0, 63.0)] {
            let (bits, got, dec) = roundtrip(prev, next, CoordKind::Position);
            assert_eq!(bits, SELECTOR_BITS + P.absolute_bits(CoordKind::Position));
            assert_eq!(got, P.quantize(next, CoordKind::Position));
            assert_eq!(dec.value(), Some(P.quantize(next, CoordKind::Position)));
        }
    }

    #[test]
    fn repeated_value_is_no_change() {
        let (bits, got, _) = roundtrip(12.25, 12.25, CoordKind::Extent);
        assert_eq!(bits, SELECTOR_BITS);
        assert_eq!(got, P.quantize(12.25, CoordKind::Extent));
    }

    #[test]
    fn reset_dimension_forces_absolute() {
        let mut dim = Dim::default();
        let mut w = BitWriter::new();
        encode(&mut w, P, CoordKind::Position, &mut dim, 1.0);
        dim.reset();
        let bits = encode(&mut w, P, CoordKind::Position, &mut dim, 1.0);
        assert_eq!(bits, SELECTOR_BITS + 17);
    }

    #[test]
    fn extents_have_no_sign_bit() {
        assert_eq!(P.absolute_bits(CoordKind::Extent), 16);
        assert_eq!(P.absolute_bits(CoordKind::Position), 17);
        assert_eq!(P.quantize(-2.0, CoordKind::Extent), 0);
    }

    #[test]
    fn quantize_masks_to_declared_width() {
        // 64.0 needs a seventh integer bit and wraps to zero.
        assert_eq!(P.quantize(64.0, CoordKind::Extent), 0);
        assert_eq!(P.quantize(-1.5, CoordKind::Position), -1536);
    }

    #[test]
    fn precision_validation() {
        assert!(Precision::new(6, 10).is_ok());
        assert!(Precision::new(20, 20).is_err());
        assert!(Precision::new(0, 0).is_err());
    }
}
