//! Generic signed-integer codec.
//!
//! Four size classes, each tagged by its top two bits:
//!
//! ```text
//! tag(2) | sign(1) | magnitude(width - 3)
//! 00       8-bit   magnitude <= 31
//! 01      16-bit   magnitude <= 8191
//! 10      24-bit   magnitude <= 2097151
//! 11      32-bit   magnitude <= 536870911 (larger values saturate)
//! ```

use crate::encoding::bits::{BitReader, BitWriter};
use crate::error::VgsError;

const WIDTHS: [u32; 4] = [8, 16, 24, 32];
const TAG_BITS: u32 = 2;

/// Largest magnitude the widest class can carry.
pub const MAX_MAGNITUDE: u32 = (1 << 29) - 1;

fn max_magnitude(width: u32) -> u32 {
    (1 << (width - 3)) - 1
}

/// Bits [`encode`] will emit for `value`.
pub fn encoded_bits(value: i64) -> u32 {
    let magnitude = value.unsigned_abs().min(u64::from(MAX_MAGNITUDE)) as u32;
    WIDTHS
        .iter()
        .copied()
        .find(|&w| magnitude <= max_magnitude(w))
        .unwrap_or(32)
}

/// Encode `value`, saturating at ±[`MAX_MAGNITUDE`]. Returns bits written.
pub fn encode(w: &mut BitWriter, value: i64) -> u32 {
    let width = encoded_bits(value);
    let tag = (width / 8) - 1;
    let magnitude = value.unsigned_abs().min(u64::from(MAX_MAGNITUDE)) as u32;
    w.put(tag, TAG_BITS);
    w.put_bool(value < 0);
    w.put(magnitude, width - TAG_BITS - 1);
    width
}

pub fn decode(r: &mut BitReader<'_>) -> Result<i64, VgsError> {
    let tag = r.get(TAG_BITS)?;
    let width = WIDTHS[tag as usize];
    let negative = r.get_bool()?;
    let magnitude = i64::from(r.get(width - TAG_BITS - 1)?);
    Ok(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: i64) -> (u32, i64) {
        let mut w = BitWriter::new();
        let bits = encode(&mut w, value);
        assert_eq!(w.bit_len(), bits as usize);
        let bytes = w.take();
        let mut r = BitReader::new(&bytes);
        (bits, decode(&mut r).unwrap())
    }

    #[test]
    fn size_class_boundaries() {
        assert_eq!(roundtrip(0), (8, 0));
        assert_eq!(roundtrip(31), (8, 31));
        assert_eq!(roundtrip(-31), (8, -31));
        assert_eq!(roundtrip(32), (16, 32));
        assert_eq!(roundtrip(8191), (16, 8191));
        assert_eq!(roundtrip(8192), (24, 8192));
        assert_eq!(roundtrip(-2_097_151), (24, -2_097_151));
        assert_eq!(roundtrip(2_097_152), (32, 2_097_152));
    }

    #[test]
    fn oversized_values_saturate() {
        assert_eq!(roundtrip(i64::MAX), (32, i64::from(MAX_MAGNITUDE)));
        assert_eq!(roundtrip(-(1 << 40)), (32, -i64::from(MAX_MAGNITUDE)));
    }

    #[test]
    fn tag_occupies_top_two_bits() {
        let mut w = BitWriter::new();
        encode(&mut w, 100);
        let bytes = w.take();
        assert_eq!(bytes.len(), 2);
        assert_eq!(bytes[0] >> 6, 0b01);
    }
}
