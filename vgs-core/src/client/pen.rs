//! Cached pen state of one window.
//!
//! The sender and every decoder keep an identical copy; all coordinate
//! dimensions are reset whenever a buffer starts without continuing an
//! atomic sequence, because buffers from different senders may be
//! interleaved between the two.

use crate::encoding::bits::{BitReader, BitWriter};
use crate::encoding::coord::Dim;
use crate::encoding::int;
use crate::error::VgsError;
use crate::message::{OPCODE_BITS, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PenState {
    pub window: u32,
    pub x: Dim,
    pub y: Dim,
    pub width: Dim,
    pub height: Dim,
    pub radius: Dim,
    pub color: u32,
    pub pen: u32,
    pub font: u32,
    pub mode: u32,
}

impl PenState {
    pub fn for_window(window: u32) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    /// Forget every cached coordinate so the next ones go out absolute.
    pub fn reset_dims(&mut self) {
        self.x.reset();
        self.y.reset();
        self.width.reset();
        self.height.reset();
        self.radius.reset();
    }

    /// Emit a `RestorePen` record and reset the coordinate cache.
    pub fn encode_restore(&mut self, w: &mut BitWriter) -> u32 {
        let start = w.bit_len();
        w.put(Opcode::RestorePen as u32, OPCODE_BITS);
        for value in [self.window, self.color, self.pen, self.font, self.mode] {
            int::encode(w, i64::from(value));
        }
        self.reset_dims();
        (w.bit_len() - start) as u32
    }

    /// Read the body of a `RestorePen` record (opcode already consumed).
    pub fn decode_restore(&mut self, r: &mut BitReader<'_>) -> Result<(), VgsError> {
        self.window = selector(int::decode(r)?)?;
        self.color = selector(int::decode(r)?)?;
        self.pen = selector(int::decode(r)?)?;
        self.font = selector(int::decode(r)?)?;
        self.mode = selector(int::decode(r)?)?;
        self.reset_dims();
        Ok(())
    }
}

pub(crate) fn selector(value: i64) -> Result<u32, VgsError> {
    u32::try_from(value).map_err(|_| VgsError::field("selector", format!("{value} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::coord::{self, CoordKind, Precision};

    #[test]
    fn restore_roundtrip_resets_dims() {
        let p = Precision::default();
        let mut pen = PenState::for_window(3);
        pen.color = 12;
        pen.font = 2;
        let mut w = BitWriter::new();
        coord::encode(&mut w, p, CoordKind::Position, &mut pen.x, 1.0);
        assert!(!pen.x.is_reset());

        let mut out = BitWriter::new();
        pen.encode_restore(&mut out);
        assert!(pen.x.is_reset());

        let bytes = out.take();
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.get(OPCODE_BITS).unwrap(), Opcode::RestorePen as u32);
        let mut decoded = PenState::default();
        decoded.decode_restore(&mut r).unwrap();
        assert_eq!(decoded, pen);
    }
}
