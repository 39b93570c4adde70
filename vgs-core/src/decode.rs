//! Reference decoder for buffer payloads.
//!
//! Mirrors the sender's pen-state cache so tests and tools can check that
//! what went on the wire decodes to exactly what was drawn.

use crate::client::command::Command;
use crate::client::pen::PenState;
use crate::encoding::bits::BitReader;
use crate::encoding::coord::Precision;
use crate::error::VgsError;
use crate::frame::{FrameMarker, MARKER_LEN};
use crate::message::{OPCODE_BITS, Opcode};

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Restore(PenState),
    Draw(Command),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedBuffer {
    pub marker: Option<FrameMarker>,
    pub records: Vec<Record>,
}

impl DecodedBuffer {
    /// Drawing commands only, pen restores dropped.
    pub fn commands(self) -> impl Iterator<Item = Command> {
        self.records.into_iter().filter_map(|r| match r {
            Record::Draw(cmd) => Some(cmd),
            Record::Restore(_) => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StreamDecoder {
    precision: Precision,
    pen: PenState,
}

impl StreamDecoder {
    pub fn new(precision: Precision) -> Self {
        Self {
            precision,
            pen: PenState::default(),
        }
    }

    pub fn pen(&self) -> &PenState {
        &self.pen
    }

    /// Decode one payload. State carries over, so atomic continuation
    /// buffers must be fed in order.
    pub fn decode(&mut self, payload: &[u8]) -> Result<DecodedBuffer, VgsError> {
        let mut out = DecodedBuffer::default();
        let mut r = BitReader::new(payload);
        if let Some(marker) = FrameMarker::detect(payload) {
            out.marker = Some(marker);
            r.skip_bytes(MARKER_LEN)?;
        }

        while r.remaining() >= OPCODE_BITS as usize {
            match Opcode::try_from(r.get(OPCODE_BITS)?)? {
                Opcode::Nop => {}
                Opcode::RestorePen => {
                    self.pen.decode_restore(&mut r)?;
                    out.records.push(Record::Restore(self.pen));
                }
                op => {
                    let cmd = Command::decode(op, &mut self.pen, self.precision, &mut r)?;
                    out.records.push(Record::Draw(cmd));
                }
            }
        }
        Ok(out)
    }
}
