//! Envelope kinds and drawing opcodes.
//!
//! Uses proper enums with `TryFrom` — no panics on unknown values.

use crate::error::VgsError;
use std::fmt;

// ── EnvelopeKind ─────────────────────────────────────────────────

/// What an envelope body contains.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// Sender → relay: rank and group size, first message on a connection.
    Hello = 0x01,
    /// Sender → relay: startup handshake (or the abort marker).
    Startup = 0x02,
    /// Sender → relay: CountWord followed by payload.
    Buffer = 0x03,
    /// Relay → sender: bare status code.
    Ack = 0x04,
    /// Relay → sender: status code followed by a feedback record.
    AckFeedback = 0x05,
}

impl TryFrom<u8> for EnvelopeKind {
    type Error = VgsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(EnvelopeKind::Hello),
            0x02 => Ok(EnvelopeKind::Startup),
            0x03 => Ok(EnvelopeKind::Buffer),
            0x04 => Ok(EnvelopeKind::Ack),
            0x05 => Ok(EnvelopeKind::AckFeedback),
            _ => Err(VgsError::UnknownVariant {
                type_name: "EnvelopeKind",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Opcode ───────────────────────────────────────────────────────

/// Width of every drawing opcode in the bit stream.
pub const OPCODE_BITS: u32 = 5;

/// Drawing record selectors.
///
/// `Nop` is all-zero so that zero padding up to a byte boundary decodes as
/// a run of skip records.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop = 0,
    OpenWindow = 1,
    CloseWindow = 2,
    /// Window id and pen selectors restated at the start of a buffer.
    RestorePen = 3,
    MoveTo = 4,
    LineTo = 5,
    Circle = 6,
    Rect = 7,
    SetColor = 8,
    SetPen = 9,
    SetFont = 10,
    Text = 11,
    SetMode = 12,
}

impl TryFrom<u32> for Opcode {
    type Error = VgsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Nop),
            1 => Ok(Opcode::OpenWindow),
            2 => Ok(Opcode::CloseWindow),
            3 => Ok(Opcode::RestorePen),
            4 => Ok(Opcode::MoveTo),
            5 => Ok(Opcode::LineTo),
            6 => Ok(Opcode::Circle),
            7 => Ok(Opcode::Rect),
            8 => Ok(Opcode::SetColor),
            9 => Ok(Opcode::SetPen),
            10 => Ok(Opcode::SetFont),
            11 => Ok(Opcode::Text),
            12 => Ok(Opcode::SetMode),
            _ => Err(VgsError::UnknownVariant {
                type_name: "Opcode",
                value: value as u64,
            }),
        }
    }
}
