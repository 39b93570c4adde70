//! Domain-specific error types for the vector-graphics stream.
//!
//! All fallible operations return `Result<T, VgsError>`.
//! Relay-side status codes travel on the wire as [`StatusCode`].

use std::fmt;

use thiserror::Error;

/// The canonical error type for senders and the shared protocol layer.
#[derive(Debug, Error)]
pub enum VgsError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A field in a fixed-layout record could not be parsed.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A message violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The relay answered with a nonzero status code.
    #[error("relay reported {0}")]
    RelayReported(StatusCode),

    // ── Buffer / Encoding Errors ─────────────────────────────────
    /// A single command does not fit an empty buffer.
    #[error("buffer too small: command needs {needed_bits} bits, empty buffer holds {capacity_bits}")]
    BufferTooSmall {
        needed_bits: usize,
        capacity_bits: usize,
    },

    /// The bit reader ran past the end of its input.
    #[error("bit stream exhausted: wanted {wanted} bits, {remaining} left")]
    BitsExhausted { wanted: u32, remaining: usize },

    /// A declared length disagrees with the bytes actually present.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// An envelope body exceeded the codec limit.
    #[error("envelope too large: {size} bytes (max {max})")]
    EnvelopeTooLarge { size: usize, max: usize },

    /// An operation referenced a window that is not open.
    #[error("window {0} is not open")]
    UnknownWindow(u32),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl VgsError {
    pub(crate) fn field(field: &'static str, reason: impl Into<String>) -> Self {
        VgsError::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// The wire status code a relay would report for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            VgsError::RelayReported(code) => *code,
            VgsError::InvalidField { .. } | VgsError::UnknownVariant { .. } => {
                StatusCode::BadHandshake
            }
            VgsError::InvalidLength { .. } | VgsError::EnvelopeTooLarge { .. } => {
                StatusCode::Oversized
            }
            _ => StatusCode::UnexpectedMessage,
        }
    }
}

// ── StatusCode ────────────────────────────────────────────────────

/// Error/status code carried in the first four bytes of every ack.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusCode {
    #[default]
    Ok = 0,
    /// Startup handshake could not be parsed.
    BadHandshake = 1,
    /// The output file could not be created.
    FileOpen = 2,
    /// The rendering peer could not be reached.
    PeerConnect = 3,
    /// The rendering peer answered its handshake with a failure byte.
    PeerRejected = 4,
    /// A buffer exceeded the negotiated capacity or was malformed.
    Oversized = 5,
    /// More frame-complete reports than senders in one frame.
    CompletionOverflow = 6,
    /// Writing the file sink failed.
    FileWrite = 7,
    /// Non-recoverable I/O failure on the rendering-peer socket.
    PeerIo = 8,
    /// The rendering peer sent an in-band error message.
    PeerReported = 9,
    /// A message arrived that is not valid in the current phase.
    UnexpectedMessage = 10,
    /// The session group size does not match the relay's sender count.
    GroupMismatch = 11,
}

impl StatusCode {
    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl TryFrom<i32> for StatusCode {
    type Error = VgsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::BadHandshake),
            2 => Ok(StatusCode::FileOpen),
            3 => Ok(StatusCode::PeerConnect),
            4 => Ok(StatusCode::PeerRejected),
            5 => Ok(StatusCode::Oversized),
            6 => Ok(StatusCode::CompletionOverflow),
            7 => Ok(StatusCode::FileWrite),
            8 => Ok(StatusCode::PeerIo),
            9 => Ok(StatusCode::PeerReported),
            10 => Ok(StatusCode::UnexpectedMessage),
            11 => Ok(StatusCode::GroupMismatch),
            _ => Err(VgsError::UnknownVariant {
                type_name: "StatusCode",
                value: value as u32 as u64,
            }),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as i32)
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for VgsError {
    fn from(s: String) -> Self {
        VgsError::Other(s)
    }
}

impl From<&str> for VgsError {
    fn from(s: &str) -> Self {
        VgsError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for VgsError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        VgsError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = VgsError::BufferTooSmall {
            needed_bits: 9000,
            capacity_bits: 800,
        };
        assert!(e.to_string().contains("9000"));
        assert!(e.to_string().contains("800"));

        let e = VgsError::RelayReported(StatusCode::Oversized);
        assert!(e.to_string().contains("Oversized"));
    }

    #[test]
    fn status_code_roundtrip() {
        for code in 0..=11 {
            let status = StatusCode::try_from(code).unwrap();
            assert_eq!(status as i32, code);
        }
        assert!(StatusCode::try_from(99).is_err());
        assert!(StatusCode::try_from(-1).is_err());
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: VgsError = io_err.into();
        assert!(matches!(e, VgsError::Connection(_)));
    }

    #[test]
    fn error_maps_to_status() {
        let e = VgsError::InvalidLength {
            expected: 10,
            actual: 20,
        };
        assert_eq!(e.status(), StatusCode::Oversized);
        assert_eq!(
            VgsError::field("buffer-len", "not a number").status(),
            StatusCode::BadHandshake
        );
    }
}
