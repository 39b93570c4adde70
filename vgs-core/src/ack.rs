//! The relay's reply unit ("AckButton").
//!
//! ```text
//! code:      i32 BE   (StatusCode)
//! -- feedback record, present on handshake/frame-complete/close replies --
//! mode:      u8       (PlaybackMode)
//! interrupt: u8       (Interrupt)
//! advance:   u16 BE   frames to step forward
//! window:    i32 BE   originating window id
//! frame:     i32 BE   originating frame id
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{StatusCode, VgsError};

/// Size of a bare ack.
pub const ACK_CODE_SIZE: usize = 4;

/// Size of the feedback record that may follow the code.
pub const FEEDBACK_SIZE: usize = 12;

// ── PlaybackMode ─────────────────────────────────────────────────

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlaybackMode {
    /// Frames stream without user interaction.
    #[default]
    Continuous = 0,
    /// The viewer advances `advance` frames per request.
    Step = 1,
    /// The viewer is holding the current frame.
    Paused = 2,
}

impl TryFrom<u8> for PlaybackMode {
    type Error = VgsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PlaybackMode::Continuous),
            1 => Ok(PlaybackMode::Step),
            2 => Ok(PlaybackMode::Paused),
            _ => Err(VgsError::UnknownVariant {
                type_name: "PlaybackMode",
                value: value as u64,
            }),
        }
    }
}

// ── Interrupt ────────────────────────────────────────────────────

/// User signal relayed back to the senders. Ordered by severity.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Interrupt {
    #[default]
    None = 0,
    /// Pause the simulation at the next cycle boundary.
    Interrupt = 1,
    /// Stop the run.
    Quit = 2,
}

impl TryFrom<u8> for Interrupt {
    type Error = VgsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Interrupt::None),
            1 => Ok(Interrupt::Interrupt),
            2 => Ok(Interrupt::Quit),
            _ => Err(VgsError::UnknownVariant {
                type_name: "Interrupt",
                value: value as u64,
            }),
        }
    }
}

// ── Feedback ─────────────────────────────────────────────────────

/// Interactive state reported by the rendering peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Feedback {
    pub mode: PlaybackMode,
    pub interrupt: Interrupt,
    pub advance: u16,
    pub window: i32,
    pub frame: i32,
}

impl Feedback {
    /// What the relay reports when no rendering peer is available.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn is_quit(&self) -> bool {
        self.interrupt == Interrupt::Quit
    }

    /// Keep the most severe interrupt seen across two reports.
    pub fn merge(mut self, earlier: &Feedback) -> Self {
        self.interrupt = self.interrupt.max(earlier.interrupt);
        self
    }

    pub fn encode(&self) -> [u8; FEEDBACK_SIZE] {
        let mut buf = [0u8; FEEDBACK_SIZE];
        buf[0] = self.mode as u8;
        buf[1] = self.interrupt as u8;
        buf[2..4].copy_from_slice(&self.advance.to_be_bytes());
        buf[4..8].copy_from_slice(&self.window.to_be_bytes());
        buf[8..12].copy_from_slice(&self.frame.to_be_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, VgsError> {
        if data.len() < FEEDBACK_SIZE {
            return Err(VgsError::InvalidLength {
                expected: FEEDBACK_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            mode: PlaybackMode::try_from(data[0])?,
            interrupt: Interrupt::try_from(data[1])?,
            advance: u16::from_be_bytes([data[2], data[3]]),
            window: i32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            frame: i32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        })
    }
}

// ── AckButton ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckButton {
    pub code: StatusCode,
    pub feedback: Option<Feedback>,
}

impl AckButton {
    pub fn status(code: StatusCode) -> Self {
        Self {
            code,
            feedback: None,
        }
    }

    pub fn with_feedback(code: StatusCode, feedback: Feedback) -> Self {
        Self {
            code,
            feedback: Some(feedback),
        }
    }

    /// `Err` when the relay reported a nonzero code.
    pub fn check(self) -> Result<Self, VgsError> {
        if self.code.is_ok() {
            Ok(self)
        } else {
            Err(VgsError::RelayReported(self.code))
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ACK_CODE_SIZE + FEEDBACK_SIZE);
        buf.put_i32(self.code as i32);
        if let Some(feedback) = &self.feedback {
            buf.put_slice(&feedback.encode());
        }
        buf.freeze()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, VgsError> {
        if data.len() != ACK_CODE_SIZE && data.len() != ACK_CODE_SIZE + FEEDBACK_SIZE {
            return Err(VgsError::InvalidLength {
                expected: ACK_CODE_SIZE,
                actual: data.len(),
            });
        }
        let code = StatusCode::try_from(i32::from_be_bytes([data[0], data[1], data[2], data[3]]))?;
        let feedback = if data.len() > ACK_CODE_SIZE {
            Some(Feedback::decode(&data[ACK_CODE_SIZE..])?)
        } else {
            None
        };
        Ok(Self { code, feedback })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ack_is_four_bytes_big_endian() {
        let ack = AckButton::status(StatusCode::Oversized);
        assert_eq!(&ack.to_bytes()[..], &5i32.to_be_bytes());
    }

    #[test]
    fn feedback_roundtrip() {
        let fb = Feedback {
            mode: PlaybackMode::Step,
            interrupt: Interrupt::Quit,
            advance: 3,
            window: 7,
            frame: -1,
        };
        let ack = AckButton::with_feedback(StatusCode::Ok, fb);
        let bytes = ack.to_bytes();
        assert_eq!(bytes.len(), ACK_CODE_SIZE + FEEDBACK_SIZE);
        let back = AckButton::from_bytes(&bytes).unwrap();
        assert_eq!(back.feedback, Some(fb));
        assert!(back.feedback.unwrap().is_quit());
    }

    #[test]
    fn odd_lengths_are_rejected() {
        assert!(AckButton::from_bytes(&[0, 0, 0]).is_err());
        assert!(AckButton::from_bytes(&[0; 9]).is_err());
    }

    #[test]
    fn check_turns_nonzero_code_into_error() {
        assert!(AckButton::status(StatusCode::Ok).check().is_ok());
        let err = AckButton::status(StatusCode::PeerIo).check().unwrap_err();
        assert!(matches!(err, VgsError::RelayReported(StatusCode::PeerIo)));
    }

    #[test]
    fn merge_keeps_most_severe_interrupt() {
        let early = Feedback {
            interrupt: Interrupt::Quit,
            ..Feedback::neutral()
        };
        let late = Feedback {
            frame: 4,
            ..Feedback::neutral()
        };
        let merged = late.merge(&early);
        assert_eq!(merged.interrupt, Interrupt::Quit);
        assert_eq!(merged.frame, 4);
    }
}
