//! Transport envelope: one message between a sender and the relay.
//!
//! ```text
//! kind:   u8          (EnvelopeKind)
//! length: u32 BE      (body bytes)
//! body:   [u8]
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::ack::AckButton;
use crate::error::VgsError;
use crate::header::{CountWord, HEADER_SIZE};
use crate::message::EnvelopeKind;

/// Size of the envelope prefix.
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Largest body the codec accepts (16 MiB).
pub const MAX_ENVELOPE_BODY: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    kind: EnvelopeKind,
    body: Bytes,
}

impl Envelope {
    pub fn new(kind: EnvelopeKind, body: Bytes) -> Result<Self, VgsError> {
        if body.len() > MAX_ENVELOPE_BODY {
            return Err(VgsError::EnvelopeTooLarge {
                size: body.len(),
                max: MAX_ENVELOPE_BODY,
            });
        }
        Ok(Self { kind, body })
    }

    pub fn hello(rank: u32, group_size: u32) -> Self {
        let mut body = BytesMut::with_capacity(8);
        body.put_u32(rank);
        body.put_u32(group_size);
        Self {
            kind: EnvelopeKind::Hello,
            body: body.freeze(),
        }
    }

    pub fn startup(body: Bytes) -> Result<Self, VgsError> {
        Self::new(EnvelopeKind::Startup, body)
    }

    pub fn buffer(header: CountWord, payload: &[u8]) -> Result<Self, VgsError> {
        let mut body = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        body.put_slice(&header.to_bytes());
        body.put_slice(payload);
        Self::new(EnvelopeKind::Buffer, body.freeze())
    }

    pub fn ack(ack: &AckButton) -> Self {
        let kind = if ack.feedback.is_some() {
            EnvelopeKind::AckFeedback
        } else {
            EnvelopeKind::Ack
        };
        Self {
            kind,
            body: ack.to_bytes(),
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    // ── Typed views ──────────────────────────────────────────────

    pub fn as_hello(&self) -> Result<(u32, u32), VgsError> {
        self.expect(EnvelopeKind::Hello)?;
        if self.body.len() != 8 {
            return Err(VgsError::InvalidLength {
                expected: 8,
                actual: self.body.len(),
            });
        }
        let rank = u32::from_be_bytes([self.body[0], self.body[1], self.body[2], self.body[3]]);
        let group = u32::from_be_bytes([self.body[4], self.body[5], self.body[6], self.body[7]]);
        Ok((rank, group))
    }

    /// Split a buffer envelope into its header and payload.
    ///
    /// The declared length must match the payload exactly.
    pub fn as_buffer(&self) -> Result<(CountWord, Bytes), VgsError> {
        self.expect(EnvelopeKind::Buffer)?;
        let header = CountWord::from_bytes(&self.body)?;
        let payload = self.body.slice(HEADER_SIZE..);
        if payload.len() != header.len() {
            return Err(VgsError::InvalidLength {
                expected: header.len(),
                actual: payload.len(),
            });
        }
        Ok((header, payload))
    }

    pub fn as_ack(&self) -> Result<AckButton, VgsError> {
        match self.kind {
            EnvelopeKind::Ack | EnvelopeKind::AckFeedback => AckButton::from_bytes(&self.body),
            _ => Err(VgsError::ProtocolViolation("expected an ack envelope")),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENVELOPE_HEADER_SIZE + self.body.len());
        out.push(self.kind as u8);
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    fn expect(&self, kind: EnvelopeKind) -> Result<(), VgsError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(VgsError::ProtocolViolation("unexpected envelope kind"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::Feedback;
    use crate::error::StatusCode;
    use crate::flags::BufferFlags;

    #[test]
    fn hello_roundtrip() {
        let env = Envelope::hello(2, 3);
        assert_eq!(env.as_hello().unwrap(), (2, 3));
        assert!(env.as_buffer().is_err());
    }

    #[test]
    fn buffer_length_must_match_payload() {
        let header = CountWord::new(3, BufferFlags::FRAME_COMPLETE).unwrap();
        let env = Envelope::buffer(header, &[1, 2, 3]).unwrap();
        let (cw, payload) = env.as_buffer().unwrap();
        assert!(cw.contains(BufferFlags::FRAME_COMPLETE));
        assert_eq!(&payload[..], &[1, 2, 3]);

        let lying = CountWord::new(10, BufferFlags::empty()).unwrap();
        let env = Envelope::buffer(lying, &[1, 2, 3]).unwrap();
        assert!(matches!(
            env.as_buffer(),
            Err(VgsError::InvalidLength { expected: 10, actual: 3 })
        ));
    }

    #[test]
    fn ack_kind_follows_feedback_presence() {
        let bare = Envelope::ack(&AckButton::status(StatusCode::Ok));
        assert_eq!(bare.kind(), EnvelopeKind::Ack);
        assert_eq!(bare.body().len(), 4);

        let rich = Envelope::ack(&AckButton::with_feedback(StatusCode::Ok, Feedback::neutral()));
        assert_eq!(rich.kind(), EnvelopeKind::AckFeedback);
        assert!(rich.as_ack().unwrap().feedback.is_some());
    }

    #[test]
    fn envelope_bytes_prefix() {
        let env = Envelope::hello(1, 2);
        let bytes = env.to_bytes();
        assert_eq!(bytes[0], EnvelopeKind::Hello as u8);
        assert_eq!(&bytes[1..5], &8u32.to_be_bytes());
        assert_eq!(bytes.len(), ENVELOPE_HEADER_SIZE + 8);
    }
}
