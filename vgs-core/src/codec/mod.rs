//! `tokio_util` framing for [`Envelope`]s over a byte stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::VgsError;
use crate::message::EnvelopeKind;
use crate::packet::{ENVELOPE_HEADER_SIZE, Envelope, MAX_ENVELOPE_BODY};

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec;

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = VgsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        let kind = EnvelopeKind::try_from(src[0])?;
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > MAX_ENVELOPE_BODY {
            return Err(VgsError::EnvelopeTooLarge {
                size: len,
                max: MAX_ENVELOPE_BODY,
            });
        }

        if src.len() < ENVELOPE_HEADER_SIZE + len {
            src.reserve(ENVELOPE_HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(ENVELOPE_HEADER_SIZE);
        let body = src.split_to(len).freeze();
        Envelope::new(kind, body).map(Some)
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = VgsError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(ENVELOPE_HEADER_SIZE + item.body().len());
        dst.put_u8(item.kind() as u8);
        dst.put_u32(item.body().len() as u32);
        dst.put_slice(item.body());
        Ok(())
    }
}
