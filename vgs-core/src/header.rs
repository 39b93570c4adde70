//! The per-buffer header ("CountWord").
//!
//! ```text
//!  31        30        29      28       27      26      25 ............ 0
//! SKIP_PEER SKIP_FILE CLOSE  COMPLETE  FIRST  ATOMIC   payload length
//! ```
//!
//! Encoded as one big-endian `u32` immediately before the payload.

use crate::error::VgsError;
use crate::flags::BufferFlags;

/// Size of an encoded CountWord on the wire.
pub const HEADER_SIZE: usize = 4;

/// Low 26 bits hold the payload byte length.
pub const LENGTH_MASK: u32 = (1 << 26) - 1;

/// Largest payload a CountWord can describe.
pub const MAX_PAYLOAD_LEN: usize = LENGTH_MASK as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountWord {
    len: u32,
    flags: BufferFlags,
}

impl CountWord {
    pub fn new(len: usize, flags: BufferFlags) -> Result<Self, VgsError> {
        if len > MAX_PAYLOAD_LEN {
            return Err(VgsError::InvalidLength {
                expected: MAX_PAYLOAD_LEN,
                actual: len,
            });
        }
        Ok(Self {
            len: len as u32,
            flags,
        })
    }

    pub fn from_u32(raw: u32) -> Self {
        Self {
            len: raw & LENGTH_MASK,
            flags: BufferFlags::from_bits_truncate(raw),
        }
    }

    pub fn to_u32(self) -> u32 {
        self.len | self.flags.bits()
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        self.to_u32().to_be_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VgsError> {
        let raw: [u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(VgsError::InvalidLength {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self::from_u32(u32::from_be_bytes(raw)))
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub fn contains(&self, flag: BufferFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Copy of this header with the relay's routing bits replaced.
    pub fn with_routing(self, skip_file: bool, skip_peer: bool) -> Self {
        let mut flags = self.flags - BufferFlags::SKIP_ANY;
        flags.set(BufferFlags::SKIP_FILE, skip_file);
        flags.set(BufferFlags::SKIP_PEER, skip_peer);
        Self { len: self.len, flags }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countword_layout() {
        let cw = CountWord::new(
            4088,
            BufferFlags::FRAME_COMPLETE | BufferFlags::FIRST_BUFFER,
        )
        .unwrap();
        assert_eq!(cw.to_u32(), 4088 | (1 << 28) | (1 << 27));
        assert_eq!(cw.to_bytes(), (4088u32 | (1 << 28) | (1 << 27)).to_be_bytes());
    }

    #[test]
    fn countword_decodes_flags_and_length() {
        let raw = 17u32 | (1 << 29) | (1 << 31);
        let cw = CountWord::from_bytes(&raw.to_be_bytes()).unwrap();
        assert_eq!(cw.len(), 17);
        assert!(cw.contains(BufferFlags::SESSION_CLOSE));
        assert!(cw.contains(BufferFlags::SKIP_PEER));
        assert!(!cw.contains(BufferFlags::SKIP_FILE));
    }

    #[test]
    fn countword_rejects_oversized_length() {
        assert!(CountWord::new(MAX_PAYLOAD_LEN + 1, BufferFlags::empty()).is_err());
    }

    #[test]
    fn routing_bits_are_independent_of_sender_flags() {
        let cw = CountWord::new(8, BufferFlags::ATOMIC_CONTINUE | BufferFlags::SKIP_FILE).unwrap();
        let routed = cw.with_routing(false, true);
        assert!(routed.contains(BufferFlags::ATOMIC_CONTINUE));
        assert!(!routed.contains(BufferFlags::SKIP_FILE));
        assert!(routed.contains(BufferFlags::SKIP_PEER));
        assert_eq!(routed.len(), 8);
    }

    #[test]
    fn short_header_is_an_error() {
        assert!(CountWord::from_bytes(&[0, 1]).is_err());
    }
}
