//! Frame-start record: the ASCII marker that opens every frame in the
//! persisted stream.
//!
//! ```text
//! [ffffffff,wwww]
//!  └ frame ┘ └win┘
//! ```
//!
//! It always sits at offset 0 of a buffer payload, so the relay can find
//! it without decoding the bit stream and rewrite the frame index in place
//! separately for each sink.

use crate::error::VgsError;

pub const MARKER_LEN: usize = 15;

const FRAME_DIGITS: usize = 8;
const WINDOW_DIGITS: usize = 4;
const FRAME_RANGE: std::ops::Range<usize> = 1..1 + FRAME_DIGITS;
const WINDOW_RANGE: std::ops::Range<usize> = 10..10 + WINDOW_DIGITS;

/// Frame indices wrap at this value to stay inside the fixed width.
pub const FRAME_MODULUS: u32 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMarker {
    pub frame: u32,
    pub window: u32,
}

impl FrameMarker {
    pub fn new(frame: u32, window: u32) -> Result<Self, VgsError> {
        if window >= 10_000 {
            return Err(VgsError::field("window", format!("{window} exceeds 4 digits")));
        }
        Ok(Self {
            frame: frame % FRAME_MODULUS,
            window,
        })
    }

    pub fn encode(&self) -> [u8; MARKER_LEN] {
        let text = format!(
            "[{:0fw$},{:0ww$}]",
            self.frame % FRAME_MODULUS,
            self.window,
            fw = FRAME_DIGITS,
            ww = WINDOW_DIGITS
        );
        let mut out = [0u8; MARKER_LEN];
        out.copy_from_slice(text.as_bytes());
        out
    }

    /// Find a marker at the start of `payload`.
    pub fn detect(payload: &[u8]) -> Option<Self> {
        let head = payload.get(..MARKER_LEN)?;
        if head[0] != b'[' || head[9] != b',' || head[14] != b']' {
            return None;
        }
        let frame = parse_digits(&head[FRAME_RANGE])?;
        let window = parse_digits(&head[WINDOW_RANGE])?;
        Some(Self { frame, window })
    }
}

fn parse_digits(digits: &[u8]) -> Option<u32> {
    digits.iter().try_fold(0u32, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + u32::from(b - b'0'))
    })
}

/// Overwrite the frame index of the marker at the start of `payload`.
pub fn patch_frame_index(payload: &mut [u8], frame: u32) -> Result<(), VgsError> {
    if FrameMarker::detect(payload).is_none() {
        return Err(VgsError::ProtocolViolation("no frame marker to patch"));
    }
    let digits = format!("{:0w$}", frame % FRAME_MODULUS, w = FRAME_DIGITS);
    payload[FRAME_RANGE].copy_from_slice(digits.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_text_layout() {
        let m = FrameMarker::new(42, 3).unwrap();
        assert_eq!(&m.encode(), b"[00000042,0003]");
    }

    #[test]
    fn detect_and_patch_in_place() {
        let mut payload = FrameMarker::new(7, 12).unwrap().encode().to_vec();
        payload.extend_from_slice(&[0xAA, 0x55]);
        assert_eq!(
            FrameMarker::detect(&payload),
            Some(FrameMarker { frame: 7, window: 12 })
        );

        patch_frame_index(&mut payload, 5).unwrap();
        assert_eq!(&payload[..MARKER_LEN], b"[00000005,0012]");
        assert_eq!(&payload[MARKER_LEN..], &[0xAA, 0x55]);
    }

    #[test]
    fn binary_payloads_are_not_markers() {
        assert_eq!(FrameMarker::detect(&[0x5B; 20]), None);
        assert_eq!(FrameMarker::detect(b"[0000"), None);
        let mut plain = vec![0u8; 20];
        assert!(patch_frame_index(&mut plain, 1).is_err());
    }

    #[test]
    fn oversized_window_is_rejected() {
        assert!(FrameMarker::new(0, 10_000).is_err());
    }
}
