//! One window's outgoing buffer and its fill/flush state machine.
//!
//! ```text
//! Empty ──write──► Filling ──align──► AlignPending ──seal──► (SealedBuffer) ──► Empty
//!   ▲                                                                      │
//!   └──────────────────────────── buffer handed to the link ◄──────────────┘
//! ```
//!
//! The payload capacity is the configured buffer length minus the
//! CountWord. A sealed buffer always ends on a byte boundary; the sub-byte
//! tail is zero-padded, which the decoder reads as `Nop` records.

use bytes::Bytes;

use crate::encoding::bits::BitWriter;
use crate::error::VgsError;
use crate::flags::BufferFlags;
use crate::frame::{FrameMarker, MARKER_LEN};
use crate::header::CountWord;
use crate::packet::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Empty,
    Filling,
    AlignPending,
}

/// A finished buffer, ready for the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBuffer {
    pub header: CountWord,
    pub payload: Bytes,
    /// Starts with a frame marker.
    pub frame_initial: bool,
}

impl SealedBuffer {
    /// A payload-less buffer that only carries flags.
    pub fn control(flags: BufferFlags) -> Result<Self, VgsError> {
        Ok(Self {
            header: CountWord::new(0, flags)?,
            payload: Bytes::new(),
            frame_initial: false,
        })
    }

    pub fn add_flags(&mut self, flags: BufferFlags) -> Result<(), VgsError> {
        self.header = CountWord::new(self.header.len(), self.header.flags() | flags)?;
        Ok(())
    }

    /// Whether the sender must consume the reply right after sending.
    pub fn waits_immediately(&self) -> bool {
        self.frame_initial || self.header.flags().intersects(BufferFlags::TERMINAL)
    }

    pub fn to_envelope(&self) -> Result<Envelope, VgsError> {
        Envelope::buffer(self.header, &self.payload)
    }
}

#[derive(Debug)]
pub struct DrawBuffer {
    bits: BitWriter,
    capacity: usize,
    flags: BufferFlags,
    state: BufferState,
    frame_initial: bool,
}

impl DrawBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bits: BitWriter::with_capacity(capacity),
            capacity,
            flags: BufferFlags::empty(),
            state: BufferState::Empty,
            frame_initial: false,
        }
    }

    /// Rearm a retained buffer for a new owner, keeping its allocation.
    pub fn recycle(mut self, capacity: usize) -> Self {
        self.bits.clear();
        self.capacity = capacity;
        self.flags = BufferFlags::empty();
        self.state = BufferState::Empty;
        self.frame_initial = false;
        self
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn capacity_bits(&self) -> usize {
        self.capacity * 8
    }

    pub fn used_bits(&self) -> usize {
        self.bits.bit_len()
    }

    /// True when no payload bits have been written.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Payload bits or flags are waiting to go out.
    pub fn has_pending(&self) -> bool {
        !self.bits.is_empty() || !self.flags.is_empty()
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: BufferFlags) {
        self.flags |= flag;
    }

    /// Room check for `nbits` more bits, counting the padding a seal adds.
    pub fn fits(&self, nbits: usize) -> bool {
        (self.bits.bit_len() + nbits).div_ceil(8) <= self.capacity
    }

    pub fn write(&mut self, bits: &BitWriter) -> Result<(), VgsError> {
        if !self.fits(bits.bit_len()) {
            return Err(VgsError::BufferTooSmall {
                needed_bits: bits.bit_len(),
                capacity_bits: self.capacity_bits() - self.used_bits(),
            });
        }
        self.bits.append(bits);
        if !self.bits.is_empty() {
            self.state = BufferState::Filling;
        }
        Ok(())
    }

    /// Put a frame marker at offset 0. The buffer must be empty.
    pub fn write_marker(&mut self, marker: FrameMarker) -> Result<(), VgsError> {
        if !self.bits.is_empty() {
            return Err(VgsError::ProtocolViolation("frame marker must open a buffer"));
        }
        if self.capacity < MARKER_LEN {
            return Err(VgsError::BufferTooSmall {
                needed_bits: MARKER_LEN * 8,
                capacity_bits: self.capacity_bits(),
            });
        }
        self.bits.put_bytes(&marker.encode());
        self.frame_initial = true;
        self.state = BufferState::Filling;
        Ok(())
    }

    /// Pad with a skip record to the next byte boundary. Returns the pad width.
    pub fn align(&mut self) -> u32 {
        let pad = self.bits.pad_bits();
        self.bits.align();
        if self.state == BufferState::Filling {
            self.state = BufferState::AlignPending;
        }
        pad
    }

    /// Finalize the CountWord and hand out the payload, leaving the buffer empty.
    pub fn seal(&mut self) -> Result<SealedBuffer, VgsError> {
        self.align();
        let payload = self.bits.take();
        let header = CountWord::new(payload.len(), self.flags)?;
        let sealed = SealedBuffer {
            header,
            payload,
            frame_initial: self.frame_initial,
        };
        self.flags = BufferFlags::empty();
        self.frame_initial = false;
        self.state = BufferState::Empty;
        Ok(sealed)
    }
}
