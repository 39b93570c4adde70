//! Control bits carried in the upper six bits of a CountWord, plus the
//! session debug mask.

use bitflags::bitflags;

bitflags! {
    /// Flags that share the 32-bit CountWord with the payload length.
    ///
    /// The sender sets the first four; the relay sets or clears the two
    /// `SKIP_*` bits on its forwarded copy of the header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// More buffers of this atomic sequence follow from the same sender.
        const ATOMIC_CONTINUE = 1 << 26;
        /// First buffer this sender has sent in the session.
        const FIRST_BUFFER    = 1 << 27;
        /// This sender has finished its part of the current frame.
        const FRAME_COMPLETE  = 1 << 28;
        /// Last buffer of the session.
        const SESSION_CLOSE   = 1 << 29;
        /// Do not write this buffer to the metafile.
        const SKIP_FILE       = 1 << 30;
        /// Do not forward this buffer to the rendering peer.
        const SKIP_PEER       = 1 << 31;
    }
}

impl BufferFlags {
    /// Flags that force the sender to wait for its reply right away.
    pub const TERMINAL: BufferFlags =
        BufferFlags::FRAME_COMPLETE.union(BufferFlags::SESSION_CLOSE);

    /// The per-sink routing bits.
    pub const SKIP_ANY: BufferFlags = BufferFlags::SKIP_FILE.union(BufferFlags::SKIP_PEER);
}

bitflags! {
    /// Debug switches carried as a hexadecimal mask in the startup handshake.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DebugFlags: u32 {
        /// Log every buffer the relay receives.
        const TRACE_BUFFERS  = 0x0001;
        /// Log every ack the relay sends.
        const TRACE_ACKS     = 0x0002;
        /// Log rendering-peer traffic.
        const TRACE_PEER     = 0x0004;
        /// Log frame completion rounds.
        const TRACE_FRAMES   = 0x0008;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_do_not_overlap_length_bits() {
        let all = BufferFlags::all().bits();
        assert_eq!(all & crate::header::LENGTH_MASK, 0);
    }

    #[test]
    fn terminal_contains_complete_and_close() {
        assert!(BufferFlags::TERMINAL.contains(BufferFlags::FRAME_COMPLETE));
        assert!(BufferFlags::TERMINAL.contains(BufferFlags::SESSION_CLOSE));
        assert!(!BufferFlags::TERMINAL.contains(BufferFlags::FIRST_BUFFER));
    }

    #[test]
    fn debug_flags_truncate_unknown_bits() {
        let flags = DebugFlags::from_bits_truncate(0xFFFF_0003);
        assert_eq!(flags, DebugFlags::TRACE_BUFFERS | DebugFlags::TRACE_ACKS);
    }
}
