//! A drawing surface on the sending side: one buffer plus the pen-state
//! cache that must stay in step with every decoder.

use tracing::trace;

use crate::client::buffer::{DrawBuffer, SealedBuffer};
use crate::client::command::Command;
use crate::client::pen::PenState;
use crate::encoding::bits::BitWriter;
use crate::encoding::coord::Precision;
use crate::error::VgsError;
use crate::flags::BufferFlags;
use crate::frame::FrameMarker;

/// Sinks a window's buffers are meant for. A disabled sink turns into a
/// `SKIP_*` bit on every buffer the window seals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSinks {
    pub file: bool,
    pub peer: bool,
}

impl Default for WindowSinks {
    fn default() -> Self {
        Self {
            file: true,
            peer: true,
        }
    }
}

impl WindowSinks {
    pub fn file_only() -> Self {
        Self {
            file: true,
            peer: false,
        }
    }

    pub fn peer_only() -> Self {
        Self {
            file: false,
            peer: true,
        }
    }

    fn skip_flags(self) -> BufferFlags {
        let mut flags = BufferFlags::empty();
        flags.set(BufferFlags::SKIP_FILE, !self.file);
        flags.set(BufferFlags::SKIP_PEER, !self.peer);
        flags
    }
}

#[derive(Debug)]
pub struct Window {
    id: u32,
    precision: Precision,
    sinks: WindowSinks,
    buffer: DrawBuffer,
    pen: PenState,
    /// Next command in this buffer must be preceded by a pen restore.
    needs_restore: bool,
    atomic: bool,
    frame: u32,
}

impl Window {
    pub fn new(id: u32, buffer: DrawBuffer, precision: Precision, sinks: WindowSinks) -> Self {
        Self {
            id,
            precision,
            sinks,
            buffer,
            pen: PenState::for_window(id),
            needs_restore: true,
            atomic: false,
            frame: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn pen(&self) -> &PenState {
        &self.pen
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    pub fn has_pending(&self) -> bool {
        self.buffer.has_pending()
    }

    pub fn set_flag(&mut self, flag: BufferFlags) {
        self.buffer.set_flag(flag);
    }

    /// Give the buffer back for reuse by the next window.
    pub fn into_buffer(self) -> DrawBuffer {
        self.buffer
    }

    /// Encode `cmd` into the buffer. When it does not fit, the current
    /// buffer is sealed and returned and the command starts a fresh one.
    pub fn push(&mut self, cmd: &Command) -> Result<Option<SealedBuffer>, VgsError> {
        let (bits, pen) = self.encode(cmd, self.needs_restore);
        if self.buffer.fits(bits.bit_len()) {
            self.commit(&bits, pen)?;
            return Ok(None);
        }
        if self.buffer.is_empty() {
            return Err(self.too_small(&bits));
        }

        let sealed = self.seal()?;
        trace!(window = self.id, len = sealed.header.len(), "buffer full");
        let (bits, pen) = self.encode(cmd, self.needs_restore);
        if !self.buffer.fits(bits.bit_len()) {
            return Err(self.too_small(&bits));
        }
        self.commit(&bits, pen)?;
        Ok(Some(sealed))
    }

    /// Seal whatever the buffer holds. Outside an atomic sequence the next
    /// buffer starts from a restored pen with every dimension reset.
    pub fn seal(&mut self) -> Result<SealedBuffer, VgsError> {
        let mut flags = self.sinks.skip_flags();
        if self.atomic {
            flags |= BufferFlags::ATOMIC_CONTINUE;
        }
        self.buffer.set_flag(flags);
        let sealed = self.buffer.seal()?;
        if !self.atomic {
            self.pen.reset_dims();
            self.needs_restore = true;
        }
        Ok(sealed)
    }

    /// Start a new frame: the buffer is expected to be empty and receives
    /// the frame marker at offset 0.
    pub fn begin_frame(&mut self) -> Result<u32, VgsError> {
        if self.atomic {
            return Err(VgsError::ProtocolViolation("frame started inside an atomic sequence"));
        }
        let frame = self.skip_frame();
        self.buffer.write_marker(FrameMarker::new(frame, self.id)?)?;
        self.pen.reset_dims();
        self.needs_restore = true;
        Ok(self.frame)
    }

    /// Advance the frame counter without writing a marker.
    pub fn skip_frame(&mut self) -> u32 {
        self.frame = self.frame.wrapping_add(1);
        self.frame
    }

    pub fn begin_atomic(&mut self) -> Result<(), VgsError> {
        if self.atomic {
            return Err(VgsError::ProtocolViolation("atomic sequence already open"));
        }
        self.atomic = true;
        Ok(())
    }

    /// Close the sequence; the next seal goes out without the continuation bit.
    pub fn end_atomic(&mut self) -> Result<(), VgsError> {
        if !self.atomic {
            return Err(VgsError::ProtocolViolation("no atomic sequence open"));
        }
        self.atomic = false;
        Ok(())
    }

    fn encode(&self, cmd: &Command, restore: bool) -> (BitWriter, PenState) {
        let mut pen = self.pen;
        let mut bits = BitWriter::new();
        if restore {
            pen.encode_restore(&mut bits);
        }
        cmd.encode(&mut pen, self.precision, &mut bits);
        (bits, pen)
    }

    fn commit(&mut self, bits: &BitWriter, pen: PenState) -> Result<(), VgsError> {
        self.buffer.write(bits)?;
        self.pen = pen;
        self.needs_restore = false;
        Ok(())
    }

    fn too_small(&self, bits: &BitWriter) -> VgsError {
        VgsError::BufferTooSmall {
            needed_bits: bits.bit_len(),
            capacity_bits: self.buffer.capacity_bits(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::decode::StreamDecoder;

    fn window(capacity: usize) -> Window {
        Window::new(1, DrawBuffer::new(capacity), Precision::default(), WindowSinks::default())
    }

    fn zigzag(i: usize) -> Command {
        // Alternating absolute jumps keep every command the same width.
        let x = if i % 2 == 0 { 1.0 } else { 40.0 };
        Command::LineTo { x, y: x }
    }

    #[test]
    fn default_buffer_flushes_exactly_once_at_capacity() {
        let cfg = SessionConfig::default();
        let mut win = Window::new(
            1,
            DrawBuffer::new(cfg.payload_capacity()),
            cfg.precision,
            WindowSinks::default(),
        );

        let mut flushed = Vec::new();
        let mut used_before = 0;
        let mut i = 0;
        while flushed.is_empty() {
            used_before = win.buffer.used_bits();
            if let Some(sealed) = win.push(&zigzag(i)).unwrap() {
                flushed.push(sealed);
            }
            i += 1;
        }
        let sealed = &flushed[0];
        assert_eq!(sealed.header.len(), used_before.div_ceil(8));
        assert!(sealed.header.len() <= cfg.payload_capacity());
        // The command that did not fit now leads the next buffer.
        assert!(win.buffer.used_bits() > 0);
    }

    #[test]
    fn decoder_stays_in_step_across_buffers() {
        let p = Precision::default();
        let mut win = window(32);
        let mut decoder = StreamDecoder::new(p);
        let mut expected = Vec::new();
        let mut decoded = Vec::new();

        for i in 0..40 {
            let v = i as f64 * 0.37 - 4.0;
            let cmd = Command::LineTo { x: v, y: -v / 2.0 };
            expected.push(Command::LineTo {
                x: p.to_user(p.quantize(v, crate::encoding::CoordKind::Position)),
                y: p.to_user(p.quantize(-v / 2.0, crate::encoding::CoordKind::Position)),
            });
            if let Some(sealed) = win.push(&cmd).unwrap() {
                decoded.extend(decoder.decode(&sealed.payload).unwrap().commands());
            }
        }
        let last = win.seal().unwrap();
        decoded.extend(decoder.decode(&last.payload).unwrap().commands());
        assert_eq!(decoded, expected);
    }

    #[test]
    fn atomic_buffers_continue_without_restore() {
        let mut win = window(12);
        win.begin_atomic().unwrap();
        let mut sealed = None;
        for i in 0..10 {
            if let Some(s) = win.push(&zigzag(i)).unwrap() {
                sealed = Some(s);
                break;
            }
        }
        let sealed = sealed.expect("small buffer fills");
        assert!(sealed.header.contains(BufferFlags::ATOMIC_CONTINUE));
        assert!(!win.needs_restore);

        win.end_atomic().unwrap();
        let last = win.seal().unwrap();
        assert!(!last.header.contains(BufferFlags::ATOMIC_CONTINUE));
        assert!(win.needs_restore);
    }

    #[test]
    fn oversized_command_is_fatal() {
        let mut win = window(4);
        let err = win
            .push(&Command::Text {
                x: 0.0,
                y: 0.0,
                height: 1.0,
                text: "far too long for four bytes".into(),
            })
            .unwrap_err();
        assert!(matches!(err, VgsError::BufferTooSmall { .. }));
    }

    #[test]
    fn sink_selection_sets_skip_bits() {
        let mut win = Window::new(2, DrawBuffer::new(64), Precision::default(), WindowSinks::file_only());
        win.push(&Command::SetColor(1)).unwrap();
        let sealed = win.seal().unwrap();
        assert!(sealed.header.contains(BufferFlags::SKIP_PEER));
        assert!(!sealed.header.contains(BufferFlags::SKIP_FILE));
    }

    #[test]
    fn frame_marker_opens_the_buffer() {
        let mut win = window(64);
        assert_eq!(win.begin_frame().unwrap(), 1);
        win.push(&Command::MoveTo { x: 1.0, y: 1.0 }).unwrap();
        let sealed = win.seal().unwrap();
        assert!(sealed.frame_initial);
        let marker = FrameMarker::detect(&sealed.payload).unwrap();
        assert_eq!((marker.frame, marker.window), (1, 1));
    }
}
