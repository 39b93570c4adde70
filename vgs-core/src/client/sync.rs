//! Sender-side reply bookkeeping.
//!
//! Every buffer the relay receives is answered with exactly one ack. The
//! synchroniser keeps at most one of those replies outstanding: after an
//! ordinary flush the reply is left pending and only consumed right before
//! the next flush, which hides the relay's round trip behind drawing work.
//! Frame-initial, frame-complete and session-close buffers (or an explicit
//! blocking request) resolve their reply straight away.

use tracing::{debug, trace};

use crate::ack::AckButton;
use crate::client::buffer::SealedBuffer;
use crate::client::peers::PeerGroup;
use crate::client::window::Window;
use crate::error::VgsError;
use crate::flags::BufferFlags;
use crate::network::Connection;
use crate::packet::Envelope;

/// Handle for a buffer whose ack has not been consumed yet.
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct PendingReply {
    pub flags: BufferFlags,
    pub len: usize,
}

#[derive(Debug)]
pub struct Synchronizer {
    rank: u32,
    link: Connection,
    peers: PeerGroup,
    pending: Option<PendingReply>,
    first_sent: bool,
    complete_marked: bool,
}

impl Synchronizer {
    pub fn new(rank: u32, link: Connection, peers: PeerGroup) -> Self {
        Self {
            rank,
            link,
            peers,
            pending: None,
            first_sent: false,
            complete_marked: false,
        }
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn is_host(&self) -> bool {
        self.rank == 0
    }

    pub fn group_size(&self) -> usize {
        self.peers.size()
    }

    pub fn pending(&self) -> Option<&PendingReply> {
        self.pending.as_ref()
    }

    /// Clear the once-per-frame completion guard.
    pub fn start_frame(&mut self) {
        self.complete_marked = false;
    }

    /// Flag `window`'s buffer as this sender's last for the frame. Returns
    /// `false` when completion was already marked this frame.
    pub fn mark_complete(&mut self, window: &mut Window) -> bool {
        if self.complete_marked {
            return false;
        }
        window.set_flag(BufferFlags::FRAME_COMPLETE);
        self.complete_marked = true;
        true
    }

    /// Seal and send `window`'s buffer if it holds bits or flags. With
    /// `force` the reply is consumed before returning.
    pub async fn flush(
        &mut self,
        window: &mut Window,
        force: bool,
    ) -> Result<Option<AckButton>, VgsError> {
        if !window.has_pending() {
            return if force { self.wait_or_poll(true).await } else { Ok(None) };
        }
        let sealed = window.seal()?;
        self.transmit(sealed, force).await
    }

    /// Send a sealed buffer, first settling the previous reply.
    pub async fn transmit(
        &mut self,
        mut sealed: SealedBuffer,
        block: bool,
    ) -> Result<Option<AckButton>, VgsError> {
        self.wait_or_poll(true).await?;

        if !self.first_sent {
            sealed.add_flags(BufferFlags::FIRST_BUFFER)?;
            self.first_sent = true;
        }
        let immediate = block || sealed.waits_immediately();
        trace!(
            rank = self.rank,
            len = sealed.header.len(),
            flags = ?sealed.header.flags(),
            "flush"
        );
        self.link.send(sealed.to_envelope()?).await?;
        self.pending = Some(PendingReply {
            flags: sealed.header.flags(),
            len: sealed.header.len(),
        });

        if immediate {
            self.wait_or_poll(true).await
        } else {
            Ok(None)
        }
    }

    /// Settle the outstanding reply. Without `block`, only a reply that has
    /// already arrived is taken.
    pub async fn wait_or_poll(&mut self, block: bool) -> Result<Option<AckButton>, VgsError> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        let envelope = if block {
            self.link.recv().await.ok_or(VgsError::ChannelClosed)?
        } else {
            match self.link.try_recv()? {
                Some(envelope) => envelope,
                None => {
                    self.pending = Some(pending);
                    return Ok(None);
                }
            }
        };
        let ack = envelope.as_ack()?;
        trace!(rank = self.rank, code = %ack.code, flags = ?pending.flags, "reply");
        ack.check().map(Some)
    }

    /// Wait for a reply that is not tied to a buffer: the handshake acks
    /// and the host's frame/close feedback.
    pub async fn await_ack(&mut self) -> Result<AckButton, VgsError> {
        if self.pending.is_some() {
            return Err(VgsError::ProtocolViolation("buffer reply still pending"));
        }
        let envelope = self.link.recv().await.ok_or(VgsError::ChannelClosed)?;
        let ack = envelope.as_ack()?;
        debug!(rank = self.rank, code = %ack.code, feedback = ack.feedback.is_some(), "ack");
        ack.check()
    }

    pub async fn send_envelope(&mut self, envelope: Envelope) -> Result<(), VgsError> {
        self.link.send(envelope).await
    }

    pub async fn barrier(&mut self) {
        self.peers.barrier().await;
    }

    /// Share the host's ack with every sender. Only the host's `value` is used.
    pub async fn broadcast(&mut self, value: AckButton) -> Result<AckButton, VgsError> {
        let value = self.is_host().then_some(value);
        self.peers.broadcast(value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::buffer::DrawBuffer;
    use crate::client::command::Command;
    use crate::client::window::WindowSinks;
    use crate::encoding::coord::Precision;
    use crate::error::StatusCode;
    use crate::network::loopback;

    fn window() -> Window {
        Window::new(1, DrawBuffer::new(256), Precision::default(), WindowSinks::default())
    }

    #[tokio::test]
    async fn ordinary_flush_defers_its_reply() {
        let (mut links, mut ports) = loopback(1).unwrap();
        let mut sync = Synchronizer::new(0, links.remove(0), PeerGroup::new(1));
        let mut win = window();

        win.push(&Command::SetColor(2)).unwrap();
        assert!(sync.flush(&mut win, false).await.unwrap().is_none());
        assert!(sync.pending().is_some());

        let first = ports.recv().await.unwrap();
        let (header, _) = first.envelope.as_buffer().unwrap();
        assert!(header.contains(BufferFlags::FIRST_BUFFER));

        // Not answered yet: a poll leaves it pending.
        assert!(sync.wait_or_poll(false).await.unwrap().is_none());
        assert!(sync.pending().is_some());

        ports.send_to(0, Envelope::ack(&AckButton::default())).await.unwrap();
        win.push(&Command::SetColor(3)).unwrap();
        sync.flush(&mut win, false).await.unwrap();

        let second = ports.recv().await.unwrap();
        let (header, _) = second.envelope.as_buffer().unwrap();
        assert!(!header.contains(BufferFlags::FIRST_BUFFER));
        assert!(sync.pending().is_some());
    }

    #[tokio::test]
    async fn frame_complete_waits_immediately() {
        let (mut links, mut ports) = loopback(1).unwrap();
        let mut sync = Synchronizer::new(0, links.remove(0), PeerGroup::new(1));
        let mut win = window();

        assert!(sync.mark_complete(&mut win));
        assert!(!sync.mark_complete(&mut win));

        let relay = tokio::spawn(async move {
            let inbound = ports.recv().await.unwrap();
            let (header, _) = inbound.envelope.as_buffer().unwrap();
            assert!(header.contains(BufferFlags::FRAME_COMPLETE));
            ports.send_to(0, Envelope::ack(&AckButton::default())).await.unwrap();
            ports
        });

        let reply = sync.flush(&mut win, false).await.unwrap();
        assert_eq!(reply, Some(AckButton::default()));
        assert!(sync.pending().is_none());
        relay.await.unwrap();
    }

    #[tokio::test]
    async fn nonzero_reply_is_an_error() {
        let (mut links, mut ports) = loopback(1).unwrap();
        let mut sync = Synchronizer::new(0, links.remove(0), PeerGroup::new(1));
        let mut win = window();

        win.push(&Command::SetPen(1)).unwrap();
        sync.flush(&mut win, false).await.unwrap();
        ports
            .send_to(0, Envelope::ack(&AckButton::status(StatusCode::Oversized)))
            .await
            .unwrap();

        let err = sync.wait_or_poll(true).await.unwrap_err();
        assert!(matches!(err, VgsError::RelayReported(StatusCode::Oversized)));
    }
}
