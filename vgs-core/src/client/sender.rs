//! The drawing API of one sender.
//!
//! A run has `N` senders sharing one relay; rank 0 is the host. The host
//! alone performs the startup handshake, writes window open/close records
//! and frame markers, receives frame feedback and closes the session. What
//! the host learns is broadcast to the others so every sender leaves a
//! frame with the same feedback.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::ack::{AckButton, Feedback};
use crate::client::buffer::{DrawBuffer, SealedBuffer};
use crate::client::command::Command;
use crate::client::peers::PeerGroup;
use crate::client::sync::Synchronizer;
use crate::client::window::{Window, WindowSinks};
use crate::config::SessionConfig;
use crate::error::{StatusCode, VgsError};
use crate::flags::BufferFlags;
use crate::handshake::ABORT_MARKER;
use crate::network::Connection;
use crate::packet::Envelope;

#[derive(Debug)]
pub struct Sender {
    config: Arc<SessionConfig>,
    sync: Synchronizer,
    windows: BTreeMap<u32, Window>,
    /// Buffers of closed windows, kept for the next open.
    spare: Vec<DrawBuffer>,
    feedback: Feedback,
    closed: bool,
}

impl Sender {
    pub fn new(
        rank: u32,
        config: Arc<SessionConfig>,
        link: Connection,
        peers: PeerGroup,
    ) -> Result<Self, VgsError> {
        config.validate()?;
        if rank as usize >= peers.size() {
            return Err(VgsError::field("rank", format!("{rank} outside a group of {}", peers.size())));
        }
        Ok(Self {
            config,
            sync: Synchronizer::new(rank, link, peers),
            windows: BTreeMap::new(),
            spare: Vec::new(),
            feedback: Feedback::neutral(),
            closed: false,
        })
    }

    pub fn rank(&self) -> u32 {
        self.sync.rank()
    }

    pub fn is_host(&self) -> bool {
        self.sync.is_host()
    }

    /// Feedback from the most recent frame round.
    pub fn feedback(&self) -> Feedback {
        self.feedback
    }

    pub fn synchronizer(&mut self) -> &mut Synchronizer {
        &mut self.sync
    }

    // ── Session ──────────────────────────────────────────────────

    /// Bring the relay up. The host sends the handshake and waits for the
    /// first ack, plus the second one when a rendering peer was requested.
    pub async fn start(&mut self) -> Result<(), VgsError> {
        let outcome = if self.is_host() {
            self.handshake().await
        } else {
            Ok(AckButton::default())
        };
        let status = match &outcome {
            Ok(ack) => *ack,
            Err(e) => AckButton::status(e.status()),
        };
        let shared = self.sync.broadcast(status).await?;
        outcome?;
        shared.check()?;
        info!(rank = self.rank(), "session started");
        Ok(())
    }

    async fn handshake(&mut self) -> Result<AckButton, VgsError> {
        let senders = self.sync.group_size() as u32;
        let body = self.config.to_startup(senders).encode()?;
        self.sync.send_envelope(Envelope::startup(body)?).await?;
        let mut ack = self.sync.await_ack().await?;
        if self.config.sinks.peer {
            ack = self.sync.await_ack().await?;
            debug!("rendering peer is up");
        }
        Ok(ack)
    }

    /// Tell the relay to stop before any output was produced. Host only.
    pub async fn abort(mut self) -> Result<(), VgsError> {
        if !self.is_host() {
            return Ok(());
        }
        let body = Bytes::from_static(ABORT_MARKER);
        self.sync.send_envelope(Envelope::startup(body)?).await?;
        self.sync.await_ack().await?;
        self.closed = true;
        Ok(())
    }

    // ── Windows ──────────────────────────────────────────────────

    /// Open window `id` on every sender; the host writes the open record.
    pub async fn open_window(&mut self, id: u32, sinks: WindowSinks) -> Result<(), VgsError> {
        if self.windows.contains_key(&id) {
            return Err(VgsError::ProtocolViolation("window already open"));
        }
        self.sync.barrier().await;

        let capacity = self.config.payload_capacity();
        let buffer = match self.spare.pop() {
            Some(buffer) => buffer.recycle(capacity),
            None => DrawBuffer::new(capacity),
        };
        self.windows.insert(id, Window::new(id, buffer, self.config.precision, sinks));
        if self.is_host() {
            self.draw(id, Command::OpenWindow { id }).await?;
        }
        debug!(rank = self.rank(), window = id, "window open");
        Ok(())
    }

    /// Close window `id` once every sender has flushed its part.
    pub async fn close_window(&mut self, id: u32) -> Result<(), VgsError> {
        let outcome = self.flush(id, false).await;
        self.sync.barrier().await;
        outcome?;

        if self.is_host() {
            self.draw(id, Command::CloseWindow { id }).await?;
            self.flush(id, false).await?;
        }
        if let Some(window) = self.windows.remove(&id) {
            self.spare.push(window.into_buffer());
        }
        debug!(rank = self.rank(), window = id, "window closed");
        Ok(())
    }

    // ── Drawing ──────────────────────────────────────────────────

    pub async fn draw(&mut self, id: u32, cmd: Command) -> Result<(), VgsError> {
        let window = self.windows.get_mut(&id).ok_or(VgsError::UnknownWindow(id))?;
        let result = match window.push(&cmd) {
            Ok(Some(sealed)) => self.sync.transmit(sealed, false).await.map(|_| ()),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        self.settle(result).await
    }

    pub async fn move_to(&mut self, id: u32, x: f64, y: f64) -> Result<(), VgsError> {
        self.draw(id, Command::MoveTo { x, y }).await
    }

    pub async fn line_to(&mut self, id: u32, x: f64, y: f64) -> Result<(), VgsError> {
        self.draw(id, Command::LineTo { x, y }).await
    }

    pub async fn circle(&mut self, id: u32, x: f64, y: f64, radius: f64) -> Result<(), VgsError> {
        self.draw(id, Command::Circle { x, y, radius }).await
    }

    pub async fn rect(
        &mut self,
        id: u32,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<(), VgsError> {
        self.draw(id, Command::Rect { x, y, width, height }).await
    }

    pub async fn text(
        &mut self,
        id: u32,
        x: f64,
        y: f64,
        height: f64,
        text: impl Into<String>,
    ) -> Result<(), VgsError> {
        let text = text.into();
        self.draw(id, Command::Text { x, y, height, text }).await
    }

    pub async fn set_color(&mut self, id: u32, color: u32) -> Result<(), VgsError> {
        self.draw(id, Command::SetColor(color)).await
    }

    /// Keep the following drawing on `id` together in the relay's output.
    pub fn begin_atomic(&mut self, id: u32) -> Result<(), VgsError> {
        self.window_mut(id)?.begin_atomic()
    }

    /// Close the atomic sequence and release the relay's pin.
    pub async fn end_atomic(&mut self, id: u32) -> Result<(), VgsError> {
        self.window_mut(id)?.end_atomic()?;
        self.flush(id, false).await
    }

    // ── Synchronisation ──────────────────────────────────────────

    /// Flush window `id` if it holds anything; `force` also waits for the reply.
    pub async fn flush(&mut self, id: u32, force: bool) -> Result<(), VgsError> {
        let window = self.windows.get_mut(&id).ok_or(VgsError::UnknownWindow(id))?;
        let result = self.sync.flush(window, force).await.map(|_| ());
        self.settle(result).await
    }

    pub async fn wait_or_poll(&mut self, block: bool) -> Result<Option<AckButton>, VgsError> {
        let result = self.sync.wait_or_poll(block).await;
        self.settle(result).await
    }

    pub async fn barrier(&mut self) {
        self.sync.barrier().await;
    }

    // ── Frames ───────────────────────────────────────────────────

    /// Start the next frame of window `id`. Every sender calls this; the
    /// host's frame marker is on the wire before anyone draws.
    pub async fn begin_frame(&mut self, id: u32) -> Result<u32, VgsError> {
        self.sync.start_frame();
        let outcome = self.open_frame(id).await;
        self.sync.barrier().await;
        self.settle(outcome).await
    }

    async fn open_frame(&mut self, id: u32) -> Result<u32, VgsError> {
        self.flush(id, false).await?;
        let window = self.windows.get_mut(&id).ok_or(VgsError::UnknownWindow(id))?;
        if !self.sync.is_host() {
            return Ok(window.skip_frame());
        }
        let frame = window.begin_frame()?;
        let sealed = window.seal()?;
        self.sync.transmit(sealed, true).await?;
        Ok(frame)
    }

    /// Report this sender done with the frame and wait for the round's
    /// feedback, which the host receives and shares.
    pub async fn end_frame(&mut self, id: u32) -> Result<Feedback, VgsError> {
        let outcome = self.complete_frame(id).await;
        let status = match &outcome {
            Ok(feedback) => AckButton::with_feedback(StatusCode::Ok, *feedback),
            Err(e) => AckButton::status(e.status()),
        };
        let shared = self.sync.broadcast(status).await;
        let feedback = outcome.and_then(|_| shared?.check()).map(|ack| ack.feedback.unwrap_or_default());
        let feedback = self.settle(feedback).await?;
        self.feedback = feedback;
        if feedback.is_quit() {
            info!(rank = self.rank(), "quit requested");
        }
        Ok(feedback)
    }

    async fn complete_frame(&mut self, id: u32) -> Result<Feedback, VgsError> {
        match self.windows.get(&id) {
            None => return Err(VgsError::UnknownWindow(id)),
            Some(window) if window.is_atomic() => {
                return Err(VgsError::ProtocolViolation("frame completed inside an atomic sequence"));
            }
            Some(_) => {}
        }
        for (wid, window) in self.windows.iter_mut() {
            if *wid != id && window.has_pending() {
                self.sync.flush(window, false).await?;
            }
        }
        let window = self.windows.get_mut(&id).ok_or(VgsError::UnknownWindow(id))?;
        if !self.sync.mark_complete(window) {
            return Err(VgsError::ProtocolViolation("frame already completed"));
        }
        self.sync.flush(window, false).await?;

        if self.sync.is_host() {
            let ack = self.sync.await_ack().await?;
            Ok(ack.feedback.unwrap_or_default())
        } else {
            Ok(Feedback::neutral())
        }
    }

    /// End the session. Every sender calls this; the host sends the
    /// session-close buffer once everyone has drained, and the relay's final
    /// feedback is shared with all.
    pub async fn finish(mut self) -> Result<Feedback, VgsError> {
        let drained = self.drain().await;
        self.sync.barrier().await;

        let outcome = if self.is_host() {
            let closed = self.close_session().await;
            drained.and(closed)
        } else {
            drained.map(|_| Feedback::neutral())
        };
        let status = match &outcome {
            Ok(feedback) => AckButton::with_feedback(StatusCode::Ok, *feedback),
            Err(e) => AckButton::status(e.status()),
        };
        let shared = self.sync.broadcast(status).await?;
        let feedback = outcome?;
        shared.check()?;
        info!(rank = self.rank(), "session finished");
        Ok(if self.is_host() { feedback } else { shared.feedback.unwrap_or_default() })
    }

    async fn drain(&mut self) -> Result<(), VgsError> {
        for window in self.windows.values_mut() {
            if window.has_pending() {
                self.sync.flush(window, false).await?;
            }
        }
        self.sync.wait_or_poll(true).await?;
        Ok(())
    }

    async fn close_session(&mut self) -> Result<Feedback, VgsError> {
        if self.closed {
            return Ok(self.feedback);
        }
        self.closed = true;
        // A failed drain may leave a reply unread; the relay still answers it.
        if self.sync.pending().is_some() {
            if let Err(e) = self.sync.wait_or_poll(true).await {
                debug!(rank = self.rank(), "unread reply before close: {e}");
            }
        }
        let sealed = SealedBuffer::control(BufferFlags::SESSION_CLOSE)?;
        self.sync.transmit(sealed, true).await?;
        let last = self.sync.await_ack().await?;
        Ok(last.feedback.unwrap_or_default())
    }

    /// On a relay-reported error the host closes the session so the relay
    /// can drain and exit; the error is returned unchanged.
    async fn settle<T>(&mut self, result: Result<T, VgsError>) -> Result<T, VgsError> {
        if let Err(VgsError::RelayReported(code)) = &result {
            warn!(rank = self.rank(), %code, "relay reported an error");
            if self.is_host() && !self.closed {
                if let Err(e) = self.close_session().await {
                    debug!("best-effort close: {e}");
                }
            }
        }
        result
    }

    fn window_mut(&mut self, id: u32) -> Result<&mut Window, VgsError> {
        self.windows.get_mut(&id).ok_or(VgsError::UnknownWindow(id))
    }
}
