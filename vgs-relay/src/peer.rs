//! Adapter for the rendering peer.
//!
//! After a text handshake the peer receives CountWord + payload records
//! and answers with 12-byte feedback records. It may also push an error
//! string starting with [`ERROR_SENTINEL`] at any time. A peer that hangs
//! up is not an error for the run: the link is marked dead and the relay
//! carries on with the file sink alone.

use std::io;

use bytes::{Buf, BytesMut};
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use vgs_core::ack::FEEDBACK_SIZE;
use vgs_core::{CountWord, Feedback, StartupMessage, StatusCode};

use crate::error::RelayError;
use crate::state::PeerHealth;

pub const PEER_PROTOCOL: &str = "VGSPEER/1";

/// Handshake reply byte meaning success (`-1` as a signed byte).
pub const PEER_OK: u8 = 0xFF;

/// Prefix of an in-band error message.
pub const ERROR_SENTINEL: &[u8] = b"VGSERR:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Feedback(Feedback),
    Error(String),
}

pub fn handshake_text(msg: &StartupMessage) -> String {
    format!(
        "{PEER_PROTOCOL} display={} title={} icon={} buffer={} lci={} lcf={}",
        msg.display, msg.title, msg.icon, msg.buffer_len, msg.precision.lci, msg.precision.lcf
    )
}

/// Whether an I/O error means the peer went away rather than broke.
fn is_hangup(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

#[derive(Debug)]
pub struct PeerLink<S> {
    stream: S,
    health: PeerHealth,
    inbuf: BytesMut,
    /// Unsolicited feedback, merged into the next frame reply.
    held: Option<Feedback>,
    bytes_written: u64,
}

impl<S> PeerLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send the peer handshake and wait for its one-byte verdict.
    pub async fn handshake(mut stream: S, msg: &StartupMessage) -> Result<Self, RelayError> {
        let connect_err = |e: io::Error| RelayError::status(StatusCode::PeerConnect, e.to_string());

        let mut text = handshake_text(msg).into_bytes();
        text.push(0);
        stream.write_all(&text).await.map_err(connect_err)?;
        stream.flush().await.map_err(connect_err)?;

        let reply = stream.read_u8().await.map_err(connect_err)?;
        if reply != PEER_OK {
            return Err(RelayError::status(
                StatusCode::PeerRejected,
                format!("peer answered {reply:#04x}"),
            ));
        }

        let mut health = PeerHealth::default();
        health.establish()?;
        info!("rendering peer accepted the session");
        Ok(Self {
            stream,
            health,
            inbuf: BytesMut::with_capacity(256),
            held: None,
            bytes_written: 0,
        })
    }

    pub fn health(&self) -> PeerHealth {
        self.health
    }

    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn take_held(&mut self) -> Option<Feedback> {
        self.held.take()
    }

    /// Forward one record. Writes to a dead peer are dropped.
    pub async fn write_record(&mut self, header: CountWord, payload: &[u8]) -> Result<(), RelayError> {
        if !self.is_alive() {
            return Ok(());
        }
        let result = async {
            self.stream.write_all(&header.to_bytes()).await?;
            self.stream.write_all(payload).await?;
            self.stream.flush().await
        }
        .await;
        match result {
            Ok(()) => {
                self.bytes_written += (header.to_bytes().len() + payload.len()) as u64;
                Ok(())
            }
            Err(e) => self.on_io_error(e),
        }
    }

    /// Block until the peer sends feedback. `None` if it hung up instead.
    pub async fn next_feedback(&mut self) -> Result<Option<Feedback>, RelayError> {
        loop {
            match self.parse()? {
                Some(PeerEvent::Feedback(feedback)) => return Ok(Some(feedback)),
                Some(PeerEvent::Error(text)) => return Err(reported(text)),
                None => {}
            }
            if !self.is_alive() {
                return Ok(None);
            }
            match self.stream.read_buf(&mut self.inbuf).await {
                Ok(0) => {
                    self.hang_up("end of stream");
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => {
                    self.on_io_error(e)?;
                    return Ok(None);
                }
            }
        }
    }

    /// Take whatever the peer already sent without waiting. Feedback is
    /// held for the next frame reply; error text is returned as an error.
    pub fn poll(&mut self) -> Result<(), RelayError> {
        loop {
            while let Some(event) = self.parse()? {
                match event {
                    PeerEvent::Feedback(feedback) => {
                        debug!(?feedback, "unsolicited peer feedback");
                        let merged = match self.held {
                            Some(earlier) => feedback.merge(&earlier),
                            None => feedback,
                        };
                        self.held = Some(merged);
                    }
                    PeerEvent::Error(text) => return Err(reported(text)),
                }
            }
            if !self.is_alive() {
                return Ok(());
            }
            match self.stream.read_buf(&mut self.inbuf).now_or_never() {
                None => return Ok(()),
                Some(Ok(0)) => {
                    self.hang_up("end of stream");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return self.on_io_error(e),
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if self.is_alive() {
            if let Err(e) = self.stream.shutdown().await {
                debug!("peer shutdown: {e}");
            }
        }
    }

    fn on_io_error(&mut self, e: io::Error) -> Result<(), RelayError> {
        if is_hangup(e.kind()) {
            self.hang_up(&e.to_string());
            Ok(())
        } else {
            Err(RelayError::status(StatusCode::PeerIo, e.to_string()))
        }
    }

    fn hang_up(&mut self, why: &str) {
        if self.is_alive() {
            warn!("rendering peer gone ({why}); continuing with the file only");
        }
        self.health.mark_dead();
    }

    /// Split one complete event off the input buffer.
    fn parse(&mut self) -> Result<Option<PeerEvent>, RelayError> {
        let Some(&first) = self.inbuf.first() else {
            return Ok(None);
        };
        if first == ERROR_SENTINEL[0] {
            let seen = self.inbuf.len().min(ERROR_SENTINEL.len());
            if self.inbuf[..seen] != ERROR_SENTINEL[..seen] {
                return Err(RelayError::status(StatusCode::PeerIo, "garbage from rendering peer"));
            }
            return Ok(self.take_error_text().map(PeerEvent::Error));
        }
        if self.inbuf.len() < FEEDBACK_SIZE {
            return Ok(None);
        }
        let feedback = Feedback::decode(&self.inbuf[..FEEDBACK_SIZE])?;
        self.inbuf.advance(FEEDBACK_SIZE);
        Ok(Some(PeerEvent::Feedback(feedback)))
    }

    /// Error text runs to a NUL or CRLF.
    fn take_error_text(&mut self) -> Option<String> {
        let body = self.inbuf.get(ERROR_SENTINEL.len()..)?;
        let (end, terminator) = body.iter().enumerate().find_map(|(i, &b)| match b {
            0 => Some((i, 1)),
            b'\r' if body.get(i + 1) == Some(&b'\n') => Some((i, 2)),
            _ => None,
        })?;
        let text = String::from_utf8_lossy(&body[..end]).trim().to_string();
        self.inbuf.advance(ERROR_SENTINEL.len() + end + terminator);
        Some(text)
    }
}

fn reported(text: String) -> RelayError {
    warn!("rendering peer error: {text}");
    RelayError::status(StatusCode::PeerReported, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::{DuplexStream, ReadBuf, duplex};
    use vgs_core::{BufferFlags, Interrupt, SessionConfig};

    fn startup() -> StartupMessage {
        SessionConfig::default().to_startup(1)
    }

    async fn greet(mut peer_end: DuplexStream) -> DuplexStream {
        let mut hello = Vec::new();
        loop {
            let b = peer_end.read_u8().await.unwrap();
            if b == 0 {
                break;
            }
            hello.push(b);
        }
        assert!(String::from_utf8(hello).unwrap().starts_with(PEER_PROTOCOL));
        peer_end.write_u8(PEER_OK).await.unwrap();
        peer_end
    }

    async fn connected() -> (PeerLink<DuplexStream>, DuplexStream) {
        let (relay_end, peer_end) = duplex(4096);
        let peer = tokio::spawn(greet(peer_end));
        let link = PeerLink::handshake(relay_end, &startup()).await.unwrap();
        (link, peer.await.unwrap())
    }

    /// Reads fail with a connection reset once `armed` is set.
    struct Resetting {
        inner: DuplexStream,
        armed: Arc<AtomicBool>,
    }

    impl AsyncRead for Resetting {
        fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            if self.armed.load(Ordering::SeqCst) {
                return Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()));
            }
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for Resetting {
        fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, data)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    async fn resetting() -> (PeerLink<Resetting>, Arc<AtomicBool>, DuplexStream) {
        let (relay_end, peer_end) = duplex(4096);
        let armed = Arc::new(AtomicBool::new(false));
        let stream = Resetting {
            inner: relay_end,
            armed: armed.clone(),
        };
        let peer = tokio::spawn(greet(peer_end));
        let link = PeerLink::handshake(stream, &startup()).await.unwrap();
        (link, armed, peer.await.unwrap())
    }

    #[tokio::test]
    async fn rejected_handshake() {
        let (relay_end, mut peer_end) = duplex(4096);
        tokio::spawn(async move {
            let mut sink = [0u8; 256];
            let _ = peer_end.read(&mut sink).await;
            peer_end.write_u8(0x01).await.unwrap();
        });
        let err = PeerLink::handshake(relay_end, &startup()).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::PeerRejected);
    }

    #[tokio::test]
    async fn records_reach_the_peer_and_feedback_comes_back() {
        let (mut link, mut peer) = connected().await;
        let header = CountWord::new(3, BufferFlags::FRAME_COMPLETE).unwrap();
        link.write_record(header, b"abc").await.unwrap();

        let mut got = [0u8; 7];
        peer.read_exact(&mut got).await.unwrap();
        assert_eq!(&got[..4], &header.to_bytes());
        assert_eq!(&got[4..], b"abc");

        let fb = Feedback {
            frame: 12,
            ..Feedback::neutral()
        };
        peer.write_all(&fb.encode()).await.unwrap();
        assert_eq!(link.next_feedback().await.unwrap(), Some(fb));
        assert_eq!(link.bytes_written(), 7);
    }

    #[tokio::test]
    async fn polled_interrupt_is_held() {
        let (mut link, mut peer) = connected().await;
        let fb = Feedback {
            interrupt: Interrupt::Interrupt,
            ..Feedback::neutral()
        };
        peer.write_all(&fb.encode()).await.unwrap();
        tokio::task::yield_now().await;
        link.poll().unwrap();
        assert_eq!(link.take_held(), Some(fb));
        assert_eq!(link.take_held(), None);
    }

    #[tokio::test]
    async fn error_text_is_surfaced() {
        let (mut link, mut peer) = connected().await;
        peer.write_all(b"VGSERR: display closed\r\n").await.unwrap();
        let err = link.next_feedback().await.unwrap_err();
        assert_eq!(err.code(), StatusCode::PeerReported);
        assert!(err.to_string().contains("display closed"));
    }

    #[tokio::test]
    async fn hangup_marks_the_peer_dead() {
        let (mut link, peer) = connected().await;
        drop(peer);
        assert_eq!(link.next_feedback().await.unwrap(), None);
        assert_eq!(link.health(), PeerHealth::Dead);

        // Further writes are dropped silently.
        let header = CountWord::new(1, BufferFlags::empty()).unwrap();
        link.write_record(header, b"x").await.unwrap();
        assert_eq!(link.bytes_written(), 0);
    }

    #[tokio::test]
    async fn write_to_closed_peer_is_not_fatal() {
        let (mut link, peer) = connected().await;
        drop(peer);
        let header = CountWord::new(1, BufferFlags::empty()).unwrap();
        link.write_record(header, b"x").await.unwrap();
        assert!(!link.is_alive());
    }

    #[tokio::test]
    async fn reset_while_waiting_for_feedback_marks_the_peer_dead() {
        let (mut link, armed, _peer) = resetting().await;
        let header = CountWord::new(1, BufferFlags::FRAME_COMPLETE).unwrap();
        link.write_record(header, b"x").await.unwrap();
        armed.store(true, Ordering::SeqCst);

        assert_eq!(link.next_feedback().await.unwrap(), None);
        assert_eq!(link.health(), PeerHealth::Dead);
        link.write_record(header, b"y").await.unwrap();
        assert_eq!(link.bytes_written(), 5);
    }

    #[tokio::test]
    async fn reset_seen_by_poll_is_not_fatal() {
        let (mut link, armed, _peer) = resetting().await;
        armed.store(true, Ordering::SeqCst);

        assert!(link.poll().is_ok());
        assert!(!link.is_alive());
        assert_eq!(link.take_held(), None);
    }
}
