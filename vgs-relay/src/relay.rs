//! The relay's receive loop.
//!
//! One task owns every sink. For each buffer it first acks the sender with
//! the error state left by the previous message, then writes the payload
//! to the metafile and the rendering peer, counts frame completions, and
//! answers the host once every sender has finished the frame.

use std::collections::{HashMap, VecDeque};

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use vgs_core::frame::patch_frame_index;
use vgs_core::handshake::PROTOCOL_VERSION;
use vgs_core::{
    AckButton, BufferFlags, CountWord, DebugFlags, Envelope, EnvelopeKind, Feedback, FrameMarker,
    HEADER_SIZE, Inbound, RelayPorts, StatusCode, Startup, StartupMessage,
};

use crate::completion::CompletionCounter;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::peer::PeerLink;
use crate::sinks::Sinks;
use crate::state::{PeerHealth, RelayPhase};

/// Rank that receives frame feedback and closes the session.
pub const HOST_RANK: u32 = 0;

/// What a finished run looked like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// First nonzero code raised, or `Ok`.
    pub status: StatusCode,
    /// The session was aborted before any output.
    pub aborted: bool,
    pub buffers: u64,
    /// Completed frame rounds.
    pub frames: u64,
    pub file_bytes: u64,
    pub peer_bytes: u64,
    pub peer_health: PeerHealth,
}

impl RelayReport {
    /// Process exit status: the reason code of the first error, 0 if none.
    pub fn exit_code(&self) -> i32 {
        self.status as i32
    }
}

/// Frame indices of one window, kept separately per sink.
#[derive(Debug, Clone, Copy, Default)]
struct WindowFrames {
    seen: u32,
    file: u32,
    peer: u32,
}

pub struct Relay<S: Sinks> {
    ports: RelayPorts,
    sinks: S,
    frame_stride: u32,
    phase: RelayPhase,
    debug: DebugFlags,
    /// Largest payload a buffer may declare.
    capacity: usize,
    file: Option<S::File>,
    peer: Option<PeerLink<S::Peer>>,
    completion: CompletionCounter,
    sticky: StatusCode,
    pinned: Option<u32>,
    backlog: VecDeque<Inbound>,
    windows: HashMap<u32, WindowFrames>,
    /// The current frame goes to the rendering peer.
    peer_in_frame: bool,
    /// The peer was sent a record it must answer with feedback.
    peer_owes_feedback: bool,
    /// The host reported completion and waits for the round's feedback.
    host_waiting: bool,
    scratch: BytesMut,
    report: RelayReport,
}

impl<S: Sinks> Relay<S> {
    pub fn new(ports: RelayPorts, sinks: S, config: &RelayConfig) -> Self {
        let senders = ports.senders();
        Self {
            ports,
            sinks,
            frame_stride: config.frame_stride(),
            phase: RelayPhase::default(),
            debug: DebugFlags::empty(),
            capacity: 0,
            file: None,
            peer: None,
            completion: CompletionCounter::new(senders),
            sticky: StatusCode::Ok,
            pinned: None,
            backlog: VecDeque::new(),
            windows: HashMap::new(),
            peer_in_frame: true,
            peer_owes_feedback: false,
            host_waiting: false,
            scratch: BytesMut::new(),
            report: RelayReport::default(),
        }
    }

    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    /// Serve one session from handshake to close.
    pub async fn run(mut self) -> Result<RelayReport, RelayError> {
        self.phase.await_startup()?;
        if self.startup().await? {
            while let Some(inbound) = self.next_inbound().await {
                match self.phase {
                    RelayPhase::Operational => self.on_message(inbound).await?,
                    RelayPhase::Draining => self.on_drain_message(inbound).await?,
                    _ => break,
                }
                if self.phase.is_terminated() {
                    break;
                }
            }
        }

        if !self.phase.is_terminated() {
            if self.phase.is_operational() {
                warn!("every sender link closed before session-close");
            }
            self.close_file().await;
            self.close_peer().await;
            self.phase.terminate()?;
        }

        self.report.peer_health = self.peer.as_ref().map(PeerLink::health).unwrap_or_default();
        self.report.peer_bytes = self.peer.as_ref().map_or(0, PeerLink::bytes_written);
        info!(
            status = %self.report.status,
            frames = self.report.frames,
            buffers = self.report.buffers,
            file_bytes = self.report.file_bytes,
            peer_bytes = self.report.peer_bytes,
            peer = %self.report.peer_health,
            "relay finished"
        );
        Ok(self.report)
    }

    // ── Startup ──────────────────────────────────────────────────

    /// `Ok(false)` when the session ends during startup.
    async fn startup(&mut self) -> Result<bool, RelayError> {
        let Some(inbound) = self.ports.recv().await else {
            warn!("sender links closed before the handshake");
            return Ok(false);
        };
        let rank = inbound.rank;
        if inbound.envelope.kind() != EnvelopeKind::Startup {
            return self
                .refuse(rank, StatusCode::UnexpectedMessage, "expected the startup handshake")
                .await;
        }

        let msg = match Startup::decode(inbound.envelope.body()) {
            Ok(Startup::Abort) => {
                info!("session aborted before any output");
                self.reply(rank, AckButton::default()).await;
                self.report.aborted = true;
                return Ok(false);
            }
            Ok(Startup::Begin(msg)) => msg,
            Err(e) => return self.refuse(rank, StatusCode::BadHandshake, e.to_string()).await,
        };
        if let Err(e) = self.accept(&msg) {
            return self.refuse(rank, e.code(), e.to_string()).await;
        }

        if msg.want_file {
            match self.sinks.open_file(&msg.file).await {
                Ok(file) => self.file = Some(file),
                Err(e) => return self.refuse(rank, StatusCode::FileOpen, e.to_string()).await,
            }
        }
        self.reply(rank, AckButton::default()).await;

        if msg.want_peer {
            self.phase.connect_peer()?;
            let linked = match self.sinks.connect_peer(&msg.display).await {
                Ok(stream) => PeerLink::handshake(stream, &msg).await,
                Err(e) => Err(RelayError::status(StatusCode::PeerConnect, e.to_string())),
            };
            match linked {
                Ok(link) => self.peer = Some(link),
                Err(e) => return self.refuse(rank, e.code(), e.to_string()).await,
            }
            self.reply(rank, AckButton::default()).await;
        }

        self.phase.go_operational()?;
        info!(
            senders = msg.senders,
            file = msg.want_file,
            peer = msg.want_peer,
            buffer_len = msg.buffer_len,
            "session started"
        );
        Ok(true)
    }

    fn accept(&mut self, msg: &StartupMessage) -> Result<(), RelayError> {
        if msg.version != PROTOCOL_VERSION {
            return Err(RelayError::status(
                StatusCode::BadHandshake,
                format!("version {:?}, expected {PROTOCOL_VERSION:?}", msg.version),
            ));
        }
        if msg.senders != self.ports.senders() {
            return Err(RelayError::status(
                StatusCode::GroupMismatch,
                format!("{} senders announced, {} connected", msg.senders, self.ports.senders()),
            ));
        }
        if msg.buffer_len <= HEADER_SIZE {
            return Err(RelayError::status(StatusCode::BadHandshake, "buffer length too small"));
        }
        self.capacity = msg.buffer_len - HEADER_SIZE;
        self.debug = msg.debug;
        Ok(())
    }

    async fn refuse(
        &mut self,
        rank: u32,
        code: StatusCode,
        detail: impl Into<String>,
    ) -> Result<bool, RelayError> {
        let detail: String = detail.into();
        error!(%code, "startup failed: {detail}");
        self.close_file().await;
        self.report.status = code;
        self.reply(rank, AckButton::status(code)).await;
        Ok(false)
    }

    // ── Receive loop ─────────────────────────────────────────────

    /// Next message to serve; while an atomic sequence is pinned, only its
    /// sender's messages are taken and the rest wait in the backlog.
    async fn next_inbound(&mut self) -> Option<Inbound> {
        let Some(rank) = self.pinned else {
            return match self.backlog.pop_front() {
                Some(inbound) => Some(inbound),
                None => self.ports.recv().await,
            };
        };
        if let Some(pos) = self.backlog.iter().position(|m| m.rank == rank) {
            return self.backlog.remove(pos);
        }
        loop {
            let inbound = self.ports.recv().await?;
            if inbound.rank == rank {
                return Some(inbound);
            }
            self.backlog.push_back(inbound);
        }
    }

    async fn on_message(&mut self, inbound: Inbound) -> Result<(), RelayError> {
        let rank = inbound.rank;
        self.reply(rank, AckButton::status(self.sticky)).await;
        if !self.sticky.is_ok() {
            self.enter_fatal_drain().await?;
            return self.drain_message(rank, &inbound.envelope).await;
        }

        if inbound.envelope.kind() != EnvelopeKind::Buffer {
            self.raise(StatusCode::UnexpectedMessage, format!("{} after startup", inbound.envelope.kind()));
            return Ok(());
        }
        let (header, payload) = match inbound.envelope.as_buffer() {
            Ok(parts) => parts,
            Err(e) => {
                self.raise(StatusCode::Oversized, e.to_string());
                return Ok(());
            }
        };

        self.report.buffers += 1;
        if self.debug.contains(DebugFlags::TRACE_BUFFERS) {
            debug!(rank, len = header.len(), flags = ?header.flags(), "buffer");
        }
        if header.contains(BufferFlags::FIRST_BUFFER) {
            debug!(rank, "first buffer from sender");
        }

        if header.len() > self.capacity {
            self.raise(
                StatusCode::Oversized,
                format!("{} byte payload exceeds {}", header.len(), self.capacity),
            );
        } else {
            self.route(header, &payload).await?;
        }
        // An owed answer is read by the round or close reply, not held.
        if !self.peer_owes_feedback {
            self.poll_peer();
        }

        if header.contains(BufferFlags::ATOMIC_CONTINUE) {
            if self.pinned.is_none() {
                debug!(rank, "atomic sequence pinned");
            }
            self.pinned = Some(rank);
        } else if self.pinned == Some(rank) {
            debug!(rank, "atomic sequence released");
            self.pinned = None;
        }

        if header.contains(BufferFlags::FRAME_COMPLETE) {
            self.on_frame_complete(rank).await;
        }
        if header.contains(BufferFlags::SESSION_CLOSE) {
            self.close_session(rank).await?;
        }
        Ok(())
    }

    /// Write one buffer to whichever sinks should get it, patching the
    /// frame marker per sink.
    async fn route(&mut self, header: CountWord, payload: &Bytes) -> Result<(), RelayError> {
        let marker = FrameMarker::detect(payload);
        if let Some(marker) = marker {
            let frames = self.windows.entry(marker.window).or_default();
            self.peer_in_frame = frames.seen % self.frame_stride == 0;
            frames.seen += 1;
        }

        let closing = header.contains(BufferFlags::SESSION_CLOSE);
        let completing = header.contains(BufferFlags::FRAME_COMPLETE) && self.completion.next_completes();
        let to_file = self.file.is_some() && !header.contains(BufferFlags::SKIP_FILE);
        let to_peer = self.peer.as_ref().is_some_and(PeerLink::is_alive)
            && !header.contains(BufferFlags::SKIP_PEER)
            && (self.peer_in_frame || closing);
        let routed = header.with_routing(!to_file, !to_peer);

        self.scratch.clear();
        self.scratch.extend_from_slice(payload);

        if to_file {
            if let Some(marker) = marker {
                let frames = self.windows.entry(marker.window).or_default();
                frames.file += 1;
                patch_frame_index(&mut self.scratch, frames.file)?;
            }
            self.write_file(routed).await;
        }

        if to_peer {
            if let Some(marker) = marker {
                let frames = self.windows.entry(marker.window).or_default();
                frames.peer += 1;
                patch_frame_index(&mut self.scratch, frames.peer)?;
            }
            // The peer answers every completion it sees, so it only sees the
            // one that closes the round.
            let mut flags = routed.flags();
            if !completing {
                flags.remove(BufferFlags::FRAME_COMPLETE);
            }
            let peer_header = CountWord::new(routed.len(), flags)?;
            if let Some(peer) = self.peer.as_mut() {
                match peer.write_record(peer_header, &self.scratch).await {
                    Ok(()) => {
                        if (completing || closing) && peer.is_alive() {
                            self.peer_owes_feedback = true;
                        }
                    }
                    Err(e) => self.raise(e.code(), e.to_string()),
                }
            }
        }
        Ok(())
    }

    async fn write_file(&mut self, header: CountWord) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let payload = &self.scratch;
        let result = async {
            file.write_all(&header.to_bytes()).await?;
            file.write_all(payload).await
        }
        .await;
        match result {
            Ok(()) => self.report.file_bytes += (HEADER_SIZE + self.scratch.len()) as u64,
            Err(e) => self.raise(StatusCode::FileWrite, e.to_string()),
        }
    }

    fn poll_peer(&mut self) {
        let Some(peer) = self.peer.as_mut() else {
            return;
        };
        if let Err(e) = peer.poll() {
            self.raise(e.code(), e.to_string());
        }
    }

    async fn on_frame_complete(&mut self, rank: u32) {
        if rank == HOST_RANK {
            self.host_waiting = true;
        }
        match self.completion.record() {
            Err(e) => self.raise(e.code(), e.to_string()),
            Ok(false) => {
                if self.debug.contains(DebugFlags::TRACE_FRAMES) {
                    debug!(rank, count = self.completion.count(), "frame complete");
                }
            }
            Ok(true) => {
                let feedback = self.collect_feedback().await;
                self.report.frames += 1;
                self.host_waiting = false;
                if self.debug.contains(DebugFlags::TRACE_FRAMES) {
                    debug!(round = self.completion.rounds(), ?feedback, "frame round closed");
                }
                self.reply(HOST_RANK, AckButton::with_feedback(self.sticky, feedback)).await;
            }
        }
    }

    /// Feedback for a frame reply: the peer's answer if it owes one, else
    /// neutral, merged with anything it sent unprompted.
    async fn collect_feedback(&mut self) -> Feedback {
        let owes = std::mem::take(&mut self.peer_owes_feedback);
        let Some(peer) = self.peer.as_mut() else {
            return Feedback::neutral();
        };
        let held = peer.take_held();
        let fresh = if owes { peer.next_feedback().await } else { Ok(None) };
        let feedback = match fresh {
            Ok(fresh) => fresh.unwrap_or_else(Feedback::neutral),
            Err(e) => {
                self.raise(e.code(), e.to_string());
                Feedback::neutral()
            }
        };
        match held {
            Some(earlier) => feedback.merge(&earlier),
            None => feedback,
        }
    }

    async fn close_session(&mut self, rank: u32) -> Result<(), RelayError> {
        self.phase.drain()?;
        self.close_file().await;
        let feedback = self.collect_feedback().await;
        self.reply(rank, AckButton::with_feedback(self.sticky, feedback)).await;
        self.close_peer().await;
        self.phase.terminate()?;
        info!(rank, "session closed");
        Ok(())
    }

    // ── Fatal drain ──────────────────────────────────────────────

    /// Record the first error of the run. It goes out on the next ack.
    fn raise(&mut self, code: StatusCode, detail: String) {
        if self.sticky.is_ok() {
            error!(%code, "{detail}");
            self.sticky = code;
            self.report.status = code;
        } else {
            debug!(%code, "further error while failing: {detail}");
        }
    }

    async fn enter_fatal_drain(&mut self) -> Result<(), RelayError> {
        warn!(code = %self.sticky, "draining after fatal error");
        self.phase.drain()?;
        self.pinned = None;
        self.close_file().await;
        self.close_peer().await;
        if self.host_waiting {
            self.host_waiting = false;
            self.reply(HOST_RANK, AckButton::with_feedback(self.sticky, Feedback::neutral()))
                .await;
        }
        Ok(())
    }

    async fn on_drain_message(&mut self, inbound: Inbound) -> Result<(), RelayError> {
        self.reply(inbound.rank, AckButton::status(self.sticky)).await;
        self.drain_message(inbound.rank, &inbound.envelope).await
    }

    async fn drain_message(&mut self, rank: u32, envelope: &Envelope) -> Result<(), RelayError> {
        let closing = envelope
            .as_buffer()
            .is_ok_and(|(header, _)| header.contains(BufferFlags::SESSION_CLOSE));
        if closing {
            self.reply(rank, AckButton::with_feedback(self.sticky, Feedback::neutral())).await;
            self.phase.terminate()?;
            info!(rank, code = %self.sticky, "session closed after error");
        }
        Ok(())
    }

    // ── Sinks and links ──────────────────────────────────────────

    async fn close_file(&mut self) {
        let Some(mut file) = self.file.take() else {
            return;
        };
        let result = async {
            file.flush().await?;
            file.shutdown().await
        }
        .await;
        if let Err(e) = result {
            self.raise(StatusCode::FileWrite, e.to_string());
        }
    }

    async fn close_peer(&mut self) {
        if let Some(peer) = self.peer.as_mut() {
            peer.shutdown().await;
        }
    }

    async fn reply(&mut self, rank: u32, ack: AckButton) {
        if self.debug.contains(DebugFlags::TRACE_ACKS) {
            debug!(rank, code = %ack.code, feedback = ack.feedback.is_some(), "ack");
        }
        if let Err(e) = self.ports.send_to(rank, Envelope::ack(&ack)).await {
            warn!(rank, "cannot reply: {e}");
        }
    }
}
