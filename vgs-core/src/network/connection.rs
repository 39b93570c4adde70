//! Message links between senders and the relay.
//!
//! Both ends talk through `mpsc` channels; for TCP a background reader and
//! writer task pump [`Envelope`]s between the channels and a framed
//! socket. The in-process variant wires the channels directly, which keeps
//! the relay loop and the sender synchroniser transport-agnostic.

use std::fmt;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::codec::EnvelopeCodec;
use crate::error::VgsError;
use crate::packet::Envelope;

const CHANNEL_DEPTH: usize = 64;

// ── Connection (sender side) ─────────────────────────────────────

/// A sender's link to the relay.
#[derive(Debug)]
pub struct Connection {
    // Channel to the background writer (or straight to the relay inbox)
    tx: mpsc::Sender<Envelope>,
    // Channel from the background reader (or straight from the relay)
    rx: mpsc::Receiver<Envelope>,
}

impl Connection {
    /// Wrap a connected socket and spawn its reader and writer tasks.
    pub fn new<T>(stream: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut net_writer, mut net_reader) = Framed::new(stream, EnvelopeCodec).split();

        // User -> Network
        let (user_tx, mut network_rx) = mpsc::channel::<Envelope>(CHANNEL_DEPTH);

        // Network -> User
        let (network_tx, user_rx) = mpsc::channel(CHANNEL_DEPTH);

        tokio::spawn(async move {
            while let Some(envelope) = network_rx.recv().await {
                if let Err(e) = net_writer.send(envelope).await {
                    warn!("relay link write error: {e}");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(envelope) => {
                        if network_tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("relay link read error: {e}");
                        break;
                    }
                }
            }
        });

        Self {
            tx: user_tx,
            rx: user_rx,
        }
    }

    /// Connect to the relay and introduce this sender.
    pub async fn connect(info: &ConnectionInfo, rank: u32, group_size: u32) -> Result<Self, VgsError> {
        let stream = TcpStream::connect(info.to_string()).await?;
        stream.set_nodelay(true)?;
        let conn = Self::new(stream);
        conn.send(Envelope::hello(rank, group_size)).await?;
        debug!(rank, "connected to relay at {info}");
        Ok(conn)
    }

    pub async fn send(&self, envelope: Envelope) -> Result<(), VgsError> {
        self.tx.send(envelope).await.map_err(VgsError::from)
    }

    /// Wait for the next envelope; `None` once the relay side is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Take an envelope if one already arrived.
    pub fn try_recv(&mut self) -> Result<Option<Envelope>, VgsError> {
        match self.rx.try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(VgsError::ChannelClosed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    ip: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

// ── RelayPorts (relay side) ──────────────────────────────────────

/// One envelope received by the relay, tagged with its sender.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub rank: u32,
    pub envelope: Envelope,
}

/// The relay's view of every sender link: one shared inbox and one
/// outbox per rank.
#[derive(Debug)]
pub struct RelayPorts {
    inbox: mpsc::Receiver<Inbound>,
    inbox_tx: Option<mpsc::Sender<Inbound>>,
    outboxes: Vec<Option<mpsc::Sender<Envelope>>>,
}

impl RelayPorts {
    pub fn new(senders: u32) -> Self {
        let (inbox_tx, inbox) = mpsc::channel(CHANNEL_DEPTH);
        Self {
            inbox,
            inbox_tx: Some(inbox_tx),
            outboxes: (0..senders).map(|_| None).collect(),
        }
    }

    pub fn senders(&self) -> u32 {
        self.outboxes.len() as u32
    }

    fn claim(&mut self, rank: u32) -> Result<mpsc::Sender<Inbound>, VgsError> {
        let slot = self
            .outboxes
            .get(rank as usize)
            .ok_or(VgsError::ProtocolViolation("sender rank out of range"))?;
        if slot.is_some() {
            return Err(VgsError::ProtocolViolation("sender rank already attached"));
        }
        self.inbox_tx.clone().ok_or(VgsError::ChannelClosed)
    }

    /// Attach an in-process sender and return its end of the link.
    pub fn attach_channel(&mut self, rank: u32) -> Result<Connection, VgsError> {
        let inbox_tx = self.claim(rank)?;
        let (to_sender, from_relay) = mpsc::channel(CHANNEL_DEPTH);
        let (to_relay, mut from_sender) = mpsc::channel::<Envelope>(CHANNEL_DEPTH);

        tokio::spawn(async move {
            while let Some(envelope) = from_sender.recv().await {
                if inbox_tx.send(Inbound { rank, envelope }).await.is_err() {
                    break;
                }
            }
        });

        self.outboxes[rank as usize] = Some(to_sender);
        Ok(Connection {
            tx: to_relay,
            rx: from_relay,
        })
    }

    /// Attach a framed socket whose `Hello` has already been consumed.
    pub fn attach_framed<T>(
        &mut self,
        rank: u32,
        framed: Framed<T, EnvelopeCodec>,
    ) -> Result<(), VgsError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let inbox_tx = self.claim(rank)?;
        let (mut net_writer, mut net_reader) = framed.split();
        let (to_sender, mut outbox) = mpsc::channel::<Envelope>(CHANNEL_DEPTH);

        tokio::spawn(async move {
            while let Some(envelope) = outbox.recv().await {
                if let Err(e) = net_writer.send(envelope).await {
                    warn!(rank, "sender link write error: {e}");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(envelope) => {
                        if inbox_tx.send(Inbound { rank, envelope }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(rank, "sender link read error: {e}");
                        break;
                    }
                }
            }
            debug!(rank, "sender link closed");
        });

        self.outboxes[rank as usize] = Some(to_sender);
        Ok(())
    }

    /// `true` once every rank has a link.
    pub fn is_complete(&self) -> bool {
        self.outboxes.iter().all(Option::is_some)
    }

    /// Stop accepting new links so the inbox closes when every sender has
    /// gone away.
    pub fn seal(&mut self) {
        self.inbox_tx = None;
    }

    pub async fn recv(&mut self) -> Option<Inbound> {
        self.inbox.recv().await
    }

    pub async fn send_to(&self, rank: u32, envelope: Envelope) -> Result<(), VgsError> {
        let outbox = self
            .outboxes
            .get(rank as usize)
            .and_then(Option::as_ref)
            .ok_or(VgsError::ProtocolViolation("no link for sender rank"))?;
        outbox.send(envelope).await.map_err(VgsError::from)
    }
}

/// In-process links for `senders` ranks, already sealed.
pub fn loopback(senders: u32) -> Result<(Vec<Connection>, RelayPorts), VgsError> {
    let mut ports = RelayPorts::new(senders);
    let conns = (0..senders)
        .map(|rank| ports.attach_channel(rank))
        .collect::<Result<Vec<_>, _>>()?;
    ports.seal();
    Ok((conns, ports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::AckButton;
    use crate::error::StatusCode;

    #[tokio::test]
    async fn loopback_tags_inbound_with_rank() {
        let (conns, mut ports) = loopback(2).unwrap();
        conns[1].send(Envelope::hello(1, 2)).await.unwrap();
        let inbound = ports.recv().await.unwrap();
        assert_eq!(inbound.rank, 1);
        assert_eq!(inbound.envelope.as_hello().unwrap(), (1, 2));
    }

    #[tokio::test]
    async fn relay_replies_reach_the_right_sender() {
        let (mut conns, ports) = loopback(2).unwrap();
        ports
            .send_to(0, Envelope::ack(&AckButton::status(StatusCode::PeerIo)))
            .await
            .unwrap();
        assert!(conns[1].try_recv().unwrap().is_none());
        let env = conns[0].recv().await.unwrap();
        assert_eq!(env.as_ack().unwrap().code, StatusCode::PeerIo);
    }

    #[tokio::test]
    async fn inbox_closes_when_every_sender_drops() {
        let (conns, mut ports) = loopback(3).unwrap();
        drop(conns);
        assert!(ports.recv().await.is_none());
    }

    #[test]
    fn duplicate_rank_is_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut ports = RelayPorts::new(1);
            assert!(ports.attach_channel(0).is_ok());
            assert!(ports.attach_channel(0).is_err());
            assert!(ports.attach_channel(5).is_err());
        });
    }
}
