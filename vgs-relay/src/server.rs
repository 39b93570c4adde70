//! TCP front end: gathers one link per sender rank, then runs the relay.

use futures::StreamExt;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tracing::{info, warn};
use vgs_core::{EnvelopeCodec, RelayPorts};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::relay::{Relay, RelayReport};
use crate::sinks::TcpSinks;

/// Accept connections until every rank in `0..senders` has introduced
/// itself. Links with a bad or duplicate introduction are dropped.
pub async fn accept_senders(listener: &TcpListener, senders: u32) -> Result<RelayPorts, RelayError> {
    let mut ports = RelayPorts::new(senders);
    while !ports.is_complete() {
        let (stream, addr) = listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("{addr}: cannot disable nagle: {e}");
        }
        let mut framed = Framed::new(stream, EnvelopeCodec);

        let hello = match framed.next().await {
            Some(Ok(envelope)) => envelope,
            Some(Err(e)) => {
                warn!("{addr}: unreadable introduction: {e}");
                continue;
            }
            None => {
                warn!("{addr}: closed before introducing itself");
                continue;
            }
        };
        let (rank, group) = match hello.as_hello() {
            Ok(pair) => pair,
            Err(e) => {
                warn!("{addr}: {e}");
                continue;
            }
        };
        if group != senders {
            warn!(rank, group, senders, "{addr}: group size mismatch");
            continue;
        }
        match ports.attach_framed(rank, framed) {
            Ok(()) => info!(rank, "sender connected from {addr}"),
            Err(e) => warn!(rank, "{addr}: {e}"),
        }
    }
    ports.seal();
    Ok(ports)
}

/// Binds the configured address and serves a single session.
pub struct RelayServer {
    config: RelayConfig,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<RelayReport, RelayError> {
        let listener = TcpListener::bind(&self.config.network.listen).await?;
        info!("relay listening on {}", listener.local_addr()?);
        self.run_on(listener).await
    }

    /// Serve one session on an already bound listener.
    pub async fn run_on(&self, listener: TcpListener) -> Result<RelayReport, RelayError> {
        let senders = self.config.network.senders;
        let ports = accept_senders(&listener, senders).await?;
        info!(senders, "all senders connected");
        drop(listener);

        let relay = Relay::new(ports, TcpSinks::new(&self.config), &self.config);
        relay.run().await
    }
}
