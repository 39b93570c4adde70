//! # vgs-relay
//!
//! The relay process of the vector-graphics stream.
//!
//! - **Server**: accepts one TCP link per sender rank
//! - **Relay**: acks every buffer, fans payloads out to the metafile and
//!   the rendering peer, and returns frame feedback to the host sender
//! - **Peer**: the rendering-peer handshake and feedback reader
//! - **Sinks**: where the file and peer streams come from

pub mod completion;
pub mod config;
pub mod error;
pub mod peer;
pub mod relay;
pub mod server;
pub mod sinks;
pub mod state;

pub use completion::CompletionCounter;
pub use config::RelayConfig;
pub use error::RelayError;
pub use peer::PeerLink;
pub use relay::{HOST_RANK, Relay, RelayReport};
pub use server::{RelayServer, accept_senders};
pub use sinks::{Sinks, TcpSinks};
pub use state::{PeerHealth, RelayPhase};
