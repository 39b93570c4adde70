//! # vgs-core
//!
//! Shared protocol library for the vector-graphics stream.
//!
//! This crate contains:
//! - **Wire types**: `CountWord`, `BufferFlags`, `AckButton`, `StartupMessage`, `FrameMarker`
//! - **Encoding**: bit writer/reader, delta coordinate codec, generic integer codec
//! - **Codec**: `EnvelopeCodec` for framed TCP I/O via `tokio_util`
//! - **Network**: `Connection` (sender side) and `RelayPorts` (relay side)
//! - **Client**: windows, buffers and the `Synchronizer` behind the `Sender` API
//! - **Decode**: a reference payload decoder
//! - **Error**: `VgsError` and the wire `StatusCode`

pub mod ack;
pub mod client;
pub mod codec;
pub mod config;
pub mod decode;
pub mod encoding;
pub mod error;
pub mod flags;
pub mod frame;
pub mod handshake;
pub mod header;
pub mod message;
pub mod network;
pub mod packet;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use ack::{AckButton, Feedback, Interrupt, PlaybackMode};
pub use client::{Command, PeerGroup, Sender, Synchronizer, Window, WindowSinks};
pub use codec::EnvelopeCodec;
pub use config::{SessionConfig, SinkSelection};
pub use decode::{DecodedBuffer, Record, StreamDecoder};
pub use encoding::{CoordKind, Precision};
pub use error::{StatusCode, VgsError};
pub use flags::{BufferFlags, DebugFlags};
pub use frame::FrameMarker;
pub use handshake::{Startup, StartupMessage};
pub use header::{CountWord, HEADER_SIZE};
pub use message::{EnvelopeKind, Opcode};
pub use network::{Connection, ConnectionInfo, Inbound, RelayPorts, loopback};
pub use packet::Envelope;
