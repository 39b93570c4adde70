//! Session configuration shared by every sender of a run.
//!
//! Built once at startup and passed by reference to each sender; it never
//! changes during a run.

use serde::{Deserialize, Serialize};

use crate::encoding::coord::Precision;
use crate::error::VgsError;
use crate::flags::DebugFlags;
use crate::handshake::{PROTOCOL_VERSION, StartupMessage};
use crate::header::{HEADER_SIZE, MAX_PAYLOAD_LEN};

/// Which sinks the relay should feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSelection {
    pub file: bool,
    pub peer: bool,
}

impl Default for SinkSelection {
    fn default() -> Self {
        Self {
            file: true,
            peer: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Buffer capacity in bytes, CountWord included.
    pub buffer_len: usize,
    pub precision: Precision,
    /// Raw debug mask; see [`DebugFlags`].
    pub debug_mask: u32,
    pub sinks: SinkSelection,
    /// Rendering peer address (`host:port`).
    pub display: String,
    /// Metafile name, resolved by the relay.
    pub file: String,
    pub title: String,
    pub icon: String,
    pub mode: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_len: 4092,
            precision: Precision::default(),
            debug_mask: 0,
            sinks: SinkSelection::default(),
            display: "127.0.0.1:7400".into(),
            file: "vgs.meta".into(),
            title: "vgs".into(),
            icon: "vgs".into(),
            mode: 0,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), VgsError> {
        self.precision.validate()?;
        if self.buffer_len <= HEADER_SIZE {
            return Err(VgsError::field(
                "buffer_len",
                format!("{} leaves no room after the header", self.buffer_len),
            ));
        }
        if self.payload_capacity() > MAX_PAYLOAD_LEN {
            return Err(VgsError::field("buffer_len", "exceeds the CountWord length field"));
        }
        Ok(())
    }

    /// Payload bytes a buffer may carry.
    pub fn payload_capacity(&self) -> usize {
        self.buffer_len.saturating_sub(HEADER_SIZE)
    }

    pub fn debug(&self) -> DebugFlags {
        DebugFlags::from_bits_truncate(self.debug_mask)
    }

    pub fn to_startup(&self, senders: u32) -> StartupMessage {
        StartupMessage {
            want_file: self.sinks.file,
            want_peer: self.sinks.peer,
            senders,
            display: self.display.clone(),
            file: self.file.clone(),
            title: self.title.clone(),
            icon: self.icon.clone(),
            buffer_len: self.buffer_len,
            mode: self.mode,
            precision: self.precision,
            version: PROTOCOL_VERSION.into(),
            debug: self.debug(),
        }
    }
}
