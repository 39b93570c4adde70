//! Coordination among the senders of one run.
//!
//! Senders that share a process share a [`PeerGroup`]: a reusable barrier
//! plus a one-slot mailbox the host fills for `broadcast`.

use std::sync::Arc;

use tokio::sync::{Barrier, Mutex};

use crate::ack::AckButton;
use crate::error::VgsError;

#[derive(Debug)]
struct Shared {
    size: usize,
    barrier: Barrier,
    slot: Mutex<Option<AckButton>>,
}

#[derive(Debug, Clone)]
pub struct PeerGroup {
    shared: Arc<Shared>,
}

impl PeerGroup {
    pub fn new(size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                size,
                barrier: Barrier::new(size.max(1)),
                slot: Mutex::new(None),
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Returns once every member has called it.
    pub async fn barrier(&self) {
        self.shared.barrier.wait().await;
    }

    /// Every member calls this; the root passes `Some`, the rest `None`,
    /// and all of them get the root's value back.
    pub async fn broadcast(&self, value: Option<AckButton>) -> Result<AckButton, VgsError> {
        if let Some(value) = value {
            *self.shared.slot.lock().await = Some(value);
        }
        self.shared.barrier.wait().await;
        let value = *self.shared.slot.lock().await;
        // Nobody may overwrite the slot until everyone has read it.
        self.shared.barrier.wait().await;
        value.ok_or(VgsError::ProtocolViolation("broadcast without a root value"))
    }
}
