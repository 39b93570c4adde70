//! Relay lifecycle and rendering-peer health.
//!
//! Transitions return `Result` so an out-of-order event surfaces as an
//! error instead of silently corrupting the loop.

use std::fmt;

use crate::error::RelayError;

// ── RelayPhase ───────────────────────────────────────────────────

/// ```text
///  NotStarted ──► AwaitingStartup ──► ConnectingRenderPeer ──► Operational
///                       │                      │                   │
///                       ▼                      ▼                   ▼
///                  Terminated ◄────────────────┴──── Draining ◄────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayPhase {
    #[default]
    NotStarted,
    /// Links are up; waiting for the handshake.
    AwaitingStartup,
    /// Handshake accepted, rendering peer being contacted.
    ConnectingRenderPeer,
    /// Receiving and fanning out buffers.
    Operational,
    /// Session-close seen or fatal error raised; sinks are being closed.
    Draining,
    Terminated,
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NotStarted",
            Self::AwaitingStartup => "AwaitingStartup",
            Self::ConnectingRenderPeer => "ConnectingRenderPeer",
            Self::Operational => "Operational",
            Self::Draining => "Draining",
            Self::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

impl RelayPhase {
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Operational)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Valid from: `NotStarted`.
    pub fn await_startup(&mut self) -> Result<(), RelayError> {
        match self {
            Self::NotStarted => {
                *self = Self::AwaitingStartup;
                Ok(())
            }
            _ => Err(RelayError::Transition("startup already awaited")),
        }
    }

    /// Valid from: `AwaitingStartup`.
    pub fn connect_peer(&mut self) -> Result<(), RelayError> {
        match self {
            Self::AwaitingStartup => {
                *self = Self::ConnectingRenderPeer;
                Ok(())
            }
            _ => Err(RelayError::Transition("peer connect outside startup")),
        }
    }

    /// Valid from: `AwaitingStartup`, `ConnectingRenderPeer`.
    pub fn go_operational(&mut self) -> Result<(), RelayError> {
        match self {
            Self::AwaitingStartup | Self::ConnectingRenderPeer => {
                *self = Self::Operational;
                Ok(())
            }
            _ => Err(RelayError::Transition("not in a startup phase")),
        }
    }

    /// Valid from: `AwaitingStartup`, `ConnectingRenderPeer`, `Operational`.
    pub fn drain(&mut self) -> Result<(), RelayError> {
        match self {
            Self::AwaitingStartup | Self::ConnectingRenderPeer | Self::Operational => {
                *self = Self::Draining;
                Ok(())
            }
            _ => Err(RelayError::Transition("nothing to drain")),
        }
    }

    /// Valid from any phase after `NotStarted`.
    pub fn terminate(&mut self) -> Result<(), RelayError> {
        match self {
            Self::NotStarted => Err(RelayError::Transition("relay never started")),
            _ => {
                *self = Self::Terminated;
                Ok(())
            }
        }
    }
}

// ── PeerHealth ───────────────────────────────────────────────────

/// Rendering-peer sink state. Once dead it stays dead for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerHealth {
    #[default]
    NotEstablished,
    Operational,
    Dead,
}

impl fmt::Display for PeerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotEstablished => "not established",
            Self::Operational => "operational",
            Self::Dead => "dead",
        };
        f.write_str(name)
    }
}

impl PeerHealth {
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Operational)
    }

    /// Valid from: `NotEstablished`.
    pub fn establish(&mut self) -> Result<(), RelayError> {
        match self {
            Self::NotEstablished => {
                *self = Self::Operational;
                Ok(())
            }
            _ => Err(RelayError::Transition("peer already established")),
        }
    }

    pub fn mark_dead(&mut self) {
        *self = Self::Dead;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_with_peer() {
        let mut phase = RelayPhase::default();
        phase.await_startup().unwrap();
        phase.connect_peer().unwrap();
        phase.go_operational().unwrap();
        assert!(phase.is_operational());
        phase.drain().unwrap();
        phase.terminate().unwrap();
        assert!(phase.is_terminated());
    }

    #[test]
    fn abort_terminates_from_startup() {
        let mut phase = RelayPhase::default();
        phase.await_startup().unwrap();
        phase.terminate().unwrap();
        assert_eq!(phase, RelayPhase::Terminated);
    }

    #[test]
    fn invalid_transitions() {
        let mut phase = RelayPhase::default();
        assert!(phase.go_operational().is_err());
        assert!(phase.terminate().is_err());
        phase.await_startup().unwrap();
        assert!(phase.await_startup().is_err());

        let mut phase = RelayPhase::Operational;
        assert!(phase.connect_peer().is_err());
        let mut phase = RelayPhase::Draining;
        assert!(phase.drain().is_err());
    }

    #[test]
    fn dead_peer_cannot_come_back() {
        let mut health = PeerHealth::default();
        assert!(!health.is_alive());
        health.establish().unwrap();
        assert!(health.is_alive());
        health.mark_dead();
        assert!(health.establish().is_err());
        assert_eq!(health.to_string(), "dead");
    }
}
