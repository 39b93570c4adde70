//! Relay-side errors.

use thiserror::Error;
use vgs_core::{StatusCode, VgsError};

#[derive(Debug, Error)]
pub enum RelayError {
    /// A protocol-level failure from the shared library.
    #[error(transparent)]
    Protocol(#[from] VgsError),

    /// Socket or filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure that is reported to the senders with `code`.
    #[error("{code}: {detail}")]
    Status { code: StatusCode, detail: String },

    /// A state-machine transition that is not allowed from the current phase.
    #[error("invalid transition: {0}")]
    Transition(&'static str),
}

impl RelayError {
    pub fn status(code: StatusCode, detail: impl Into<String>) -> Self {
        RelayError::Status {
            code,
            detail: detail.into(),
        }
    }

    /// The code a sender would see for this error.
    pub fn code(&self) -> StatusCode {
        match self {
            RelayError::Status { code, .. } => *code,
            RelayError::Protocol(e) => e.status(),
            RelayError::Io(_) => StatusCode::PeerIo,
            RelayError::Transition(_) => StatusCode::UnexpectedMessage,
        }
    }
}
