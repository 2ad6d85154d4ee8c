use thiserror::Error;

use crate::types::ControlState;

#[derive(Error, Debug)]
pub enum Error {
    // Caller usage errors
    #[error("Operation rejected while controller is {state}")]
    Rejected { state: ControlState },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Protocol errors
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unknown remote command code: {code}")]
    UnknownRemoteCommand { code: String },

    // Hardware errors
    #[error("Transport error: {0}")]
    Transport(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Runtime errors
    #[error("Link service stopped")]
    ServiceStopped,
}

impl Error {
    /// Returns `true` if this is a [`Error::Rejected`] caller-usage error.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::Rejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
