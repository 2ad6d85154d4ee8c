//! Error types for transport operations.
//!
//! This module defines the errors a serial transport can report: the line
//! going away, driver failures and invalid port settings.

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to the controller board.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Port is not open or has been unplugged.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Driver reported a communication failure.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Port settings were rejected.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<serialport::Error> for HardwareError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => Self::disconnected(err.description),
            serialport::ErrorKind::InvalidInput => Self::configuration(err.description),
            serialport::ErrorKind::Io(kind) => {
                Self::Io(std::io::Error::new(kind, err.description))
            }
            serialport::ErrorKind::Unknown => Self::communication(err.description),
        }
    }
}

impl From<HardwareError> for vmlink_core::Error {
    fn from(err: HardwareError) -> Self {
        vmlink_core::Error::Transport(err.to_string())
    }
}
