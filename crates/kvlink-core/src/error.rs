//! Command errors.
//!
//! Every error a command can hit is a `CommandError`. The dispatcher turns it
//! into a failure envelope using its `Display` text and `status_code`.

/// Transport status for failures the caller could have avoided.
pub const PRECONDITION_FAILED: u16 = 400;

/// Transport status for everything else, including backend errors.
pub const DEFAULT_STATUS: u16 = 200;

const UNKNOWN_COMMAND: u16 = 404;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The backend could not be reached.
    #[error("{0}")]
    Connection(String),
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("connection in progress")]
    ConnectInProgress,
    /// A required parameter was absent from every declared source.
    #[error("expecting {what} in {location}")]
    MissingParameter { what: String, location: String },
    #[error("invalid '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    /// The backend rejected an otherwise well-formed operation.
    #[error("{0}")]
    Backend(String),
    #[error("key not found")]
    KeyNotFound,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl CommandError {
    pub fn missing(what: impl Into<String>, location: impl Into<String>) -> Self {
        Self::MissingParameter {
            what: what.into(),
            location: location.into(),
        }
    }

    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Transport status code carried by the failure envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotConnected
            | Self::AlreadyConnected
            | Self::ConnectInProgress
            | Self::MissingParameter { .. }
            | Self::InvalidParameter { .. } => PRECONDITION_FAILED,
            Self::UnknownCommand(_) => UNKNOWN_COMMAND,
            Self::Connection(_) | Self::Backend(_) | Self::KeyNotFound => DEFAULT_STATUS,
        }
    }
}
