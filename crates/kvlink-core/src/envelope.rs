//! Uniform command results.

use crate::codec;
use crate::error::{CommandError, DEFAULT_STATUS};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result discriminator understood by the host (0 = success, 1 = failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::Failure => 1,
        }
    }
}

/// The outcome of one command invocation.
///
/// A success keeps the structured value so in-process callers can inspect
/// it; the wire form is normalized by [`Envelope::to_wire`].
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success { value: Value },
    Failure { error: String, code: u16 },
}

impl Envelope {
    pub fn success(value: impl Into<Value>) -> Self {
        Envelope::Success {
            value: value.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::failure_with_code(message, DEFAULT_STATUS)
    }

    pub fn failure_with_code(message: impl Into<String>, code: u16) -> Self {
        Envelope::Failure {
            error: message.into(),
            code,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Envelope::Success { .. } => Status::Success,
            Envelope::Failure { .. } => Status::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == Status::Success
    }

    /// The success value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Envelope::Success { value } => Some(value),
            Envelope::Failure { .. } => None,
        }
    }

    /// The failure message, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Envelope::Success { .. } => None,
            Envelope::Failure { error, .. } => Some(error),
        }
    }

    /// Transport status code to send alongside the body.
    pub fn status_code(&self) -> u16 {
        match self {
            Envelope::Success { .. } => DEFAULT_STATUS,
            Envelope::Failure { code, .. } => *code,
        }
    }

    pub fn to_wire(&self) -> WireEnvelope {
        match self {
            Envelope::Success { value } => WireEnvelope {
                status: Status::Success.code(),
                value: Some(codec::normalize(value)),
                error: None,
            },
            Envelope::Failure { error, .. } => WireEnvelope {
                status: Status::Failure.code(),
                value: None,
                error: Some(error.clone()),
            },
        }
    }
}

impl From<CommandError> for Envelope {
    fn from(err: CommandError) -> Self {
        Envelope::failure_with_code(err.to_string(), err.status_code())
    }
}

/// JSON body written to the transport.
///
/// `{"status":0,"value":...}` or `{"status":1,"error":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub status: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
