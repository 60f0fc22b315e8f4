use std::io;

use crate::exception::{
    Fault, InvalidDataError, InvalidOperationError, KeyNotFoundError, RemoteError,
};

/// Errors returned by client-side calls and ambient accessors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RpcError {
    /// Malformed header, message id mismatch, or a broken multi-part
    /// exchange. Fatal to the current call.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl RpcError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation { message: message.into() }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    /// Converts into a handler failure, so a handler can propagate errors
    /// from nested calls. Remote errors keep their rebuilt type.
    pub fn into_fault(self) -> Fault {
        match self {
            Self::Remote(remote) => remote.into_exception(),
            Self::Protocol { message } => InvalidDataError::new(message).into(),
            Self::Session(SessionError::KeyNotFound { key }) => {
                KeyNotFoundError::new(format!("session key not found: {key}")).into()
            }
            other => InvalidOperationError::new(other.to_string()).into(),
        }
    }
}

impl From<RpcError> for Fault {
    fn from(error: RpcError) -> Self {
        error.into_fault()
    }
}

impl From<SessionError> for Fault {
    fn from(error: SessionError) -> Self {
        RpcError::Session(error).into_fault()
    }
}

/// Failure of the underlying byte transport; passed through untouched.
#[derive(Debug, thiserror::Error)]
#[error("transport error: {source}")]
pub struct TransportError {
    #[from]
    source: io::Error,
}

impl TransportError {
    pub fn new(kind: io::ErrorKind, message: impl Into<String>) -> Self {
        Self { source: io::Error::new(kind, message.into()) }
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }

    pub fn into_io(self) -> io::Error {
        self.source
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("sessions are disabled")]
    Disabled,

    #[error("session is closed")]
    Closed,

    #[error("session key not found: {key}")]
    KeyNotFound { key: String },

    #[error("session key already present: {key}")]
    DuplicateKey { key: String },

    #[error("session value has a different type: {key}")]
    TypeMismatch { key: String },
}
