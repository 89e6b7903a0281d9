//! Error types for rendezvous operations.
//!
//! Every failure of the rendezvous layer is terminal for the login attempt that
//! hit it; nothing here is retried internally. The variants stay fine-grained so
//! callers can log precise diagnostics even when they only surface a coarse
//! outcome to the user.

use std::fmt;

use crate::channel::ChannelError;

/// Error codes for FFI and mobile integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RendezvousErrorCode {
    /// Transport/network layer error
    Transport = 2000,
    /// Connection to the relay failed
    ConnectionFailed = 2001,
    /// Relay request or receive timed out
    Timeout = 2002,
    /// Rendezvous resource no longer exists on the relay
    Expired = 2003,
    /// Concurrent write detected by the relay
    Conflict = 2004,
    /// No channel has been joined yet
    NotJoined = 3000,
    /// Channel key agreement or encryption failed
    Channel = 3001,
    /// Invalid request/data
    InvalidData = 5000,
    /// Serialization error
    Serialization = 5002,
    /// Algorithm or transport not supported
    Unsupported = 6000,
    /// Internal/unexpected error
    Internal = 9999,
}

/// Error type for rendezvous transport, channel and service operations.
#[derive(Debug)]
pub enum RendezvousError {
    /// Transport/network layer error.
    Transport(String),

    /// Connection to the relay failed.
    ConnectionFailed {
        /// Target URL
        target: String,
        /// Underlying error message
        reason: String,
    },

    /// A relay request or receive timed out.
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The rendezvous resource is gone (deleted or expired server-side).
    Expired(String),

    /// The relay rejected a write because the resource changed underneath us.
    Conflict(String),

    /// Operation requires a joined channel.
    NotJoined,

    /// Key agreement, encryption or decryption failed.
    Channel(ChannelError),

    /// Invalid data received or provided.
    InvalidData {
        /// Field or parameter name
        field: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Serialization/deserialization error.
    Serialization(String),

    /// Transport type or algorithm is not supported.
    Unsupported(String),

    /// Internal/unexpected error.
    Internal(String),
}

impl RendezvousError {
    /// Get the error code for FFI/mobile integration.
    pub fn code(&self) -> RendezvousErrorCode {
        match self {
            Self::Transport(_) => RendezvousErrorCode::Transport,
            Self::ConnectionFailed { .. } => RendezvousErrorCode::ConnectionFailed,
            Self::Timeout { .. } => RendezvousErrorCode::Timeout,
            Self::Expired(_) => RendezvousErrorCode::Expired,
            Self::Conflict(_) => RendezvousErrorCode::Conflict,
            Self::NotJoined => RendezvousErrorCode::NotJoined,
            Self::Channel(_) => RendezvousErrorCode::Channel,
            Self::InvalidData { .. } => RendezvousErrorCode::InvalidData,
            Self::Serialization(_) => RendezvousErrorCode::Serialization,
            Self::Unsupported(_) => RendezvousErrorCode::Unsupported,
            Self::Internal(_) => RendezvousErrorCode::Internal,
        }
    }

    /// Get the error message as an owned String (useful for FFI).
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns true for relay request timeouts and bounded receives that expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Create a transport error from any error type.
    pub fn transport<E: std::error::Error>(err: E) -> Self {
        Self::Transport(err.to_string())
    }

    /// Create an invalid data error.
    pub fn invalid_data(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RendezvousError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::ConnectionFailed { target, reason } => {
                write!(f, "connection to {} failed: {}", target, reason)
            }
            Self::Timeout {
                operation,
                timeout_ms,
            } => {
                write!(f, "{} timed out after {}ms", operation, timeout_ms)
            }
            Self::Expired(uri) => write!(f, "rendezvous {} has expired", uri),
            Self::Conflict(uri) => write!(f, "rendezvous {} was modified concurrently", uri),
            Self::NotJoined => write!(f, "no rendezvous channel has been joined"),
            Self::Channel(err) => write!(f, "channel error: {}", err),
            Self::InvalidData { field, reason } => {
                write!(f, "invalid {}: {}", field, reason)
            }
            Self::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Self::Unsupported(what) => write!(f, "not supported: {}", what),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for RendezvousError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Channel(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RendezvousError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<ChannelError> for RendezvousError {
    fn from(err: ChannelError) -> Self {
        Self::Channel(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = RendezvousError::Timeout {
            operation: "receive".to_string(),
            timeout_ms: 1000,
        };
        assert_eq!(err.code(), RendezvousErrorCode::Timeout);
        assert!(err.is_timeout());
        assert!(!RendezvousError::NotJoined.is_timeout());
    }

    #[test]
    fn test_error_display() {
        let err = RendezvousError::Expired("https://relay.example/abc".to_string());
        assert!(err.to_string().contains("expired"));
        assert!(err.to_string().contains("relay.example"));

        let err = RendezvousError::Channel(ChannelError::DecryptFailed);
        assert!(err.to_string().starts_with("channel error"));
    }

    #[test]
    fn test_helper_constructors() {
        let err = RendezvousError::invalid_data("key", "wrong length");
        assert_eq!(err.code(), RendezvousErrorCode::InvalidData);
        assert_eq!(err.to_string(), "invalid key: wrong length");
    }
}
