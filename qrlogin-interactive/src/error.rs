use qrlogin_lib::{CodeError, RendezvousError};

use crate::events::AttemptId;
use crate::payload::Outcome;
use crate::state::FailureReason;

/// Result type for login operations.
pub type Result<T> = std::result::Result<T, LoginError>;

/// Internal diagnostics for a failed login attempt.
///
/// Observers only ever see the coarser [`FailureReason`]; this type keeps the
/// detail for logs and tests.
#[derive(thiserror::Error, Debug)]
pub enum LoginError {
    #[error("camera unavailable")]
    CameraUnavailable,
    #[error("camera access denied")]
    CameraAccessDenied,
    #[error(transparent)]
    Code(#[from] CodeError),
    #[error("failed to join rendezvous: {0}")]
    Join(#[source] RendezvousError),
    #[error("rendezvous error: {0}")]
    Rendezvous(#[from] RendezvousError),
    #[error("partner sent nothing for {timeout_ms}ms")]
    ReceiveTimedOut { timeout_ms: u64 },
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("partner does not offer login_token (offered {0:?})")]
    UnsupportedProtocols(Vec<String>),
    #[error("unexpected outcome {0:?}")]
    UnexpectedOutcome(Option<Outcome>),
    #[error("partner declined the login")]
    PartnerDeclined,
    #[error("login token exchange failed: {0}")]
    TokenExchange(String),
    #[error("session bootstrap failed: {0}")]
    Bootstrap(String),
    #[error("crypto store error: {0}")]
    CryptoStore(String),
    #[error("partner echoed a different {0} for this device")]
    EchoMismatch(&'static str),
    #[error("asserted master key does not match the local one")]
    MasterKeyMismatch,
    #[error("verifying device {0} is not known locally")]
    UnknownDevice(String),
    #[error("verifying device {0} key does not match its local fingerprint")]
    DeviceKeyMismatch(String),
    #[error("attempt {0} was reset")]
    Stale(AttemptId),
}

impl LoginError {
    /// The externally visible reason this error is reported as.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::CameraUnavailable => FailureReason::NoCameraAvailable,
            Self::CameraAccessDenied => FailureReason::NoCameraAccess,
            Self::Code(e) if e.is_unsupported() => FailureReason::DeviceNotSupported,
            Self::Code(_) => FailureReason::InvalidQr,
            Self::ReceiveTimedOut { .. } => FailureReason::TimedOut,
            _ => FailureReason::RendezvousFailed,
        }
    }

    /// True for the trust checks that guard against a spoofed partner.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            Self::EchoMismatch(_)
                | Self::MasterKeyMismatch
                | Self::UnknownDevice(_)
                | Self::DeviceKeyMismatch(_)
        )
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_errors_keep_their_distinction() {
        let unsupported = LoginError::from(CodeError::Unsupported {
            what: "algorithm",
            value: "unknown-v9".to_string(),
        });
        assert_eq!(unsupported.failure_reason(), FailureReason::DeviceNotSupported);

        let malformed = LoginError::from(CodeError::Malformed("missing uri".to_string()));
        assert_eq!(malformed.failure_reason(), FailureReason::InvalidQr);
    }

    #[test]
    fn test_security_failures_collapse_to_rendezvous_failed() {
        for err in [
            LoginError::MasterKeyMismatch,
            LoginError::DeviceKeyMismatch("OLD".to_string()),
            LoginError::UnknownDevice("OLD".to_string()),
        ] {
            assert!(err.is_security_failure());
            assert_eq!(err.failure_reason(), FailureReason::RendezvousFailed);
        }
        assert!(!LoginError::PartnerDeclined.is_security_failure());
    }

    #[test]
    fn test_timeout_reason() {
        let err = LoginError::ReceiveTimedOut { timeout_ms: 1000 };
        assert_eq!(err.failure_reason(), FailureReason::TimedOut);
        assert_eq!(
            LoginError::Rendezvous(RendezvousError::NotJoined).failure_reason(),
            FailureReason::RendezvousFailed
        );
    }
}
