use std::fmt;
use std::sync::Arc;

use qrlogin_lib::ValidationCode;
use serde::{Deserialize, Serialize};

use crate::session::LoginSession;

/// Why a login attempt ended in [`ProtocolState::Failed`].
///
/// Every failure after the channel is joined, including key mismatches, is
/// reported as [`RendezvousFailed`](FailureReason::RendezvousFailed).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No camera on this device.
    NoCameraAvailable,
    /// The user refused camera permission.
    NoCameraAccess,
    /// The scanned code is malformed; scanning again may help.
    InvalidQr,
    /// The code uses a protocol version this device does not speak.
    DeviceNotSupported,
    RendezvousFailed,
    /// The partner went silent for longer than the configured timeout.
    TimedOut,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoCameraAvailable => "no camera available",
            Self::NoCameraAccess => "no camera access",
            Self::InvalidQr => "invalid QR code",
            Self::DeviceNotSupported => "device not supported",
            Self::RendezvousFailed => "rendezvous failed",
            Self::TimedOut => "timed out",
        };
        f.write_str(text)
    }
}

/// Position of the login state machine.
#[derive(Clone)]
pub enum ProtocolState {
    Initial,
    Scanning,
    Connecting,
    /// Joined; the user compares this code with the other device.
    WaitingForConfirmation(ValidationCode),
    WaitingForRemoteSignIn,
    Completed {
        session: Arc<dyn LoginSession>,
        trust_established: bool,
    },
    Failed(FailureReason),
}

impl ProtocolState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::WaitingForConfirmation(_) => "waiting_for_confirmation",
            Self::WaitingForRemoteSignIn => "waiting_for_remote_sign_in",
            Self::Completed { .. } => "completed",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed(_))
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Failed(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn validation_code(&self) -> Option<&ValidationCode> {
        match self {
            Self::WaitingForConfirmation(code) => Some(code),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&Arc<dyn LoginSession>> {
        match self {
            Self::Completed { session, .. } => Some(session),
            _ => None,
        }
    }
}

impl fmt::Debug for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForConfirmation(code) => f
                .debug_tuple("WaitingForConfirmation")
                .field(&code.as_str())
                .finish(),
            Self::Completed {
                session,
                trust_established,
            } => f
                .debug_struct("Completed")
                .field("user_id", &session.user_id())
                .field("device_id", &session.device_id())
                .field("trust_established", trust_established)
                .finish(),
            Self::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
            other => f.write_str(other.name()),
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed ({})", reason),
            other => f.write_str(other.name()),
        }
    }
}
