//! The message exchanged at every step of the login handshake.
//!
//! One flat shape covers all steps; each step fills only the fields it needs.
//! Absent fields are omitted on the wire.

use serde::{Deserialize, Serialize};

use crate::{LoginError, Result};

/// The only login protocol this crate speaks.
pub const LOGIN_TOKEN_PROTOCOL: &str = "login_token";

/// Message-type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadType {
    #[serde(rename = "m.login.progress")]
    Progress,
    #[serde(rename = "m.login.protocol")]
    Protocol,
    #[serde(rename = "m.login.success")]
    Success,
    #[serde(rename = "m.login.finish")]
    Finish,
    #[serde(rename = "m.login.protocols")]
    Protocols,
}

impl PayloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progress => "m.login.progress",
            Self::Protocol => "m.login.protocol",
            Self::Success => "m.login.success",
            Self::Finish => "m.login.finish",
            Self::Protocols => "m.login.protocols",
        }
    }
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Declined,
    Verified,
}

/// A handshake message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolPayload {
    #[serde(rename = "type")]
    pub kind: PayloadType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homeserver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Base64 Ed25519 key of `device_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_device_key: Option<String>,
    /// The sender's current cross-signing master key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key: Option<String>,
}

impl ProtocolPayload {
    /// An otherwise empty message of the given type.
    pub fn new(kind: PayloadType) -> Self {
        Self {
            kind,
            protocol: None,
            protocols: None,
            outcome: None,
            login_token: None,
            homeserver: None,
            device_id: None,
            device_key: None,
            verifying_device_id: None,
            verifying_device_key: None,
            master_key: None,
        }
    }

    /// Offer of supported protocols.
    pub fn protocols(kind: PayloadType, protocols: Vec<String>) -> Self {
        Self {
            protocols: Some(protocols),
            ..Self::new(kind)
        }
    }

    /// Choice of one protocol.
    pub fn protocol(kind: PayloadType, protocol: impl Into<String>) -> Self {
        Self {
            protocol: Some(protocol.into()),
            ..Self::new(kind)
        }
    }

    pub fn login_token(
        kind: PayloadType,
        login_token: impl Into<String>,
        homeserver: impl Into<String>,
    ) -> Self {
        Self {
            login_token: Some(login_token.into()),
            homeserver: Some(homeserver.into()),
            ..Self::new(kind)
        }
    }

    /// Announcement of the freshly signed-in device.
    pub fn device_confirmation(
        kind: PayloadType,
        device_id: impl Into<String>,
        device_key: impl Into<String>,
    ) -> Self {
        Self {
            outcome: Some(Outcome::Success),
            device_id: Some(device_id.into()),
            device_key: Some(device_key.into()),
            ..Self::new(kind)
        }
    }

    /// Sent when the user abandons the login.
    pub fn declined() -> Self {
        Self {
            outcome: Some(Outcome::Declined),
            ..Self::new(PayloadType::Finish)
        }
    }

    pub fn is_declined(&self) -> bool {
        self.kind == PayloadType::Finish && self.outcome == Some(Outcome::Declined)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(LoginError::MalformedPayload)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(LoginError::MalformedPayload)
    }
}

/// Borrow a field the current step cannot do without.
pub fn require<'a, T: ?Sized>(value: Option<&'a T>, field: &'static str) -> Result<&'a T> {
    value.ok_or(LoginError::MissingField(field))
}
