//! Login code model and validation.
//!
//! The code shown by the already signed-in device is a small JSON document:
//!
//! ```json
//! {
//!   "intent": "login.reciprocate",
//!   "flow": "SETUP_ADDITIONAL_DEVICE_V1",
//!   "rendezvous": {
//!     "algorithm": "org.matrix.msc3903.rendezvous.v2.curve25519-aes-sha256",
//!     "key": "<base64 x25519 public key>",
//!     "transport": { "type": "http.v1", "uri": "https://relay.example.org/abc" }
//!   }
//! }
//! ```
//!
//! Validation separates two kinds of rejection. An unknown transport type,
//! algorithm or flow means the two devices speak different protocol versions
//! and rescanning cannot help ([`CodeError::Unsupported`]). Anything else that
//! is wrong with the document is treated as a bad scan ([`CodeError::Malformed`]).

use serde::{Deserialize, Serialize};
use url::Url;

use crate::channel::{decode_base64, encode_base64, RendezvousAlgorithm, PUBLIC_KEY_LENGTH};

/// Intent announced by a device that offers to sign a new device in.
pub const LOGIN_RECIPROCATE_INTENT: &str = "login.reciprocate";

/// Flow identifier of the additional-device handshake variant.
pub const SETUP_ADDITIONAL_DEVICE_V1: &str = "SETUP_ADDITIONAL_DEVICE_V1";

/// Errors produced while decoding or validating a scanned login code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("malformed login code: {0}")]
    Malformed(String),
    #[error("unsupported {what}: {value}")]
    Unsupported { what: &'static str, value: String },
}

impl CodeError {
    /// True when the code is well formed but uses a protocol this build does
    /// not implement.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

/// Rendezvous transports this build can talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// HTTP relay with ETag-based long polling.
    HttpV1,
}

impl TransportKind {
    /// Canonical type string.
    pub const HTTP_V1: &'static str = "http.v1";

    /// Namespaced type string used by older relays and clients.
    pub const HTTP_V1_NAMESPACED: &'static str = "org.matrix.msc3886.http.v1";

    /// Resolve a transport type string.
    pub fn from_type(value: &str) -> Option<Self> {
        match value {
            Self::HTTP_V1 | Self::HTTP_V1_NAMESPACED => Some(Self::HttpV1),
            _ => None,
        }
    }

    /// Type string written into generated codes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpV1 => Self::HTTP_V1,
        }
    }
}

/// The two handshake variants announced by the code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoginFlow {
    /// No flow announced.
    #[default]
    Default,
    /// `SETUP_ADDITIONAL_DEVICE_V1`.
    SetupAdditionalDeviceV1,
}

impl LoginFlow {
    /// Resolve an optional flow identifier.
    pub fn from_id(value: Option<&str>) -> Option<Self> {
        match value {
            None => Some(Self::Default),
            Some(SETUP_ADDITIONAL_DEVICE_V1) => Some(Self::SetupAdditionalDeviceV1),
            Some(_) => None,
        }
    }

    /// Identifier written into generated codes, if any.
    pub fn id(&self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::SetupAdditionalDeviceV1 => Some(SETUP_ADDITIONAL_DEVICE_V1),
        }
    }
}

/// Decoded, not yet validated login code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedLoginCode {
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    pub rendezvous: RendezvousDetails,
}

/// `rendezvous` section of a login code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendezvousDetails {
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub transport: TransportDetails,
}

/// `rendezvous.transport` section of a login code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDetails {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Where and how to meet the partner device. Immutable once joined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendezvousDescriptor {
    pub transport: TransportKind,
    pub uri: Url,
    pub algorithm: RendezvousAlgorithm,
    /// The partner's ephemeral X25519 public key.
    pub partner_key: [u8; PUBLIC_KEY_LENGTH],
}

/// A login code that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedLoginCode {
    pub flow: LoginFlow,
    pub descriptor: RendezvousDescriptor,
}

impl ScannedLoginCode {
    /// Build the code a reciprocating device renders for the given channel.
    pub fn reciprocate(
        flow: LoginFlow,
        transport: TransportKind,
        uri: &Url,
        algorithm: RendezvousAlgorithm,
        public_key: &[u8; PUBLIC_KEY_LENGTH],
    ) -> Self {
        Self {
            intent: LOGIN_RECIPROCATE_INTENT.to_string(),
            flow: flow.id().map(str::to_string),
            rendezvous: RendezvousDetails {
                algorithm: algorithm.as_str().to_string(),
                key: Some(encode_base64(public_key)),
                transport: TransportDetails {
                    kind: transport.as_str().to_string(),
                    uri: Some(uri.to_string()),
                },
            },
        }
    }

    /// Decode the raw scanned bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodeError> {
        serde_json::from_slice(bytes).map_err(|e| CodeError::malformed(e.to_string()))
    }

    /// Encode the code for rendering.
    pub fn to_json(&self) -> Result<Vec<u8>, CodeError> {
        serde_json::to_vec(self).map_err(|e| CodeError::malformed(e.to_string()))
    }

    /// Validate the code.
    ///
    /// Compatibility (transport type, algorithm, flow) is checked before
    /// structure so that a code from a newer peer is reported as unsupported
    /// even if its other fields look unfamiliar too.
    pub fn validate(&self) -> Result<ValidatedLoginCode, CodeError> {
        let transport = TransportKind::from_type(&self.rendezvous.transport.kind).ok_or_else(
            || CodeError::Unsupported {
                what: "transport",
                value: self.rendezvous.transport.kind.clone(),
            },
        )?;
        let algorithm = RendezvousAlgorithm::from_id(&self.rendezvous.algorithm).ok_or_else(
            || CodeError::Unsupported {
                what: "algorithm",
                value: self.rendezvous.algorithm.clone(),
            },
        )?;
        let flow = LoginFlow::from_id(self.flow.as_deref()).ok_or_else(|| {
            CodeError::Unsupported {
                what: "flow",
                value: self.flow.clone().unwrap_or_default(),
            }
        })?;

        if self.intent != LOGIN_RECIPROCATE_INTENT {
            return Err(CodeError::malformed(format!(
                "unexpected intent {:?}",
                self.intent
            )));
        }

        let raw_uri = self
            .rendezvous
            .transport
            .uri
            .as_deref()
            .ok_or_else(|| CodeError::malformed("missing rendezvous uri"))?;
        let uri = Url::parse(raw_uri)
            .map_err(|e| CodeError::malformed(format!("invalid rendezvous uri: {}", e)))?;
        if !matches!(uri.scheme(), "http" | "https") {
            return Err(CodeError::malformed(format!(
                "rendezvous uri must be http(s), got {}",
                uri.scheme()
            )));
        }

        let raw_key = self
            .rendezvous
            .key
            .as_deref()
            .ok_or_else(|| CodeError::malformed("missing rendezvous key"))?;
        let key_bytes = decode_base64(raw_key)
            .map_err(|_| CodeError::malformed("rendezvous key is not valid base64"))?;
        let partner_key: [u8; PUBLIC_KEY_LENGTH] = key_bytes.as_slice().try_into().map_err(|_| {
            CodeError::malformed(format!(
                "rendezvous key must be {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                key_bytes.len()
            ))
        })?;

        Ok(ValidatedLoginCode {
            flow,
            descriptor: RendezvousDescriptor {
                transport,
                uri,
                algorithm,
                partner_key,
            },
        })
    }
}

/// Decode and validate scanned bytes in one step.
pub fn parse_login_code(bytes: &[u8]) -> Result<ValidatedLoginCode, CodeError> {
    ScannedLoginCode::from_slice(bytes)?.validate()
}
