//! Rendezvous channel cryptography.
//!
//! The channel is negotiated from the scanned code: the code carries the
//! reciprocating device's ephemeral X25519 key, the joining device answers
//! with its own key in the clear, and both sides then derive the same AES key
//! and validation code. Every later message is sealed with AES-256-GCM.

mod ecdh;

use std::fmt;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

pub use ecdh::{ChannelRole, EphemeralKeyPair, EstablishedChannel};

/// Length of an X25519 public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Channel errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Key agreement failed: {0}")]
    KeyAgreement(String),
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Encryption failed: {0}")]
    EncryptFailed(String),
    #[error("Decryption failed")]
    DecryptFailed,
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
}

/// Key agreement and encryption schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RendezvousAlgorithm {
    /// X25519 ECDH, HKDF-SHA256, AES-256-GCM.
    EcdhV2,
}

impl RendezvousAlgorithm {
    pub const ECDH_V2: &'static str = "org.matrix.msc3903.rendezvous.v2.curve25519-aes-sha256";

    /// Resolve an algorithm identifier from a scanned code.
    pub fn from_id(value: &str) -> Option<Self> {
        match value {
            Self::ECDH_V2 => Some(Self::EcdhV2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EcdhV2 => Self::ECDH_V2,
        }
    }
}

impl fmt::Display for RendezvousAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short human-comparable code derived from the channel key material.
///
/// Rendered as three four-digit groups, e.g. `"4521 1093 7780"`. Both devices
/// display it; a mismatch means someone else is on the channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationCode(String);

impl ValidationCode {
    /// Render five bytes of key material as decimal groups.
    ///
    /// Each group is a 13-bit slice of the input plus 1000, so every group has
    /// exactly four digits.
    pub fn from_bytes(bytes: [u8; 5]) -> Self {
        let b: [u16; 5] = bytes.map(u16::from);
        let first = (b[0] << 5 | b[1] >> 3) + 1000;
        let second = ((b[1] & 0x07) << 10 | b[2] << 2 | b[3] >> 6) + 1000;
        let third = ((b[3] & 0x3f) << 7 | b[4] >> 1) + 1000;
        Self(format!("{} {} {}", first, second, third))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// First message on a fresh channel, sent unencrypted by the joining device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinMessage {
    pub algorithm: String,
    pub key: String,
}

/// Encode bytes as unpadded standard base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD_NO_PAD.encode(bytes)
}

/// Decode standard base64, with or without padding.
pub fn decode_base64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD_NO_PAD.decode(value.trim_end_matches('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_code_shape() {
        let code = ValidationCode::from_bytes([0, 0, 0, 0, 0]);
        assert_eq!(code.as_str(), "1000 1000 1000");

        let code = ValidationCode::from_bytes([0xff; 5]);
        assert_eq!(code.as_str(), "9191 9191 9191");
    }

    #[test]
    fn test_base64_accepts_padding() {
        let encoded = encode_base64(b"ab");
        assert_eq!(encoded, "YWI");
        assert_eq!(decode_base64("YWI=").unwrap(), b"ab");
        assert_eq!(decode_base64(&encoded).unwrap(), b"ab");
        assert!(decode_base64("***").is_err());
    }

    #[test]
    fn test_algorithm_ids() {
        assert_eq!(
            RendezvousAlgorithm::from_id(RendezvousAlgorithm::ECDH_V2),
            Some(RendezvousAlgorithm::EcdhV2)
        );
        assert_eq!(RendezvousAlgorithm::from_id("unknown-v9"), None);
    }
}
