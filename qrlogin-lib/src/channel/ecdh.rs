//! X25519 / HKDF-SHA256 / AES-256-GCM channel.
//!
//! # Key schedule
//!
//! ```text
//! shared = X25519(our_secret, their_public)
//! info   = "<algorithm>|<initiator key b64>|<joiner key b64>"
//! key    = HKDF-SHA256(salt = 0^32, ikm = shared, info)            (32 bytes)
//! check  = HKDF-SHA256(salt = 0^32, ikm = shared, "<algorithm>|CHECKCODE|...") (5 bytes)
//! ```
//!
//! # Wire format
//!
//! ```text
//! {"iv": "<b64 12-byte nonce>", "ciphertext": "<b64 ciphertext+tag>"}
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use super::{
    decode_base64, encode_base64, ChannelError, RendezvousAlgorithm, ValidationCode,
    PUBLIC_KEY_LENGTH,
};

/// Size of the nonce in bytes (96 bits for GCM).
const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes.
const TAG_SIZE: usize = 16;

/// Which side of the channel we are. Fixes the order of keys in the KDF info.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelRole {
    /// Created the rendezvous and rendered the code.
    Initiator,
    /// Scanned the code and joined.
    Joiner,
}

/// Our ephemeral key pair for a single channel.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Our public key bytes.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.public.to_bytes()
    }

    /// Complete the key agreement. Consumes the secret.
    pub fn agree(
        self,
        algorithm: RendezvousAlgorithm,
        role: ChannelRole,
        their_public: &[u8; PUBLIC_KEY_LENGTH],
    ) -> Result<EstablishedChannel, ChannelError> {
        let ours = self.public_key();
        let shared = self.secret.diffie_hellman(&PublicKey::from(*their_public));
        if !shared.was_contributory() {
            return Err(ChannelError::KeyAgreement(
                "partner key is a low-order point".to_string(),
            ));
        }

        let (initiator, joiner) = match role {
            ChannelRole::Initiator => (ours, *their_public),
            ChannelRole::Joiner => (*their_public, ours),
        };
        let transcript = format!("{}|{}", encode_base64(&initiator), encode_base64(&joiner));

        let hk = Hkdf::<Sha256>::new(Some(&[0u8; 32][..]), shared.as_bytes());

        let mut key = Zeroizing::new([0u8; 32]);
        hk.expand(
            format!("{}|{}", algorithm.as_str(), transcript).as_bytes(),
            &mut *key,
        )
        .map_err(|e| ChannelError::KeyDerivation(e.to_string()))?;

        let mut check = [0u8; 5];
        hk.expand(
            format!("{}|CHECKCODE|{}", algorithm.as_str(), transcript).as_bytes(),
            &mut check,
        )
        .map_err(|e| ChannelError::KeyDerivation(e.to_string()))?;

        Ok(EstablishedChannel {
            algorithm,
            key,
            validation_code: ValidationCode::from_bytes(check),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SealedEnvelope {
    iv: String,
    ciphertext: String,
}

/// A channel with agreed key material.
pub struct EstablishedChannel {
    algorithm: RendezvousAlgorithm,
    key: Zeroizing<[u8; 32]>,
    validation_code: ValidationCode,
}

impl std::fmt::Debug for EstablishedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstablishedChannel")
            .field("algorithm", &self.algorithm)
            .field("validation_code", &self.validation_code)
            .finish_non_exhaustive()
    }
}

impl EstablishedChannel {
    pub fn algorithm(&self) -> RendezvousAlgorithm {
        self.algorithm
    }

    pub fn validation_code(&self) -> &ValidationCode {
        &self.validation_code
    }

    /// Seal a plaintext into the JSON envelope.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let cipher = Aes256Gcm::new_from_slice(self.key.as_slice())
            .map_err(|e| ChannelError::EncryptFailed(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| ChannelError::EncryptFailed(e.to_string()))?;

        let envelope = SealedEnvelope {
            iv: encode_base64(&nonce_bytes),
            ciphertext: encode_base64(&ciphertext),
        };
        serde_json::to_vec(&envelope).map_err(|e| ChannelError::EncryptFailed(e.to_string()))
    }

    /// Open a JSON envelope.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let envelope: SealedEnvelope = serde_json::from_slice(sealed)
            .map_err(|e| ChannelError::InvalidEnvelope(e.to_string()))?;

        let nonce_bytes = decode_base64(&envelope.iv)
            .map_err(|e| ChannelError::InvalidEnvelope(format!("iv: {}", e)))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(ChannelError::InvalidEnvelope(format!(
                "iv must be {} bytes, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            )));
        }
        let ciphertext = decode_base64(&envelope.ciphertext)
            .map_err(|e| ChannelError::InvalidEnvelope(format!("ciphertext: {}", e)))?;
        if ciphertext.len() < TAG_SIZE {
            return Err(ChannelError::InvalidEnvelope(
                "ciphertext shorter than tag".to_string(),
            ));
        }

        let cipher =
            Aes256Gcm::new_from_slice(self.key.as_slice()).map_err(|_| ChannelError::DecryptFailed)?;
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| ChannelError::DecryptFailed)
    }
}
