//! Rendezvous service: a transport plus an encrypted channel.
//!
//! A service instance serves exactly one rendezvous. The joining device calls
//! [`RendezvousService::join_rendezvous`]; the reciprocating device calls
//! [`RendezvousService::create_rendezvous`] followed by
//! [`RendezvousService::accept_partner`]. After that both sides exchange sealed
//! messages with [`send`](RendezvousService::send) and
//! [`receive`](RendezvousService::receive).
//!
//! Nothing here retries. A failed step leaves protocol state that neither side
//! can safely resume, so callers abort the attempt and call
//! [`tear_down`](RendezvousService::tear_down).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use url::Url;

use crate::channel::{
    decode_base64, encode_base64, ChannelRole, EphemeralKeyPair, EstablishedChannel, JoinMessage,
    RendezvousAlgorithm, ValidationCode, PUBLIC_KEY_LENGTH,
};
use crate::code::{LoginFlow, RendezvousDescriptor, ScannedLoginCode, TransportKind};
use crate::transport::RendezvousTransport;
use crate::{RendezvousError, Result};

enum ServiceState {
    Idle,
    /// Created by us, waiting for the joining device's key.
    Created {
        uri: Url,
        algorithm: RendezvousAlgorithm,
        keys: EphemeralKeyPair,
    },
    /// Accepting; the key pair has been moved out for the agreement.
    Accepting { uri: Url },
    Joined {
        uri: Url,
        channel: Arc<EstablishedChannel>,
    },
    TornDown,
}

impl ServiceState {
    fn uri(&self) -> Option<&Url> {
        match self {
            Self::Created { uri, .. } | Self::Accepting { uri } | Self::Joined { uri, .. } => {
                Some(uri)
            }
            Self::Idle | Self::TornDown => None,
        }
    }
}

/// Join/send/receive/teardown over a single rendezvous.
pub struct RendezvousService {
    transport: Arc<dyn RendezvousTransport>,
    state: Mutex<ServiceState>,
}

impl RendezvousService {
    pub fn new(transport: Arc<dyn RendezvousTransport>) -> Self {
        Self {
            transport,
            state: Mutex::new(ServiceState::Idle),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn joined(&self) -> Result<(Url, Arc<EstablishedChannel>)> {
        match &*self.state() {
            ServiceState::Joined { uri, channel } => Ok((uri.clone(), channel.clone())),
            _ => Err(RendezvousError::NotJoined),
        }
    }

    /// URL of the rendezvous this service is attached to, if any.
    pub fn uri(&self) -> Option<Url> {
        self.state().uri().cloned()
    }

    pub fn is_joined(&self) -> bool {
        matches!(&*self.state(), ServiceState::Joined { .. })
    }

    /// Validation code of the joined channel.
    pub fn validation_code(&self) -> Option<ValidationCode> {
        match &*self.state() {
            ServiceState::Joined { channel, .. } => Some(channel.validation_code().clone()),
            _ => None,
        }
    }

    /// Join the rendezvous described by a scanned code.
    ///
    /// Agrees a key with the partner's advertised public key, then announces our
    /// own public key on the channel. Returns the validation code to show.
    #[tracing::instrument(skip(self, descriptor), fields(uri = %descriptor.uri))]
    pub async fn join_rendezvous(&self, descriptor: &RendezvousDescriptor) -> Result<ValidationCode> {
        let keys = EphemeralKeyPair::generate();
        let our_key = encode_base64(&keys.public_key());
        let channel = keys.agree(descriptor.algorithm, ChannelRole::Joiner, &descriptor.partner_key)?;
        let code = channel.validation_code().clone();

        {
            let mut state = self.state();
            if !matches!(&*state, ServiceState::Idle) {
                return Err(RendezvousError::Internal(
                    "rendezvous service already in use".to_string(),
                ));
            }
            *state = ServiceState::Joined {
                uri: descriptor.uri.clone(),
                channel: Arc::new(channel),
            };
        }

        let announce = serde_json::to_vec(&JoinMessage {
            algorithm: descriptor.algorithm.as_str().to_string(),
            key: our_key,
        })?;
        self.transport.put(&descriptor.uri, announce).await?;

        tracing::debug!("joined rendezvous");
        Ok(code)
    }

    /// Create a rendezvous on `relay_base` and return the code to render.
    #[tracing::instrument(skip(self))]
    pub async fn create_rendezvous(
        &self,
        relay_base: &Url,
        flow: LoginFlow,
    ) -> Result<ScannedLoginCode> {
        if !matches!(&*self.state(), ServiceState::Idle) {
            return Err(RendezvousError::Internal(
                "rendezvous service already in use".to_string(),
            ));
        }

        let algorithm = RendezvousAlgorithm::EcdhV2;
        let keys = EphemeralKeyPair::generate();
        let public_key = keys.public_key();
        let uri = self.transport.create(relay_base, Vec::new()).await?;

        let code = ScannedLoginCode::reciprocate(
            flow,
            TransportKind::HttpV1,
            &uri,
            algorithm,
            &public_key,
        );
        *self.state() = ServiceState::Created {
            uri,
            algorithm,
            keys,
        };
        Ok(code)
    }

    /// Wait for the joining device to announce its key and derive the channel.
    #[tracing::instrument(skip(self))]
    pub async fn accept_partner(&self) -> Result<ValidationCode> {
        let (uri, algorithm, keys) = {
            let mut state = self.state();
            match std::mem::replace(&mut *state, ServiceState::TornDown) {
                ServiceState::Created {
                    uri,
                    algorithm,
                    keys,
                } => {
                    *state = ServiceState::Accepting { uri: uri.clone() };
                    (uri, algorithm, keys)
                }
                other => {
                    *state = other;
                    return Err(RendezvousError::Internal(
                        "no created rendezvous to accept on".to_string(),
                    ));
                }
            }
        };

        let bytes = self.transport.get(&uri).await?;
        let announce: JoinMessage = serde_json::from_slice(&bytes)?;
        if RendezvousAlgorithm::from_id(&announce.algorithm) != Some(algorithm) {
            return Err(RendezvousError::Unsupported(format!(
                "partner algorithm {}",
                announce.algorithm
            )));
        }
        let partner_key: [u8; PUBLIC_KEY_LENGTH] = decode_base64(&announce.key)
            .ok()
            .and_then(|bytes| bytes.as_slice().try_into().ok())
            .ok_or_else(|| RendezvousError::invalid_data("key", "not a base64 X25519 key"))?;

        let channel = keys.agree(algorithm, ChannelRole::Initiator, &partner_key)?;
        let code = channel.validation_code().clone();
        *self.state() = ServiceState::Joined {
            uri,
            channel: Arc::new(channel),
        };
        Ok(code)
    }

    /// Encrypt and transmit a message.
    pub async fn send(&self, plaintext: &[u8]) -> Result<()> {
        let (uri, channel) = self.joined()?;
        let sealed = channel.encrypt(plaintext)?;
        self.transport.put(&uri, sealed).await
    }

    /// Wait for the partner's next message and decrypt it.
    pub async fn receive(&self) -> Result<Vec<u8>> {
        let (uri, channel) = self.joined()?;
        let sealed = self.transport.get(&uri).await?;
        Ok(channel.decrypt(&sealed)?)
    }

    /// [`receive`](Self::receive) bounded by `timeout`.
    pub async fn receive_within(&self, timeout: Duration) -> Result<Vec<u8>> {
        tokio::time::timeout(timeout, self.receive())
            .await
            .map_err(|_| RendezvousError::Timeout {
                operation: "receive".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    /// Forget the channel and delete the relay resource. Never fails.
    #[tracing::instrument(skip(self))]
    pub async fn tear_down(&self) {
        let previous = std::mem::replace(&mut *self.state(), ServiceState::TornDown);
        if let Some(uri) = previous.uri() {
            if let Err(e) = self.transport.delete(uri).await {
                tracing::warn!(%uri, error = %e, "failed to delete rendezvous; relay will expire it");
            }
        }
    }
}
