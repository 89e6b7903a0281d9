//! Collaborators that own the signed-in session and its crypto store.

use std::fmt;
use std::sync::Arc;

use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Result;

/// Bearer credentials returned by the homeserver for the new device.
///
/// Handed to the [`SessionBootstrapper`] once and wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    user_id: String,
    device_id: String,
    access_token: String,
    #[zeroize(skip)]
    homeserver: Url,
}

impl Credentials {
    pub fn new(
        homeserver: Url,
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            access_token: access_token.into(),
            homeserver,
        }
    }

    pub fn homeserver(&self) -> &Url {
        &self.homeserver
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("homeserver", &self.homeserver.as_str())
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

/// A device as known to the local crypto store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    /// Base64 Ed25519 signing key.
    pub ed25519_fingerprint: String,
}

/// Local view of the account's keys, and the only place trust is recorded.
#[async_trait::async_trait]
pub trait CryptoTrustStore: Send + Sync {
    /// Refresh the device list and cross-signing keys of `user_id`.
    async fn download_keys(&self, user_id: &str) -> Result<()>;

    /// A device of `user_id`, if it was seen in a key download.
    async fn device(&self, user_id: &str, device_id: &str) -> Result<Option<DeviceInfo>>;

    /// Base64 cross-signing master key of `user_id`, if known.
    async fn master_key(&self, user_id: &str) -> Result<Option<String>>;

    async fn mark_device_verified(&self, user_id: &str, device_id: &str) -> Result<()>;

    async fn mark_account_verified(&self, user_id: &str) -> Result<()>;
}

/// An active, signed-in session.
pub trait LoginSession: Send + Sync {
    fn user_id(&self) -> &str;

    fn device_id(&self) -> &str;

    /// Base64 Ed25519 signing key of this device.
    fn device_ed25519_key(&self) -> &str;

    fn crypto(&self) -> Arc<dyn CryptoTrustStore>;
}

/// Turns credentials into a running session.
#[async_trait::async_trait]
pub trait SessionBootstrapper: Send + Sync {
    async fn bootstrap(&self, credentials: Credentials) -> Result<Arc<dyn LoginSession>>;
}
