use async_trait::async_trait;
use url::Url;

use crate::Result;

/// Thin client over a relay resource that two devices use as a mailbox.
///
/// Implementations remember which version of each resource they have already
/// seen (including the versions produced by their own writes), so `get` only
/// ever returns data written by the other side.
#[async_trait]
pub trait RendezvousTransport: Send + Sync {
    /// Creates a new rendezvous resource under `relay_base` seeded with `body`,
    /// returning the resource URL to share with the partner.
    async fn create(&self, relay_base: &Url, body: Vec<u8>) -> Result<Url>;

    /// Replaces the resource content.
    async fn put(&self, uri: &Url, body: Vec<u8>) -> Result<()>;

    /// Waits until the resource holds content this transport has not seen yet
    /// and returns it.
    ///
    /// There is no timeout here beyond per-request limits; callers that need
    /// one wrap the future.
    async fn get(&self, uri: &Url) -> Result<Vec<u8>>;

    /// Deletes the resource. Relays expire resources on their own, so callers
    /// may ignore failures.
    async fn delete(&self, uri: &Url) -> Result<()>;
}
