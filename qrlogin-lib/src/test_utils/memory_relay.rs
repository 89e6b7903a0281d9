//! In-memory rendezvous relay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use url::Url;

use crate::transport::RendezvousTransport;
use crate::{RendezvousError, Result};

/// Relay operations, as recorded and as targets for failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelayOperation {
    Create,
    Put,
    Get,
    Delete,
}

struct Resource {
    version: u64,
    body: Vec<u8>,
}

#[derive(Default)]
struct RelayInner {
    resources: HashMap<Url, Resource>,
    operations: Vec<RelayOperation>,
    failures: Vec<RelayOperation>,
}

/// A shared in-memory relay. Hand each device its own [`MemoryTransport`].
pub struct MemoryRelay {
    base_url: Url,
    next_id: AtomicU64,
    inner: Mutex<RelayInner>,
    changed: Notify,
}

impl MemoryRelay {
    /// Base URL every resource of this relay lives under.
    pub const BASE_URL: &'static str = "https://relay.test/rendezvous/";

    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base_url: Url::parse(Self::BASE_URL).expect("static relay url"),
            next_id: AtomicU64::new(1),
            inner: Mutex::new(RelayInner::default()),
            changed: Notify::new(),
        })
    }

    fn inner(&self) -> MutexGuard<'_, RelayInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// A new client of this relay with its own view of seen versions.
    pub fn transport(self: &Arc<Self>) -> Arc<dyn RendezvousTransport> {
        Arc::new(MemoryTransport::new(self.clone()))
    }

    /// Make the next call of `operation` (from any transport) fail.
    pub fn fail_next(&self, operation: RelayOperation) {
        self.inner().failures.push(operation);
    }

    /// Every operation attempted so far, in order.
    pub fn operations(&self) -> Vec<RelayOperation> {
        self.inner().operations.clone()
    }

    pub fn operation_count(&self, operation: RelayOperation) -> usize {
        self.inner()
            .operations
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    /// Number of live resources.
    pub fn resource_count(&self) -> usize {
        self.inner().resources.len()
    }

    fn begin(&self, operation: RelayOperation) -> Result<()> {
        let mut inner = self.inner();
        inner.operations.push(operation);
        if let Some(index) = inner.failures.iter().position(|op| *op == operation) {
            inner.failures.remove(index);
            return Err(RendezvousError::Transport(format!(
                "injected {:?} failure",
                operation
            )));
        }
        Ok(())
    }
}

/// One device's connection to a [`MemoryRelay`].
pub struct MemoryTransport {
    relay: Arc<MemoryRelay>,
    seen: Mutex<HashMap<Url, u64>>,
}

impl MemoryTransport {
    pub fn new(relay: Arc<MemoryRelay>) -> Self {
        Self {
            relay,
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn seen(&self) -> MutexGuard<'_, HashMap<Url, u64>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RendezvousTransport for MemoryTransport {
    async fn create(&self, relay_base: &Url, body: Vec<u8>) -> Result<Url> {
        self.relay.begin(RelayOperation::Create)?;

        let id = self.relay.next_id.fetch_add(1, Ordering::SeqCst);
        let uri = relay_base
            .join(&id.to_string())
            .map_err(|e| RendezvousError::invalid_data("relay_base", e.to_string()))?;

        self.relay
            .inner()
            .resources
            .insert(uri.clone(), Resource { version: 1, body });
        self.seen().insert(uri.clone(), 1);
        self.relay.changed.notify_waiters();
        Ok(uri)
    }

    async fn put(&self, uri: &Url, body: Vec<u8>) -> Result<()> {
        self.relay.begin(RelayOperation::Put)?;

        let version = {
            let mut inner = self.relay.inner();
            let resource = inner
                .resources
                .get_mut(uri)
                .ok_or_else(|| RendezvousError::Expired(uri.to_string()))?;
            resource.version += 1;
            resource.body = body;
            resource.version
        };
        self.seen().insert(uri.clone(), version);
        self.relay.changed.notify_waiters();
        Ok(())
    }

    async fn get(&self, uri: &Url) -> Result<Vec<u8>> {
        self.relay.begin(RelayOperation::Get)?;

        loop {
            let changed = self.relay.changed.notified();
            {
                let inner = self.relay.inner();
                let resource = inner
                    .resources
                    .get(uri)
                    .ok_or_else(|| RendezvousError::Expired(uri.to_string()))?;
                let mut seen = self.seen();
                if seen.get(uri) != Some(&resource.version) && !resource.body.is_empty() {
                    seen.insert(uri.clone(), resource.version);
                    return Ok(resource.body.clone());
                }
            }
            changed.await;
        }
    }

    async fn delete(&self, uri: &Url) -> Result<()> {
        self.relay.begin(RelayOperation::Delete)?;

        self.seen().remove(uri);
        self.relay.inner().resources.remove(uri);
        self.relay.changed.notify_waiters();
        Ok(())
    }
}
