#![allow(dead_code)]

use async_trait::async_trait;
use qrlogin_interactive::{
    CameraAccess, CameraAvailability, Credentials, CryptoTrustStore, DeviceInfo, LoginConfig,
    LoginError, LoginOrchestrator, LoginSession, LoginTokenExchanger, Outcome, PayloadType,
    ProtocolPayload, Result, SessionBootstrapper, LOGIN_TOKEN_PROTOCOL,
};
use qrlogin_lib::test_utils::MemoryRelay;
use qrlogin_lib::{LoginFlow, RendezvousService, RendezvousTransport, ValidationCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use url::Url;

pub const USER_ID: &str = "@alice:example.org";
pub const NEW_DEVICE_ID: &str = "NEWDEVICE";
pub const NEW_DEVICE_KEY: &str = "bmV3LWRldmljZS1rZXk";
pub const PARTNER_DEVICE_ID: &str = "OLDDEVICE";
pub const PARTNER_DEVICE_KEY: &str = "b2xkLWRldmljZS1rZXk";
pub const MASTER_KEY: &str = "bWFzdGVyLWtleQ";
pub const PARTNER_HOMESERVER: &str = "https://matrix.partner.example/";
pub const LOGIN_TOKEN: &str = "login-token-1";

/// Mock camera that records start/stop calls
pub struct MockCamera {
    availability: CameraAvailability,
    scanning: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    /// While set, `availability` blocks until `release` is notified.
    pub hold_availability: AtomicBool,
    pub availability_entered: Notify,
    pub release: Notify,
}

impl MockCamera {
    pub fn new(availability: CameraAvailability) -> Self {
        Self {
            availability,
            scanning: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            hold_availability: AtomicBool::new(false),
            availability_entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraAccess for MockCamera {
    async fn availability(&self) -> CameraAvailability {
        if self.hold_availability.load(Ordering::SeqCst) {
            self.availability_entered.notify_one();
            self.release.notified().await;
        }
        self.availability
    }

    async fn start_scanning(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.scanning.store(true, Ordering::SeqCst);
    }

    async fn stop_scanning(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.scanning.store(false, Ordering::SeqCst);
    }
}

/// Mock token exchanger that records the homeserver it was sent to
#[derive(Default)]
pub struct MockExchanger {
    pub fail: AtomicBool,
    calls: Mutex<Vec<(Url, String, Option<String>)>>,
}

impl MockExchanger {
    pub fn calls(&self) -> Vec<(Url, String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoginTokenExchanger for MockExchanger {
    async fn exchange(
        &self,
        homeserver: &Url,
        login_token: &str,
        device_display_name: Option<&str>,
    ) -> Result<Credentials> {
        self.calls.lock().unwrap().push((
            homeserver.clone(),
            login_token.to_string(),
            device_display_name.map(str::to_string),
        ));
        if self.fail.load(Ordering::SeqCst) {
            return Err(LoginError::TokenExchange("M_FORBIDDEN".to_string()));
        }
        Ok(Credentials::new(
            homeserver.clone(),
            USER_ID,
            NEW_DEVICE_ID,
            "syt_access_token",
        ))
    }
}

/// Mock crypto store with call counters
pub struct MockTrustStore {
    devices: Mutex<HashMap<String, DeviceInfo>>,
    master_key: Option<String>,
    pub downloads: AtomicUsize,
    device_marks: Mutex<Vec<String>>,
    pub account_marks: AtomicUsize,
    pub fail_download: AtomicBool,
    pub fail_marks: AtomicBool,
}

impl MockTrustStore {
    /// A store that knows the partner device and, optionally, a master key.
    pub fn new(master_key: Option<&str>) -> Self {
        let mut devices = HashMap::new();
        devices.insert(
            PARTNER_DEVICE_ID.to_string(),
            DeviceInfo {
                device_id: PARTNER_DEVICE_ID.to_string(),
                ed25519_fingerprint: PARTNER_DEVICE_KEY.to_string(),
            },
        );
        Self {
            devices: Mutex::new(devices),
            master_key: master_key.map(str::to_string),
            downloads: AtomicUsize::new(0),
            device_marks: Mutex::new(Vec::new()),
            account_marks: AtomicUsize::new(0),
            fail_download: AtomicBool::new(false),
            fail_marks: AtomicBool::new(false),
        }
    }

    fn store_error(&self, flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(LoginError::CryptoStore("store unavailable".to_string()));
        }
        Ok(())
    }

    pub fn device_marks(&self) -> Vec<String> {
        self.device_marks.lock().unwrap().clone()
    }

    pub fn verify_calls(&self) -> usize {
        self.device_marks().len() + self.account_marks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CryptoTrustStore for MockTrustStore {
    async fn download_keys(&self, _user_id: &str) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.store_error(&self.fail_download)
    }

    async fn device(&self, _user_id: &str, device_id: &str) -> Result<Option<DeviceInfo>> {
        Ok(self.devices.lock().unwrap().get(device_id).cloned())
    }

    async fn master_key(&self, _user_id: &str) -> Result<Option<String>> {
        Ok(self.master_key.clone())
    }

    async fn mark_device_verified(&self, _user_id: &str, device_id: &str) -> Result<()> {
        self.store_error(&self.fail_marks)?;
        self.device_marks.lock().unwrap().push(device_id.to_string());
        Ok(())
    }

    async fn mark_account_verified(&self, _user_id: &str) -> Result<()> {
        self.store_error(&self.fail_marks)?;
        self.account_marks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockSession {
    user_id: String,
    device_id: String,
    store: Arc<MockTrustStore>,
}

impl LoginSession for MockSession {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn device_ed25519_key(&self) -> &str {
        NEW_DEVICE_KEY
    }

    fn crypto(&self) -> Arc<dyn CryptoTrustStore> {
        self.store.clone()
    }
}

/// Mock bootstrapper that builds a [`MockSession`] on the shared store
pub struct MockBootstrapper {
    store: Arc<MockTrustStore>,
    pub bootstraps: AtomicUsize,
    pub fail: AtomicBool,
}

impl MockBootstrapper {
    pub fn new(store: Arc<MockTrustStore>) -> Self {
        Self {
            store,
            bootstraps: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SessionBootstrapper for MockBootstrapper {
    async fn bootstrap(&self, credentials: Credentials) -> Result<Arc<dyn LoginSession>> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LoginError::Bootstrap("sync failed".to_string()));
        }
        Ok(Arc::new(MockSession {
            user_id: credentials.user_id().to_string(),
            device_id: credentials.device_id().to_string(),
            store: self.store.clone(),
        }))
    }
}

/// Relay client that can hold one `put` until the test lets it through.
pub struct GatedTransport {
    inner: Arc<dyn RendezvousTransport>,
    pause_next_put: AtomicBool,
    pub entered: Notify,
    pub resume: Notify,
}

impl GatedTransport {
    pub fn new(inner: Arc<dyn RendezvousTransport>) -> Self {
        Self {
            inner,
            pause_next_put: AtomicBool::new(false),
            entered: Notify::new(),
            resume: Notify::new(),
        }
    }

    /// Block the next `put` until `resume` is notified.
    pub fn pause_next_put(&self) {
        self.pause_next_put.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RendezvousTransport for GatedTransport {
    async fn create(&self, relay_base: &Url, body: Vec<u8>) -> qrlogin_lib::Result<Url> {
        self.inner.create(relay_base, body).await
    }

    async fn put(&self, uri: &Url, body: Vec<u8>) -> qrlogin_lib::Result<()> {
        if self.pause_next_put.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.resume.notified().await;
        }
        self.inner.put(uri, body).await
    }

    async fn get(&self, uri: &Url) -> qrlogin_lib::Result<Vec<u8>> {
        self.inner.get(uri).await
    }

    async fn delete(&self, uri: &Url) -> qrlogin_lib::Result<()> {
        self.inner.delete(uri).await
    }
}

/// Everything a test needs around one orchestrator.
pub struct Harness {
    pub relay: Arc<MemoryRelay>,
    /// The orchestrator's own relay client.
    pub gate: Arc<GatedTransport>,
    pub camera: Arc<MockCamera>,
    pub exchanger: Arc<MockExchanger>,
    pub store: Arc<MockTrustStore>,
    pub bootstrapper: Arc<MockBootstrapper>,
    pub orchestrator: Arc<LoginOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(LoginConfig::default(), CameraAvailability::Available, None)
    }

    pub fn build(
        config: LoginConfig,
        availability: CameraAvailability,
        master_key: Option<&str>,
    ) -> Self {
        let relay = MemoryRelay::new();
        let gate = Arc::new(GatedTransport::new(relay.transport()));
        let camera = Arc::new(MockCamera::new(availability));
        let exchanger = Arc::new(MockExchanger::default());
        let store = Arc::new(MockTrustStore::new(master_key));
        let bootstrapper = Arc::new(MockBootstrapper::new(store.clone()));
        let orchestrator = Arc::new(LoginOrchestrator::new(
            config,
            gate.clone(),
            camera.clone(),
            exchanger.clone(),
            bootstrapper.clone(),
        ));
        Self {
            relay,
            gate,
            camera,
            exchanger,
            store,
            bootstrapper,
            orchestrator,
        }
    }
}

/// What the reciprocating device sends at each step.
#[derive(Clone)]
pub struct PartnerScript {
    /// Tag of the protocol offer; the flow's usual tag when unset.
    pub offer_kind: Option<PayloadType>,
    pub protocols: Vec<String>,
    pub homeserver: String,
    pub verifying_device_id: String,
    pub verifying_device_key: String,
    pub master_key: Option<String>,
    /// Sent back instead of the key the new device announced.
    pub echo_device_key: Option<String>,
}

impl Default for PartnerScript {
    fn default() -> Self {
        Self {
            offer_kind: None,
            protocols: vec![LOGIN_TOKEN_PROTOCOL.to_string()],
            homeserver: PARTNER_HOMESERVER.to_string(),
            verifying_device_id: PARTNER_DEVICE_ID.to_string(),
            verifying_device_key: PARTNER_DEVICE_KEY.to_string(),
            master_key: None,
            echo_device_key: None,
        }
    }
}

/// What the reciprocating device observed.
#[derive(Debug)]
pub struct PartnerReport {
    pub validation_code: ValidationCode,
    pub reply: ProtocolPayload,
    pub confirmation: ProtocolPayload,
}

/// The already signed-in device, driven over the in-memory relay.
pub struct Partner {
    service: RendezvousService,
    flow: LoginFlow,
    code: Vec<u8>,
}

impl Partner {
    pub async fn create(relay: &Arc<MemoryRelay>, flow: LoginFlow) -> Self {
        let service = RendezvousService::new(relay.transport());
        let code = service
            .create_rendezvous(relay.base_url(), flow)
            .await
            .unwrap();
        Self {
            service,
            flow,
            code: code.to_json().unwrap(),
        }
    }

    /// Bytes the new device scans.
    pub fn code(&self) -> Vec<u8> {
        self.code.clone()
    }

    /// Tag the reciprocating side puts on its protocol offer.
    pub fn offer_kind(&self) -> PayloadType {
        match self.flow {
            LoginFlow::SetupAdditionalDeviceV1 => PayloadType::Progress,
            LoginFlow::Default => PayloadType::Protocols,
        }
    }

    /// Offer the protocols and wait for the new device's choice.
    pub async fn negotiate(&self, script: &PartnerScript) -> qrlogin_lib::Result<ProtocolPayload> {
        let kind = script.offer_kind.unwrap_or_else(|| self.offer_kind());
        self.send(&ProtocolPayload::protocols(kind, script.protocols.clone()))
            .await?;
        self.receive().await
    }

    pub async fn accept(&self) -> qrlogin_lib::Result<ValidationCode> {
        self.service.accept_partner().await
    }

    pub async fn send(&self, payload: &ProtocolPayload) -> qrlogin_lib::Result<()> {
        self.service.send(&serde_json::to_vec(payload)?).await
    }

    pub async fn receive(&self) -> qrlogin_lib::Result<ProtocolPayload> {
        let bytes = self.service.receive().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Play the whole reciprocating side of the handshake.
    pub async fn reciprocate(&self, script: &PartnerScript) -> qrlogin_lib::Result<PartnerReport> {
        let validation_code = self.accept().await?;
        let reply = self.negotiate(script).await?;

        self.send(&ProtocolPayload::login_token(
            PayloadType::Progress,
            LOGIN_TOKEN,
            script.homeserver.clone(),
        ))
        .await?;
        let confirmation = self.receive().await?;

        let mut verification = ProtocolPayload::new(PayloadType::Finish);
        verification.outcome = Some(Outcome::Verified);
        verification.device_id = confirmation.device_id.clone();
        verification.device_key = script
            .echo_device_key
            .clone()
            .or_else(|| confirmation.device_key.clone());
        verification.verifying_device_id = Some(script.verifying_device_id.clone());
        verification.verifying_device_key = Some(script.verifying_device_key.clone());
        verification.master_key = script.master_key.clone();
        self.send(&verification).await?;

        Ok(PartnerReport {
            validation_code,
            reply,
            confirmation,
        })
    }
}
