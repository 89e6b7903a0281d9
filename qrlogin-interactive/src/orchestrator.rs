//! The login state machine on the new device.
//!
//! ```text
//! Initial -> Scanning -> Connecting -> WaitingForConfirmation(code)
//!         -> WaitingForRemoteSignIn -> Completed { session, trust_established }
//! ```
//!
//! Any step can end in `Failed(reason)`. Each scan runs as its own attempt;
//! [`reset`](LoginOrchestrator::reset) starts a new attempt, and whatever the
//! old one was waiting on finishes in the background and is discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use qrlogin_lib::{parse_login_code, RendezvousService, RendezvousTransport};
use tokio::sync::broadcast;
use url::Url;

use crate::camera::{CameraAccess, CameraAvailability};
use crate::config::LoginConfig;
use crate::events::{AttemptId, EventBus, LoginEvent};
use crate::flow::FlowTags;
use crate::login_token::LoginTokenExchanger;
use crate::payload::{require, ProtocolPayload, LOGIN_TOKEN_PROTOCOL};
use crate::session::{LoginSession, SessionBootstrapper};
use crate::state::ProtocolState;
use crate::trust;
use crate::{LoginError, Result};

struct Machine {
    state: ProtocolState,
    attempt: AttemptId,
    /// Rendezvous of the current attempt, once one was opened.
    active: Option<Arc<RendezvousService>>,
}

/// Drives one device through QR login.
///
/// All methods take `&self`; share the orchestrator in an `Arc` to call
/// [`reset`](Self::reset) while [`process_scanned_code`](Self::process_scanned_code)
/// is still running.
pub struct LoginOrchestrator {
    config: LoginConfig,
    transport: Arc<dyn RendezvousTransport>,
    camera: Arc<dyn CameraAccess>,
    exchanger: Arc<dyn LoginTokenExchanger>,
    bootstrapper: Arc<dyn SessionBootstrapper>,
    machine: Mutex<Machine>,
    events: EventBus,
}

impl LoginOrchestrator {
    pub fn new(
        config: LoginConfig,
        transport: Arc<dyn RendezvousTransport>,
        camera: Arc<dyn CameraAccess>,
        exchanger: Arc<dyn LoginTokenExchanger>,
        bootstrapper: Arc<dyn SessionBootstrapper>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            config,
            transport,
            camera,
            exchanger,
            bootstrapper,
            machine: Mutex::new(Machine {
                state: ProtocolState::Initial,
                attempt: AttemptId::default(),
                active: None,
            }),
            events,
        }
    }

    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ProtocolState {
        self.machine().state.clone()
    }

    pub fn attempt(&self) -> AttemptId {
        self.machine().attempt
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.events.subscribe()
    }

    fn set_state(&self, machine: &mut Machine, state: ProtocolState) {
        tracing::debug!(attempt = %machine.attempt, from = machine.state.name(), to = state.name(), "login state changed");
        machine.state = state.clone();
        self.events.emit(LoginEvent::StateChanged {
            attempt: machine.attempt,
            state,
        });
    }

    /// Move to `state` if `attempt` is still the current one.
    fn transition(&self, attempt: AttemptId, state: ProtocolState) -> Result<()> {
        let mut machine = self.machine();
        if machine.attempt != attempt {
            return Err(LoginError::Stale(attempt));
        }
        self.set_state(&mut machine, state);
        Ok(())
    }

    fn ensure_current(&self, attempt: AttemptId) -> Result<()> {
        if self.machine().attempt == attempt {
            Ok(())
        } else {
            Err(LoginError::Stale(attempt))
        }
    }

    /// Open the camera and start scanning.
    ///
    /// Allowed from `Initial` and after a failure; otherwise the current
    /// state is returned unchanged.
    pub async fn start(&self) -> ProtocolState {
        let attempt = {
            let mut machine = self.machine();
            if !matches!(
                machine.state,
                ProtocolState::Initial | ProtocolState::Failed(_)
            ) {
                tracing::debug!(state = machine.state.name(), "start ignored");
                return machine.state.clone();
            }
            machine.attempt = machine.attempt.next();
            machine.attempt
        };

        let availability = self.camera.availability().await;
        let result = match availability {
            CameraAvailability::Available => match self.ensure_current(attempt) {
                Ok(()) => {
                    self.camera.start_scanning().await;
                    self.transition(attempt, ProtocolState::Scanning)
                }
                Err(stale) => Err(stale),
            },
            CameraAvailability::Unavailable => Err(LoginError::CameraUnavailable),
            CameraAvailability::AccessDenied => Err(LoginError::CameraAccessDenied),
        };
        if let Err(err) = result {
            self.abort(attempt, err).await;
        }
        self.state()
    }

    /// Run a login from a scanned code to a terminal state.
    ///
    /// Ignored unless the orchestrator is `Scanning`. Returns the state at the
    /// end of the attempt, or the current state if it was reset meanwhile.
    pub async fn process_scanned_code(&self, scanned: &[u8]) -> ProtocolState {
        let attempt = {
            let mut machine = self.machine();
            if !matches!(machine.state, ProtocolState::Scanning) {
                tracing::warn!(state = machine.state.name(), "scanned code ignored");
                return machine.state.clone();
            }
            machine.attempt = machine.attempt.next();
            machine.attempt
        };
        self.camera.stop_scanning().await;

        if let Err(err) = self.run(attempt, scanned).await {
            self.abort(attempt, err).await;
        }
        self.state()
    }

    /// Abandon the login and return to `Initial`, stopping the camera.
    pub async fn reset(&self) {
        self.cancel(true).await;
    }

    /// Abandon the login and return to `Initial`, leaving the camera running
    /// for the next scan.
    pub async fn restart(&self) {
        self.cancel(false).await;
    }

    async fn cancel(&self, stop_camera: bool) {
        let service = {
            let mut machine = self.machine();
            if machine.state.is_completed() {
                tracing::debug!("reset ignored after completion");
                return;
            }
            machine.attempt = machine.attempt.next();
            let service = machine.active.take();
            self.set_state(&mut machine, ProtocolState::Initial);
            service
        };

        if let Some(service) = service {
            let declined = ProtocolPayload::declined().to_vec();
            match declined {
                Ok(bytes) => {
                    if let Err(e) = service.send(&bytes).await {
                        tracing::debug!(error = %e, "could not tell partner the login was declined");
                    }
                }
                Err(e) => tracing::debug!(error = %e, "could not encode decline"),
            }
            service.tear_down().await;
        }
        if stop_camera {
            self.camera.stop_scanning().await;
        }
    }

    /// Record a failure for `attempt` and release its rendezvous.
    async fn abort(&self, attempt: AttemptId, err: LoginError) {
        let service = {
            let mut machine = self.machine();
            if err.is_stale() || machine.attempt != attempt {
                tracing::debug!(%attempt, error = %err, "discarding result of stale attempt");
                self.events.emit(LoginEvent::AttemptDiscarded { attempt });
                return;
            }
            let reason = err.failure_reason();
            if err.is_security_failure() {
                tracing::warn!(%attempt, error = %err, ?reason, "partner failed trust checks");
            } else {
                tracing::warn!(%attempt, error = %err, ?reason, "login attempt failed");
            }
            let service = machine.active.take();
            self.set_state(&mut machine, ProtocolState::Failed(reason));
            service
        };
        if let Some(service) = service {
            service.tear_down().await;
        }
    }

    async fn receive(
        &self,
        attempt: AttemptId,
        service: &RendezvousService,
    ) -> Result<ProtocolPayload> {
        let received = match self.config.receive_timeout() {
            Some(timeout) => service.receive_within(timeout).await,
            None => service.receive().await,
        };
        self.ensure_current(attempt)?;

        let bytes = received.map_err(|e| {
            if e.is_timeout() {
                LoginError::ReceiveTimedOut {
                    timeout_ms: self
                        .config
                        .receive_timeout()
                        .map(|t| t.as_millis() as u64)
                        .unwrap_or_default(),
                }
            } else {
                LoginError::Rendezvous(e)
            }
        })?;
        let payload = ProtocolPayload::from_slice(&bytes)?;
        if payload.is_declined() {
            return Err(LoginError::PartnerDeclined);
        }
        Ok(payload)
    }

    async fn send(
        &self,
        attempt: AttemptId,
        service: &RendezvousService,
        payload: &ProtocolPayload,
    ) -> Result<()> {
        let result = service.send(&payload.to_vec()?).await;
        self.ensure_current(attempt)?;
        Ok(result?)
    }

    #[tracing::instrument(skip_all, fields(attempt = %attempt))]
    async fn run(&self, attempt: AttemptId, scanned: &[u8]) -> Result<()> {
        let code = parse_login_code(scanned)?;
        let tags = FlowTags::for_flow(code.flow);

        let service = Arc::new(RendezvousService::new(self.transport.clone()));
        {
            let mut machine = self.machine();
            if machine.attempt != attempt {
                return Err(LoginError::Stale(attempt));
            }
            machine.active = Some(service.clone());
            self.set_state(&mut machine, ProtocolState::Connecting);
        }

        let joined = service.join_rendezvous(&code.descriptor).await;
        self.ensure_current(attempt)?;
        let validation_code = joined.map_err(LoginError::Join)?;
        self.transition(
            attempt,
            ProtocolState::WaitingForConfirmation(validation_code),
        )?;

        let offer = self.receive(attempt, &service).await?;
        let protocols = require(offer.protocols.as_ref(), "protocols")?;
        if !protocols.iter().any(|p| p == LOGIN_TOKEN_PROTOCOL) {
            return Err(LoginError::UnsupportedProtocols(protocols.clone()));
        }
        self.send(
            attempt,
            &service,
            &ProtocolPayload::protocol(tags.protocol_reply, LOGIN_TOKEN_PROTOCOL),
        )
        .await?;
        self.transition(attempt, ProtocolState::WaitingForRemoteSignIn)?;

        let grant = self.receive(attempt, &service).await?;
        let login_token = require(grant.login_token.as_deref(), "login_token")?;
        let homeserver = require(grant.homeserver.as_deref(), "homeserver")?;
        let homeserver = Url::parse(homeserver).map_err(|e| LoginError::InvalidField {
            field: "homeserver",
            reason: e.to_string(),
        })?;

        let credentials = self
            .exchanger
            .exchange(
                &homeserver,
                login_token,
                self.config.device_display_name.as_deref(),
            )
            .await;
        self.ensure_current(attempt)?;
        let session = self.bootstrapper.bootstrap(credentials?).await;
        self.ensure_current(attempt)?;
        let session = session?;

        let crypto = session.crypto();
        let downloaded = crypto.download_keys(session.user_id()).await;
        self.ensure_current(attempt)?;
        downloaded?;

        self.send(
            attempt,
            &service,
            &ProtocolPayload::device_confirmation(
                tags.device_confirmation,
                session.device_id(),
                session.device_ed25519_key(),
            ),
        )
        .await?;

        let verification = self.receive(attempt, &service).await?;
        let verdict = trust::evaluate(session.as_ref(), &verification).await;
        self.ensure_current(attempt)?;
        let verdict = verdict?;

        let trust_established = self.mark_verified(attempt, session.as_ref(), &verdict).await?;
        self.complete(attempt, session, trust_established).await
    }

    /// Record trust in the crypto store. Store failures leave the login
    /// complete but untrusted.
    async fn mark_verified(
        &self,
        attempt: AttemptId,
        session: &dyn LoginSession,
        verdict: &trust::TrustVerdict,
    ) -> Result<bool> {
        let crypto = session.crypto();
        let user_id = session.user_id();

        if verdict.account_verified {
            let marked = crypto.mark_account_verified(user_id).await;
            self.ensure_current(attempt)?;
            if let Err(e) = marked {
                tracing::warn!(error = %e, "failed to mark account verified");
                return Ok(false);
            }
        }

        let marked = crypto
            .mark_device_verified(user_id, &verdict.verifying_device_id)
            .await;
        self.ensure_current(attempt)?;
        if let Err(e) = marked {
            tracing::warn!(error = %e, "failed to mark partner device verified");
            return Ok(false);
        }
        Ok(true)
    }

    async fn complete(
        &self,
        attempt: AttemptId,
        session: Arc<dyn LoginSession>,
        trust_established: bool,
    ) -> Result<()> {
        let service = {
            let mut machine = self.machine();
            if machine.attempt != attempt {
                return Err(LoginError::Stale(attempt));
            }
            let service = machine.active.take();
            self.set_state(
                &mut machine,
                ProtocolState::Completed {
                    session,
                    trust_established,
                },
            );
            service
        };
        tracing::info!(%attempt, trust_established, "login completed");
        if let Some(service) = service {
            service.tear_down().await;
        }
        Ok(())
    }
}
