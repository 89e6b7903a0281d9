//! QR Login Interactive Layer
//!
//! This crate runs the login handshake on the new device, on top of the
//! rendezvous channel from `qrlogin-lib`:
//!
//! 1. validate the scanned code and join the rendezvous
//! 2. agree on the `login_token` protocol
//! 3. redeem the partner's login token at the partner's homeserver
//! 4. bootstrap a session and announce this device
//! 5. check the partner's trust assertion against local keys, then mark trust
//!
//! Platform pieces (camera, session bootstrap, crypto store, token login) are
//! injected through traits. Progress is observable through a broadcast
//! [`LoginEvent`] stream.

pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod flow;
pub mod login_token;
pub mod orchestrator;
pub mod payload;
pub mod session;
pub mod state;
pub mod trust;

pub use camera::{CameraAccess, CameraAvailability};
pub use config::LoginConfig;
pub use error::{LoginError, Result};
pub use events::{AttemptId, EventBus, LoginEvent};
pub use flow::FlowTags;
pub use login_token::LoginTokenExchanger;
pub use orchestrator::LoginOrchestrator;
pub use payload::{Outcome, PayloadType, ProtocolPayload, LOGIN_TOKEN_PROTOCOL};
pub use session::{Credentials, CryptoTrustStore, DeviceInfo, LoginSession, SessionBootstrapper};
pub use state::{FailureReason, ProtocolState};
pub use trust::TrustVerdict;

#[cfg(feature = "http-login")]
pub use login_token::HttpLoginTokenExchanger;
