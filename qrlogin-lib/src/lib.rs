//! Rendezvous building blocks for cross-device QR login.
//!
//! A device that is already signed in creates a short-lived rendezvous on a
//! relay and renders a login code. The new device scans it, joins the
//! rendezvous, and both sides then talk over an end-to-end encrypted channel
//! that the relay can neither read nor forge.
//!
//! This crate stays protocol-agnostic above the channel: it moves opaque bytes.
//! The login handshake itself lives in `qrlogin-interactive`.
//!
//! # Features
//!
//! - **Login codes**: decode and validate scanned codes, distinguishing
//!   unsupported protocol versions from bad scans
//! - **Channel**: X25519 key agreement, AES-256-GCM sealing and a
//!   human-comparable validation code
//! - **Transport Abstraction**: trait-based relay access with an `http.v1`
//!   implementation behind the `http-transport` feature
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use qrlogin_lib::{parse_login_code, HttpRendezvousTransport, RendezvousConfig, RendezvousService};
//!
//! let code = parse_login_code(&scanned_bytes)?;
//! let transport = Arc::new(HttpRendezvousTransport::new(&RendezvousConfig::default())?);
//! let service = RendezvousService::new(transport);
//!
//! let validation_code = service.join_rendezvous(&code.descriptor).await?;
//! println!("Confirm on the other device: {}", validation_code);
//! ```

pub mod channel;
pub mod code;
pub mod config;
pub mod errors;
pub mod service;
pub mod transport;

/// Test utilities for rendezvous flows.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use channel::{RendezvousAlgorithm, ValidationCode};
pub use code::{
    parse_login_code, CodeError, LoginFlow, RendezvousDescriptor, ScannedLoginCode,
    TransportKind, ValidatedLoginCode,
};
pub use config::RendezvousConfig;
pub use errors::{RendezvousError, RendezvousErrorCode};
pub use service::RendezvousService;
pub use transport::RendezvousTransport;

#[cfg(feature = "http-transport")]
pub use transport::HttpRendezvousTransport;

/// Common result alias for rendezvous operations.
pub type Result<T> = std::result::Result<T, RendezvousError>;
