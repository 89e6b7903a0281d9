//! Trust checks on the partner's verification message.
//!
//! Account trust (the cross-signing master key) and device trust (the
//! partner's signing key) are independent predicates. Both are evaluated
//! against locally downloaded keys before anything is marked verified, so a
//! single mismatch leaves the store untouched.

use crate::payload::{require, Outcome, ProtocolPayload};
use crate::session::{DeviceInfo, LoginSession};
use crate::{LoginError, Result};

/// What the verification message entitles us to mark.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustVerdict {
    pub verifying_device_id: String,
    /// The partner asserted a master key and it matched ours.
    pub account_verified: bool,
}

/// Account predicate.
///
/// `Ok(false)` when no master key was asserted, `Ok(true)` when it was and
/// equals the local one.
pub fn check_master_key(asserted: Option<&str>, local: Option<&str>) -> Result<bool> {
    match asserted {
        None => Ok(false),
        Some(asserted) if Some(asserted) == local => Ok(true),
        Some(_) => Err(LoginError::MasterKeyMismatch),
    }
}

/// Device predicate: the asserted key must equal the fingerprint of a device
/// we already know.
pub fn check_device(
    asserted_id: &str,
    asserted_key: &str,
    known: Option<&DeviceInfo>,
) -> Result<()> {
    let device = known.ok_or_else(|| LoginError::UnknownDevice(asserted_id.to_string()))?;
    if device.device_id != asserted_id || device.ed25519_fingerprint != asserted_key {
        return Err(LoginError::DeviceKeyMismatch(asserted_id.to_string()));
    }
    Ok(())
}

/// Run both predicates for `session` against the partner's verification message.
///
/// Reads the crypto store but never writes to it.
pub async fn evaluate(
    session: &dyn LoginSession,
    verification: &ProtocolPayload,
) -> Result<TrustVerdict> {
    if verification.outcome != Some(Outcome::Verified) {
        return Err(LoginError::UnexpectedOutcome(verification.outcome));
    }
    if let Some(device_id) = verification.device_id.as_deref() {
        if device_id != session.device_id() {
            return Err(LoginError::EchoMismatch("device_id"));
        }
    }
    if let Some(device_key) = verification.device_key.as_deref() {
        if device_key != session.device_ed25519_key() {
            return Err(LoginError::EchoMismatch("device_key"));
        }
    }

    let verifying_device_id = require(
        verification.verifying_device_id.as_deref(),
        "verifying_device_id",
    )?;
    let verifying_device_key = require(
        verification.verifying_device_key.as_deref(),
        "verifying_device_key",
    )?;

    let crypto = session.crypto();
    let user_id = session.user_id();

    let local_master = match verification.master_key {
        Some(_) => crypto.master_key(user_id).await?,
        None => None,
    };
    let account_verified =
        check_master_key(verification.master_key.as_deref(), local_master.as_deref())?;

    let known = crypto.device(user_id, verifying_device_id).await?;
    check_device(verifying_device_id, verifying_device_key, known.as_ref())?;

    Ok(TrustVerdict {
        verifying_device_id: verifying_device_id.to_string(),
        account_verified,
    })
}
