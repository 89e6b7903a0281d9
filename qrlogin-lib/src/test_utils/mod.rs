//! Test utilities for rendezvous flows.
//!
//! This module provides an in-process relay that behaves like an `http.v1`
//! rendezvous server (versioned resources, change notification, expiry on
//! delete), with operation recording and failure injection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qrlogin_lib::test_utils::{MemoryRelay, RelayOperation};
//! use qrlogin_lib::{LoginFlow, RendezvousService};
//!
//! let relay = MemoryRelay::new();
//! let reciprocating = RendezvousService::new(relay.transport());
//! let code = reciprocating
//!     .create_rendezvous(relay.base_url(), LoginFlow::Default)
//!     .await?;
//!
//! relay.fail_next(RelayOperation::Put);
//! ```

mod memory_relay;

pub use memory_relay::{MemoryRelay, MemoryTransport, RelayOperation};
