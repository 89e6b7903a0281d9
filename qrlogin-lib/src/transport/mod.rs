//! Rendezvous relay transports.

mod traits;

#[cfg(feature = "http-transport")]
mod http;

pub use traits::RendezvousTransport;

#[cfg(feature = "http-transport")]
pub use http::HttpRendezvousTransport;
