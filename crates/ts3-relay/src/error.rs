//! The relay's own error type.
//!
//! Kept separate from `actix_web::Error` so the bridging logic in
//! [`crate::server`] and [`crate::bridge`] stays independent of the HTTP
//! framework; the HTTP layer converts it at the boundary.

use derive_more::{Display, Error, From};

/// Failures the relay's UDP bridging can produce.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Binding or connecting the per-session UDP socket failed.
    #[display(fmt = "UDP socket error: {}", _0)]
    Udp(std::io::Error),
}
