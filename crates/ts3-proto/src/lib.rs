//! TS3 voice-protocol client engine: the Init0-through-Init4 handshake,
//! per-packet encryption and framing, the command sublanguage, fragment
//! reassembly, retransmission, and the [`Connection`] API built on top of
//! them.
//!
//! Built on [`ts3_crypto`] for every cryptographic primitive; this crate
//! owns the wire format, state machine and I/O.

#![deny(
    broken_intra_doc_links,
    missing_debug_implementations,
    nonstandard_style,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![warn(
    deprecated_in_future,
    missing_docs,
    unreachable_pub,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
mod connection;
mod counters;
mod directory;
mod error;
mod fragment;
mod handshake;
mod header;
mod kdf;
mod packet;
mod reliability;
mod transport;

pub use connection::{Config, Connection, Event, TextMessageTarget};
pub use directory::{ChannelId, ClientId};
pub use error::ErrorKind;
pub use handshake::State as HandshakeState;
pub use header::PacketType;
