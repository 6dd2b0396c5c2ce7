//! Error types: one enum per fallible subsystem, collapsing into the
//! public [`ErrorKind`] at the `Connection` API boundary.

use derive_more::{Display, Error};

/// Errors raised while driving the handshake state machine.
#[derive(Debug, Display, Error)]
pub enum HandshakeError {
    /// The server's `random0_r` echo did not match the `random0` we sent.
    #[display(fmt = "Init1 random0_r mismatch")]
    Random0Mismatch,

    /// No Init1/Init3/`initivexpand2`/`initserver` arrived within the
    /// connect timeout.
    #[display(fmt = "handshake timed out waiting for {step}")]
    TimedOut {
        /// Which handshake step we were waiting for.
        step: &'static str,
    },

    /// A handshake payload was the wrong length or had an unexpected step
    /// tag.
    #[display(fmt = "malformed {step} payload: {detail}")]
    MalformedPayload {
        /// Which handshake step failed to parse.
        step: &'static str,
        /// Human-readable detail.
        detail: String,
    },

    /// The server rejected the session outright (e.g. wrong password, IP
    /// ban) with a textual error command.
    #[display(fmt = "server rejected connection: {0}")]
    Rejected(String),

    /// A crypto primitive failed during the handshake (puzzle ceiling
    /// exceeded, degenerate modulus, empty license chain).
    #[display(fmt = "crypto error during handshake: {_0}")]
    Crypto(#[error(source)] ts3_crypto::Error),

    /// A command could not be parsed where the handshake required one.
    #[display(fmt = "command parse error during handshake: {_0}")]
    CommandParse(#[error(source)] super::command::CommandParseError),
}

/// The public, user-facing error classification surfaced by
/// [`crate::Connection`].
///
/// Deliberately has no derived `From` conversions: `Timeout`, `Protocol`,
/// `Crypto` and `Rejected` all wrap a bare `String`, so a single blanket
/// `impl From<String>` could not pick a variant. Callers build these
/// directly or go through [`HandshakeError`]'s manual conversion below.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Underlying socket or relay-stream failure. Recoverable by
    /// reconnecting.
    #[display(fmt = "transport error: {_0}")]
    Transport(#[error(source)] std::io::Error),

    /// `connect()`, handshake, or session-idle timeout exceeded.
    #[display(fmt = "timed out: {_0}")]
    Timeout(String),

    /// Malformed server message, or a handshake parameter outside
    /// accepted bounds.
    #[display(fmt = "protocol error: {_0}")]
    Protocol(String),

    /// MAC verification or signature-verification failure judged fatal.
    #[display(fmt = "crypto error: {_0}")]
    Crypto(String),

    /// Explicit server rejection (ban, bad credentials, missing channel
    /// password).
    #[display(fmt = "rejected by server: {_0}")]
    Rejected(String),
}

impl From<HandshakeError> for ErrorKind {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Random0Mismatch => Self::Protocol(err.to_string()),
            HandshakeError::TimedOut { .. } => Self::Timeout(err.to_string()),
            HandshakeError::MalformedPayload { .. } => {
                Self::Protocol(err.to_string())
            }
            HandshakeError::Rejected(detail) => Self::Rejected(detail),
            HandshakeError::Crypto(_) => Self::Crypto(err.to_string()),
            HandshakeError::CommandParse(_) => Self::Protocol(err.to_string()),
        }
    }
}
