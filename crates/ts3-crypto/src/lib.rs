//! Cryptographic primitives underlying the TS3 voice-protocol handshake:
//! AES-128 [EAX] packet encryption, standalone [CMAC]/OMAC1, [Ed25519] point
//! arithmetic (license-key derivation and Diffie-Hellman), and the
//! modular-squaring connection puzzle.
//!
//! This crate is the leaf of the workspace: no I/O, no logging, pure
//! functions and small value types.
//!
//! [CMAC]: https://csrc.nist.gov/publications/detail/sp/800-38b/final
//! [EAX]: https://en.wikipedia.org/wiki/EAX_mode
//! [Ed25519]: https://ed25519.cr.yp.to

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

pub mod eax;
pub mod ed25519;
pub mod mac;
pub mod puzzle;

use derive_more::{Display, Error};

/// Errors shared across every primitive in this crate.
#[derive(Clone, Copy, Debug, Display, Error, Eq, PartialEq)]
pub enum Error {
    /// EAX tag verification failed: either the key/nonce is wrong, or the
    /// ciphertext, header or tag has been tampered with.
    #[display(fmt = "EAX tag verification failed")]
    TagMismatch,

    /// The puzzle's `level` parameter exceeds the safety ceiling
    /// ([`puzzle::LEVEL_CEILING`]) and was rejected without running.
    #[display(fmt = "puzzle level exceeds safety ceiling")]
    PuzzleLevelTooHigh,

    /// The puzzle's modulus is degenerate (zero), so no meaningful squaring
    /// can be performed.
    #[display(fmt = "puzzle modulus is degenerate")]
    PuzzleModulusInvalid,

    /// A license blob could not be parsed into any usable block.
    #[display(fmt = "license blob contains no usable block")]
    LicenseEmpty,
}
