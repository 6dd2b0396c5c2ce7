//! Ed25519 point arithmetic used by the TS3 handshake: the license-key
//! chain that derives a server's long-term public key out of a sequence of
//! license blocks, and the session Diffie-Hellman exchange.
//!
//! This is plain Edwards-curve point arithmetic, *not* X25519: the curve is
//! Ed25519 and every point is encoded with the Ed25519-compressed format
//! throughout, per [RFC 8032].
//!
//! [RFC 8032]: https://www.rfc-editor.org/rfc/rfc8032

use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::{rngs::OsRng, RngCore as _};
use sha2::{Digest, Sha512};

use crate::Error;

/// The license chain's fixed root-key point: the accumulator's starting
/// value before any license block is folded in.
const ROOT_KEY: [u8; 32] = [
    0xcd, 0x0d, 0xe2, 0xae, 0xd4, 0x63, 0x45, 0x50, 0x9a, 0x7e, 0x3c, 0xfd,
    0x8f, 0x68, 0xb3, 0xdc, 0x75, 0x55, 0xb2, 0x9d, 0xcc, 0xec, 0x73, 0xcd,
    0x18, 0x75, 0x0f, 0x99, 0x38, 0x12, 0x40, 0x8a,
];

/// Maximum number of license blocks a license blob may contain.
const MAX_BLOCKS: usize = 8;

/// Block header length: 32-byte public key followed by a 1-byte type tag.
const BLOCK_HEADER_LEN: usize = 33;

/// Fixed length of a type-32 license block.
const FIXED_BLOCK_LEN: usize = 42;

/// A TS3 client's ephemeral Ed25519 keypair, used both to sign the derived
/// shared IV (the `clientek` proof) and, via its scalar, to perform the
/// session Diffie-Hellman with the server's long-term public key.
pub struct EphemeralKeyPair {
    signing: SigningKey,
    scalar: Scalar,
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &self.public())
            .finish_non_exhaustive()
    }
}

impl EphemeralKeyPair {
    /// Generates a new random [`EphemeralKeyPair`].
    #[must_use]
    pub fn generate() -> Self {
        let mut seed = [0_u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Derives an [`EphemeralKeyPair`] deterministically from a 32-byte
    /// seed. Used in tests to pin a fixed keypair, per the handshake
    /// conformance fixture.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let scalar = scalar_from_seed(&seed);
        Self { signing, scalar }
    }

    /// Returns the 32-byte compressed public key.
    #[must_use]
    pub fn public(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Signs `message`, returning the 64-byte Ed25519 signature.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// Computes the Diffie-Hellman shared point with `peer_public`,
    /// returning its 32-byte compressed encoding.
    ///
    /// If `peer_public` does not decode to a point on the curve, a random
    /// 32-byte value is returned instead of an error, so that the handshake
    /// proceeds and fails later at the `clientek` proof step rather than
    /// raising a distinguishable error here.
    #[must_use]
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        diffie_hellman(&self.scalar, peer_public)
    }
}

/// Computes the Diffie-Hellman shared point for a raw clamped `scalar` and
/// a peer's compressed Ed25519 public key. See
/// [`EphemeralKeyPair::diffie_hellman`] for the invalid-point fallback.
#[must_use]
pub fn diffie_hellman(scalar: &Scalar, peer_public: &[u8; 32]) -> [u8; 32] {
    match CompressedEdwardsY(*peer_public).decompress() {
        Some(point) => (scalar * point).compress().to_bytes(),
        None => {
            let mut fallback = [0_u8; 32];
            OsRng.fill_bytes(&mut fallback);
            fallback
        }
    }
}

/// Verifies an Ed25519 `signature` of `message` under `public`.
///
/// Per the protocol, callers may choose to log-and-continue on a `false`
/// result instead of aborting the handshake (legacy servers with invalid
/// proof chains are known to exist in the wild).
#[must_use]
pub fn verify(public: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
    let key = match VerifyingKey::from_bytes(public) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    key.verify(message, &sig).is_ok()
}

/// Derives the server's long-term Ed25519 public key from a binary license
/// blob, by walking the chain of license blocks and accumulating
/// `P = P + k·Q` starting from [`ROOT_KEY`].
///
/// # Errors
///
/// [`Error::LicenseEmpty`] if the blob is empty or contains no block with a
/// valid on-curve public key. Individual invalid blocks are skipped, not
/// fatal: a blob may legitimately end with an unusable trailing block.
pub fn derive_server_public_key(license: &[u8]) -> Result<[u8; 32], Error> {
    if license.is_empty() {
        return Err(Error::LicenseEmpty);
    }
    // Skip the leading 1-byte version.
    let mut data = &license[1..];

    let mut point = CompressedEdwardsY(ROOT_KEY)
        .decompress()
        .expect("the license-chain root key is a valid curve point");
    let mut folded_any = false;

    for _ in 0..MAX_BLOCKS {
        if data.len() < BLOCK_HEADER_LEN {
            break;
        }
        let block_type = data[32];
        let block_len = if block_type == 32 {
            FIXED_BLOCK_LEN
        } else {
            next_nul_inclusive(data)
        };
        if block_len > data.len() {
            break;
        }
        let block = &data[..block_len];

        let mut pubkey_bytes = [0_u8; 32];
        pubkey_bytes.copy_from_slice(&block[..32]);

        let hash = Sha512::digest(&block[32..]);
        let mut h = [0_u8; 64];
        h.copy_from_slice(&hash);
        let scalar = scalar_from_hash(&h);

        if let Some(q) = CompressedEdwardsY(pubkey_bytes).decompress() {
            point += scalar * q;
            folded_any = true;
        }

        data = &data[block_len..];
    }

    if !folded_any {
        return Err(Error::LicenseEmpty);
    }
    Ok(point.compress().to_bytes())
}

/// Finds the length of a variable-length license block: from its start up
/// to and including the first NUL byte at or after offset
/// [`BLOCK_HEADER_LEN`]. If no NUL byte is found, the block runs to the end
/// of the remaining data.
fn next_nul_inclusive(data: &[u8]) -> usize {
    data[BLOCK_HEADER_LEN..]
        .iter()
        .position(|&b| b == 0)
        .map_or(data.len(), |i| BLOCK_HEADER_LEN + i + 1)
}

/// Derives an Ed25519 scalar from a 32-byte Ed25519 private-key seed, per
/// the standard RFC 8032 key-expansion and clamping.
fn scalar_from_seed(seed: &[u8; 32]) -> Scalar {
    let hash = Sha512::digest(seed);
    let mut h = [0_u8; 64];
    h.copy_from_slice(&hash);
    scalar_from_hash(&h)
}

/// Derives a license-chain block scalar from a SHA-512 digest: clamp the
/// low 32 bytes per RFC 8032, then reduce little-endian modulo the group
/// order. A scalar that reduces to zero is replaced with one, per spec.
fn scalar_from_hash(h: &[u8; 64]) -> Scalar {
    let mut clamped = [0_u8; 32];
    clamped.copy_from_slice(&h[..32]);
    clamped[0] &= 0xF8;
    clamped[31] &= 0x3F;
    clamped[31] |= 0x40;

    let scalar = Scalar::from_bytes_mod_order(clamped);
    if scalar == Scalar::ZERO {
        Scalar::ONE
    } else {
        scalar
    }
}
