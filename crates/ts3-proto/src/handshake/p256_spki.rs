//! The client's ephemeral P-256 keypair, carried in the handshake's
//! `omega` field for the historical ECDH leg. It is not used to derive the
//! session's actual shared secret (that is the Ed25519 leg, §4.3.3); real
//! clients still generate and transmit it for compatibility with servers
//! that expect the field to be present.

use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

/// The fixed 26-byte `SubjectPublicKeyInfo` DER prefix for an uncompressed
/// P-256 public key (algorithm = id-ecPublicKey, curve = prime256v1),
/// already ending in the BIT STRING's unused-bits byte (`0x00`); the
/// 65-byte uncompressed point follows it directly.
const SPKI_PREFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02,
    0x01, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03,
    0x42, 0x00,
];

/// A client's ephemeral P-256 keypair for the `omega` field.
pub struct EphemeralP256Key {
    signing: SigningKey,
    der_public: Vec<u8>,
}

impl std::fmt::Debug for EphemeralP256Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralP256Key").finish_non_exhaustive()
    }
}

impl EphemeralP256Key {
    /// Generates a new random P-256 keypair.
    #[must_use]
    pub fn generate() -> Self {
        let signing = SigningKey::random(&mut OsRng);
        let verifying: VerifyingKey = (&signing).into();
        let point = verifying.to_encoded_point(false);

        let mut der_public = Vec::with_capacity(SPKI_PREFIX.len() + 65);
        der_public.extend_from_slice(&SPKI_PREFIX);
        der_public.extend_from_slice(point.as_bytes());

        Self {
            signing,
            der_public,
        }
    }

    /// The DER `SubjectPublicKeyInfo` encoding of the public key, as
    /// transmitted base64-encoded in the `omega` parameter.
    #[must_use]
    pub fn der_public(&self) -> &[u8] {
        &self.der_public
    }

    /// Signs `message` with the ephemeral private key (unused by the
    /// current handshake flow, kept for symmetry with the server's
    /// `proof` field and for tests).
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn der_public_has_expected_length_and_prefix() {
        let key = EphemeralP256Key::generate();
        assert_eq!(key.der_public().len(), SPKI_PREFIX.len() + 65);
        assert!(key.der_public().starts_with(&SPKI_PREFIX));
    }

    #[test]
    fn two_generated_keys_differ() {
        let a = EphemeralP256Key::generate();
        let b = EphemeralP256Key::generate();
        assert_ne!(a.der_public(), b.der_public());
    }
}
