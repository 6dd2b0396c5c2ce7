//! Per-packet key/nonce derivation (§4.1 "Per-packet encryption") and the
//! fixed "fake key" used before `clientek`.

use sha2::{Digest, Sha256};

use crate::header::PacketType;

/// The fixed key used to encrypt/decrypt every packet before `clientek`
/// establishes the real session key.
pub const FAKE_KEY: [u8; 16] = *b"c:\\windows\\syste";

/// The fixed nonce paired with [`FAKE_KEY`].
pub const FAKE_NONCE: [u8; 16] = *b"m\\firewall32.cpl";

/// Derives the per-packet `(key, nonce)` pair from the shared IV and this
/// packet's identity.
#[must_use]
pub fn derive(
    shared_iv: &[u8; 64],
    packet_type: PacketType,
    client_to_server: bool,
    packet_id: u16,
    generation: u32,
) -> ([u8; 16], [u8; 16]) {
    let mut buf = [0_u8; 70];
    buf[0] = if client_to_server { 0x31 } else { 0x30 };
    buf[1] = packet_type.wire_value();
    buf[2..6].copy_from_slice(&generation.to_be_bytes());
    buf[6..70].copy_from_slice(shared_iv);

    let digest = Sha256::digest(&buf);
    let mut key = [0_u8; 16];
    let mut nonce = [0_u8; 16];
    key.copy_from_slice(&digest[0..16]);
    nonce.copy_from_slice(&digest[16..32]);

    key[0] ^= ((packet_id >> 8) & 0xFF) as u8;
    key[1] ^= (packet_id & 0xFF) as u8;

    (key, nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let iv = [7_u8; 64];
        let a = derive(&iv, PacketType::Command, true, 42, 0);
        let b = derive(&iv, PacketType::Command, true, 42, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn packet_id_perturbs_key_but_not_nonce() {
        let iv = [7_u8; 64];
        let (key0, nonce0) = derive(&iv, PacketType::Command, true, 0, 0);
        let (key1, nonce1) = derive(&iv, PacketType::Command, true, 1, 0);
        assert_ne!(key0, key1);
        assert_eq!(nonce0, nonce1);
    }

    #[test]
    fn direction_changes_derived_material() {
        let iv = [7_u8; 64];
        let c2s = derive(&iv, PacketType::Command, true, 5, 0);
        let s2c = derive(&iv, PacketType::Command, false, 5, 0);
        assert_ne!(c2s, s2c);
    }

    #[test]
    fn generation_changes_derived_material() {
        let iv = [7_u8; 64];
        let gen0 = derive(&iv, PacketType::Command, true, 5, 0);
        let gen1 = derive(&iv, PacketType::Command, true, 5, 1);
        assert_ne!(gen0, gen1);
    }
}
