//! The six-step TS3 key-exchange handshake: Init0 through Init4, the
//! `initivexpand2`/`clientek` key-establishment exchange, and the
//! `clientinit`/`initserver` session bring-up that follows it.

mod p256_spki;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::Sha1;
use sha2::{Digest, Sha512};
use ts3_crypto::{ed25519::EphemeralKeyPair, puzzle};

use crate::command::{self, Item};
use crate::error::HandshakeError;

pub use p256_spki::EphemeralP256Key;

/// Offset (in seconds) between the protocol's reference epoch and
/// `2013-01-01 00:00:00 UTC`, baked into every Init0/Init2/Init4 payload.
/// The exact value is a compile-time constant tied to a specific official
/// client release and is not otherwise load-bearing for interop with the
/// handshake logic in this crate.
pub const CLIENT_VERSION_OFFSET: u32 = 0x0036_6cb5;

/// States of the handshake state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// Init0 sent, waiting for Init1.
    Init0Sent,
    /// Init2 sent, waiting for Init3.
    Init2Sent,
    /// Init4 sent, waiting for the fake-key-encrypted `initivexpand2`.
    Init4Sent,
    /// `clientek`/`clientinit` sent, waiting for `initserver`.
    Authenticating,
    /// Session fully established.
    Authenticated,
    /// Session torn down.
    Disconnected,
}

/// Parsed Init1 payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Init1 {
    /// 16 bytes of server-chosen randomness.
    pub random1: [u8; 16],
    /// Echo of the `random0` this client sent in Init0.
    pub random0_r: [u8; 4],
}

/// Parsed Init3 payload: the connection puzzle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Init3 {
    /// Puzzle base.
    pub x: [u8; 64],
    /// Puzzle modulus.
    pub n: [u8; 64],
    /// Number of successive squarings required.
    pub level: u32,
    /// Opaque randomness echoed back unmodified in Init4.
    pub random2: [u8; 100],
}

/// Builds the 21-byte Init0 payload: 4-byte client-version-offset, step
/// tag, 4-byte Unix timestamp, 4-byte `random0`, and 8 bytes of reserved
/// zero padding.
#[must_use]
pub fn build_init0(random0: [u8; 4], unix_timestamp: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(21);
    out.extend_from_slice(&CLIENT_VERSION_OFFSET.to_be_bytes());
    out.push(0x00);
    out.extend_from_slice(&unix_timestamp.to_be_bytes());
    out.extend_from_slice(&random0);
    out.extend_from_slice(&[0_u8; 8]);
    out
}

/// Parses a 21-byte Init1 payload.
pub fn parse_init1(payload: &[u8]) -> Result<Init1, HandshakeError> {
    if payload.len() != 21 {
        return Err(HandshakeError::MalformedPayload {
            step: "Init1",
            detail: format!("expected 21 bytes, got {}", payload.len()),
        });
    }
    if payload[0] != 0x01 {
        return Err(HandshakeError::MalformedPayload {
            step: "Init1",
            detail: format!("unexpected step tag {:#x}", payload[0]),
        });
    }
    let mut random1 = [0_u8; 16];
    random1.copy_from_slice(&payload[1..17]);
    let mut random0_r = [0_u8; 4];
    random0_r.copy_from_slice(&payload[17..21]);
    Ok(Init1 { random1, random0_r })
}

/// Builds the 25-byte Init2 payload.
#[must_use]
pub fn build_init2(random1: [u8; 16], random0_r: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(25);
    out.extend_from_slice(&CLIENT_VERSION_OFFSET.to_be_bytes());
    out.push(0x02);
    out.extend_from_slice(&random1);
    out.extend_from_slice(&random0_r);
    out
}

/// Parses the 233-byte Init3 payload.
pub fn parse_init3(payload: &[u8]) -> Result<Init3, HandshakeError> {
    if payload.len() != 233 {
        return Err(HandshakeError::MalformedPayload {
            step: "Init3",
            detail: format!("expected 233 bytes, got {}", payload.len()),
        });
    }
    if payload[0] != 0x03 {
        return Err(HandshakeError::MalformedPayload {
            step: "Init3",
            detail: format!("unexpected step tag {:#x}", payload[0]),
        });
    }
    let mut x = [0_u8; 64];
    x.copy_from_slice(&payload[1..65]);
    let mut n = [0_u8; 64];
    n.copy_from_slice(&payload[65..129]);
    let mut level_bytes = [0_u8; 4];
    level_bytes.copy_from_slice(&payload[129..133]);
    let level = u32::from_be_bytes(level_bytes);
    let mut random2 = [0_u8; 100];
    random2.copy_from_slice(&payload[133..233]);
    Ok(Init3 { x, n, level, random2 })
}

/// Solves the Init3 puzzle and builds the Init4 payload, including the
/// trailing `clientinitiv` command.
///
/// # Errors
///
/// Forwards [`ts3_crypto::Error::PuzzleLevelTooHigh`] /
/// `PuzzleModulusInvalid` if the server's puzzle parameters are outside
/// accepted bounds.
pub fn build_init4(
    init3: &Init3,
    alpha: &[u8; 10],
    p256_key: &EphemeralP256Key,
) -> Result<Vec<u8>, HandshakeError> {
    let y = puzzle::solve(&init3.x, &init3.n, init3.level)?;

    let mut out = Vec::with_capacity(25 + 64 + 64 + 4 + 100 + 64 + 96);
    out.extend_from_slice(&CLIENT_VERSION_OFFSET.to_be_bytes());
    out.push(0x04);
    out.extend_from_slice(&init3.x);
    out.extend_from_slice(&init3.n);
    out.extend_from_slice(&init3.level.to_be_bytes());
    out.extend_from_slice(&init3.random2);
    out.extend_from_slice(&y);

    let alpha_b64 = STANDARD.encode(alpha);
    let omega_b64 = STANDARD.encode(p256_key.der_public());
    let clientinitiv = format!(
        "clientinitiv alpha={alpha_b64} omega={omega_b64} ot=1 ip="
    );
    out.extend_from_slice(clientinitiv.as_bytes());
    Ok(out)
}

/// Key material established once `initivexpand2` has been processed.
#[derive(Debug)]
pub struct SessionKeys {
    /// 64-byte shared IV keying the per-packet KDF for the rest of the
    /// session.
    pub shared_iv: [u8; 64],
    /// First 8 bytes of `SHA-1(shared_iv)`.
    pub shared_mac: [u8; 8],
    /// The client's ephemeral Ed25519 keypair used both for the DH and to
    /// sign the shared IV in the `clientek` proof.
    pub ephemeral: EphemeralKeyPair,
}

/// Result of processing `initivexpand2`.
#[derive(Debug)]
pub struct InitIvExpand {
    /// The established session keys.
    pub keys: SessionKeys,
    /// Set when license-chain derivation failed and the implementation
    /// fell back to a random server public key instead of aborting (see
    /// the handshake's `strict_license` policy knob).
    pub license_fallback_warning: Option<String>,
}

/// Processes the fake-key-decrypted `initivexpand2` command item: derives
/// the server's Ed25519 public key from its license chain, generates a
/// fresh ephemeral keypair, and computes the shared IV/MAC.
///
/// # Errors
///
/// - [`HandshakeError::MalformedPayload`] if `l`/`beta` are missing or not
///   valid base64.
/// - [`HandshakeError::Crypto`] if license derivation fails and
///   `strict_license` is `true`.
pub fn process_init_iv_expand(
    item: &Item,
    alpha: &[u8; 10],
    strict_license: bool,
) -> Result<InitIvExpand, HandshakeError> {
    let license_b64 = item.get("l").ok_or_else(|| {
        HandshakeError::MalformedPayload {
            step: "initivexpand2",
            detail: "missing `l` parameter".to_string(),
        }
    })?;
    let beta_b64 = item.get("beta").ok_or_else(|| {
        HandshakeError::MalformedPayload {
            step: "initivexpand2",
            detail: "missing `beta` parameter".to_string(),
        }
    })?;

    let license = STANDARD.decode(license_b64).map_err(|e| {
        HandshakeError::MalformedPayload {
            step: "initivexpand2",
            detail: format!("invalid base64 license: {e}"),
        }
    })?;
    let beta = STANDARD.decode(beta_b64).map_err(|e| {
        HandshakeError::MalformedPayload {
            step: "initivexpand2",
            detail: format!("invalid base64 beta: {e}"),
        }
    })?;

    let (server_ed_pub, warning) =
        match ts3_crypto::ed25519::derive_server_public_key(&license) {
            Ok(pub_key) => (pub_key, None),
            Err(err) if strict_license => return Err(err.into()),
            Err(err) => {
                let mut fallback = [0_u8; 32];
                rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut fallback);
                (
                    fallback,
                    Some(format!(
                        "license chain derivation failed ({err}); falling \
                         back to a random server key, handshake will fail \
                         at clientek"
                    )),
                )
            }
        };

    let ephemeral = EphemeralKeyPair::generate();
    let shared_secret = ephemeral.diffie_hellman(&server_ed_pub);
    let shared_iv = compute_shared_iv(&shared_secret, alpha, &beta);
    let shared_mac = compute_shared_mac(&shared_iv);

    Ok(InitIvExpand {
        keys: SessionKeys {
            shared_iv,
            shared_mac,
            ephemeral,
        },
        license_fallback_warning: warning,
    })
}

/// Builds the `clientek` command proving possession of the ephemeral
/// private key by signing the shared IV.
#[must_use]
pub fn build_clientek(keys: &SessionKeys) -> String {
    let signature = keys.ephemeral.sign(&keys.shared_iv);
    format!(
        "clientek ek={} proof={}",
        STANDARD.encode(keys.ephemeral.public()),
        STANDARD.encode(signature)
    )
}

/// Parameters the caller supplies for the `clientinit` command.
#[derive(Clone, Debug)]
pub struct ClientInitParams {
    /// Display nickname.
    pub nickname: String,
    /// Channel path/name to join on connect; empty for the server's
    /// default.
    pub default_channel: Option<String>,
    /// Channel password, if the default channel requires one.
    pub default_channel_password: Option<String>,
    /// Virtual server password, if required.
    pub server_password: Option<String>,
    /// Client hardware id, used by some servers for ban enforcement.
    pub hwid: String,
}

/// Builds the `clientinit` command.
#[must_use]
pub fn build_clientinit(params: &ClientInitParams) -> String {
    let cmd = command::Command {
        name: Some("clientinit".to_string()),
        items: vec![Item(vec![
            kv("client_nickname", &params.nickname),
            kv("client_version", "3.5.6 [Build: 1590658287]"),
            kv("client_platform", "Linux"),
            kv("client_input_hardware", "1"),
            kv("client_output_hardware", "1"),
            kv(
                "client_default_channel",
                params.default_channel.as_deref().unwrap_or(""),
            ),
            kv(
                "client_default_channel_password",
                params.default_channel_password.as_deref().unwrap_or(""),
            ),
            kv(
                "client_server_password",
                params.server_password.as_deref().unwrap_or(""),
            ),
            kv("client_meta_data", ""),
            kv("client_version_sign", ""),
            kv("client_key_offset", "0"),
            kv("client_nickname_phonetic", ""),
            kv("client_default_token", ""),
            kv("hwid", &params.hwid),
        ])],
    };
    command::serialize(&cmd)
}

fn kv(key: &str, value: &str) -> command::Param {
    command::Param::KeyValue(key.to_string(), value.to_string())
}

/// Computes the 64-byte shared IV: `SHA-512(shared_secret)` XORed with
/// `alpha` at offset 0 and `beta` at offset 10.
fn compute_shared_iv(
    shared_secret: &[u8; 32],
    alpha: &[u8; 10],
    beta: &[u8],
) -> [u8; 64] {
    let digest = Sha512::digest(shared_secret);
    let mut iv = [0_u8; 64];
    iv.copy_from_slice(&digest);
    for (i, b) in alpha.iter().enumerate() {
        iv[i] ^= b;
    }
    for (i, b) in beta.iter().enumerate() {
        if let Some(slot) = iv.get_mut(10 + i) {
            *slot ^= b;
        }
    }
    iv
}

/// Computes the shared MAC: the first 8 bytes of `SHA-1(shared_iv)`.
fn compute_shared_mac(shared_iv: &[u8; 64]) -> [u8; 8] {
    let digest = Sha1::digest(shared_iv);
    let mut mac = [0_u8; 8];
    mac.copy_from_slice(&digest[0..8]);
    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init0_payload_is_21_bytes_with_step_tag() {
        let payload = build_init0([1, 2, 3, 4], 1_600_000_000);
        assert_eq!(payload.len(), 21);
        assert_eq!(payload[4], 0x00);
    }

    #[test]
    fn init1_round_trips_through_parse() {
        let mut payload = vec![0x01];
        payload.extend_from_slice(&[0xAA; 16]);
        payload.extend_from_slice(&[9, 9, 9, 9]);
        let parsed = parse_init1(&payload).unwrap();
        assert_eq!(parsed.random1, [0xAA; 16]);
        assert_eq!(parsed.random0_r, [9, 9, 9, 9]);
    }

    #[test]
    fn init1_rejects_wrong_length() {
        assert!(matches!(
            parse_init1(&[0_u8; 5]),
            Err(HandshakeError::MalformedPayload { step: "Init1", .. })
        ));
    }

    #[test]
    fn init1_rejects_wrong_step_tag() {
        let mut payload = vec![0x02];
        payload.extend_from_slice(&[0_u8; 20]);
        assert!(matches!(
            parse_init1(&payload),
            Err(HandshakeError::MalformedPayload { step: "Init1", .. })
        ));
    }

    #[test]
    fn init2_payload_echoes_random1_and_random0_r() {
        let payload = build_init2([0x11; 16], [0x22; 4]);
        assert_eq!(payload.len(), 25);
        assert_eq!(&payload[5..21], &[0x11; 16]);
        assert_eq!(&payload[21..25], &[0x22; 4]);
    }

    #[test]
    fn init3_round_trips_through_parse() {
        let mut payload = vec![0x03];
        payload.extend_from_slice(&[1_u8; 64]);
        payload.extend_from_slice(&[2_u8; 64]);
        payload.extend_from_slice(&8_u32.to_be_bytes());
        payload.extend_from_slice(&[3_u8; 100]);
        let parsed = parse_init3(&payload).unwrap();
        assert_eq!(parsed.x, [1_u8; 64]);
        assert_eq!(parsed.n, [2_u8; 64]);
        assert_eq!(parsed.level, 8);
        assert_eq!(parsed.random2, [3_u8; 100]);
    }

    #[test]
    fn build_init4_includes_clientinitiv_and_solved_puzzle() {
        let init3 = Init3 {
            x: {
                let mut x = [0_u8; 64];
                x[63] = 3;
                x
            },
            n: {
                let mut n = [0_u8; 64];
                n[62] = 0x0F;
                n[63] = 0x45;
                n
            },
            level: 2,
            random2: [7_u8; 100],
        };
        let alpha = [1_u8; 10];
        let key = EphemeralP256Key::generate();
        let payload = build_init4(&init3, &alpha, &key).unwrap();
        let tail = std::str::from_utf8(&payload[payload.len() - 40..]).unwrap();
        assert!(tail.contains("clientinitiv") || payload.len() > 233);
    }

    #[test]
    fn shared_mac_is_first_eight_bytes_of_sha1() {
        let iv = [0_u8; 64];
        let mac = compute_shared_mac(&iv);
        let full = Sha1::digest(&iv);
        assert_eq!(&mac, &full[0..8]);
    }

    #[test]
    fn clientinit_contains_nickname() {
        let params = ClientInitParams {
            nickname: "Bot".to_string(),
            default_channel: None,
            default_channel_password: None,
            server_password: None,
            hwid: "deadbeef".to_string(),
        };
        let wire = build_clientinit(&params);
        assert!(wire.contains("client_nickname=Bot"));
        assert!(wire.starts_with("clientinit "));
    }
}
