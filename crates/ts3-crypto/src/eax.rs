//! AES-128 [EAX] packet encryption with an 8-byte truncated tag, exactly as
//! the TS3 wire protocol authenticates every non-init packet (`MAC` field is
//! the first 8 bytes of the EAX tag over the post-MAC header as associated
//! data).
//!
//! [EAX]: https://en.wikipedia.org/wiki/EAX_mode

use aead::{generic_array::GenericArray, AeadInPlace, KeyInit};
use aes::Aes128;
use eax::Eax;

use crate::Error;

/// Length of an EAX key and nonce used by the TS3 protocol.
pub const KEY_LEN: usize = 16;

/// Length of the truncated EAX tag carried in the packet's `MAC` field.
pub const TAG_LEN: usize = 8;

type Cipher = Eax<Aes128, aead::consts::U8>;

/// Encrypts `plaintext` in place under `key`/`nonce`, authenticating
/// `header` (the packet's post-MAC bytes) as associated data, and returns
/// the 8-byte truncated tag.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; KEY_LEN],
    header: &[u8],
    plaintext: &mut Vec<u8>,
) -> [u8; TAG_LEN] {
    let cipher = Cipher::new(GenericArray::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            header,
            plaintext,
        )
        .expect("EAX encryption with fixed-size buffers cannot fail");
    let mut out = [0_u8; TAG_LEN];
    out.copy_from_slice(&tag);
    out
}

/// Decrypts `ciphertext` in place under `key`/`nonce`, verifying `header`
/// as associated data against the given truncated `tag`.
///
/// # Errors
///
/// Returns [`Error::TagMismatch`] if the tag does not verify. Per the
/// protocol, this must result in the packet being silently dropped, not in
/// any counter being advanced.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; KEY_LEN],
    header: &[u8],
    ciphertext: &mut Vec<u8>,
    tag: &[u8; TAG_LEN],
) -> Result<(), Error> {
    let cipher = Cipher::new(GenericArray::from_slice(key));
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            header,
            ciphertext,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| Error::TagMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(key: [u8; 16], nonce: [u8; 16], header: &[u8], msg: &[u8]) {
        let mut buf = msg.to_vec();
        let tag = seal(&key, &nonce, header, &mut buf);
        assert_ne!(buf, msg, "ciphertext must differ from plaintext");

        let mut opened = buf.clone();
        open(&key, &nonce, header, &mut opened, &tag).unwrap();
        assert_eq!(opened, msg);
    }

    #[test]
    fn encrypts_then_decrypts() {
        roundtrip(
            [0x11; 16],
            [0x22; 16],
            b"packet-id=42;client=7;type=2",
            b"sendtextmessage targetmode=2 msg=hi",
        );
        roundtrip([0; 16], [0; 16], b"", b"");
    }

    #[test]
    fn rejects_flipped_ciphertext_bit() {
        let key = [0x33; 16];
        let nonce = [0x44; 16];
        let header = b"hdr";
        let mut buf = b"payload".to_vec();
        let tag = seal(&key, &nonce, header, &mut buf);

        buf[0] ^= 0x01;
        assert_eq!(open(&key, &nonce, header, &mut buf, &tag), Err(Error::TagMismatch));
    }

    #[test]
    fn rejects_flipped_header_bit() {
        let key = [0x33; 16];
        let nonce = [0x44; 16];
        let mut buf = b"payload".to_vec();
        let tag = seal(&key, &nonce, b"hdr0", &mut buf);

        assert_eq!(
            open(&key, &nonce, b"hdr1", &mut buf, &tag),
            Err(Error::TagMismatch)
        );
    }

    #[test]
    fn rejects_flipped_tag_bit() {
        let key = [0x33; 16];
        let nonce = [0x44; 16];
        let header = b"hdr";
        let mut buf = b"payload".to_vec();
        let mut tag = seal(&key, &nonce, header, &mut buf);
        tag[0] ^= 0x80;

        assert_eq!(open(&key, &nonce, header, &mut buf, &tag), Err(Error::TagMismatch));
    }
}
