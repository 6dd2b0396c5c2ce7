//! Standalone OMAC1/[CMAC] under AES-128, as specified by [NIST SP 800-38B].
//!
//! [EAX] itself builds its three internal MAC invocations (`N`, `H`, `C`) on
//! top of this same primitive, prefixed with a one-block tweak; that
//! composition is exercised indirectly through [`crate::eax`]'s tests. This
//! module exposes the bare, untweaked primitive so it can be checked
//! directly against the published test vectors.
//!
//! [CMAC]: https://en.wikipedia.org/wiki/One-key_MAC
//! [EAX]: crate::eax
//! [NIST SP 800-38B]: https://csrc.nist.gov/publications/detail/sp/800-38b/final

use aes::Aes128;
use cmac::{Cmac, Mac};

/// Computes OMAC1/CMAC-AES-128 over `message`, returning the full 16-byte
/// tag.
pub fn cmac_aes128(key: &[u8; 16], message: &[u8]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key)
        .expect("AES-128 key is always a valid CMAC key");
    mac.update(message);
    let tag = mac.finalize().into_bytes();
    let mut out = [0_u8; 16];
    out.copy_from_slice(&tag);
    out
}

#[cfg(test)]
mod tests {
    use super::cmac_aes128;

    // NIST SP 800-38B, Appendix D.1 (AES-128) test vectors.
    const KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88,
        0x09, 0xcf, 0x4f, 0x3c,
    ];

    const MESSAGE: [u8; 64] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11,
        0x73, 0x93, 0x17, 0x2a, 0xae, 0x2d, 0x8a, 0x57, 0x1e, 0x03, 0xac, 0x9c,
        0x9e, 0xb7, 0x6f, 0xac, 0x45, 0xaf, 0x8e, 0x51, 0x30, 0xc8, 0x1c, 0x46,
        0xa3, 0x5c, 0xe4, 0x11, 0xe5, 0xfb, 0xc1, 0x19, 0x1a, 0x0a, 0x52, 0xef,
        0xf6, 0x9f, 0x24, 0x45, 0xdf, 0x4f, 0x9b, 0x17, 0xad, 0x2b, 0x41, 0x7b,
        0xe6, 0x6c, 0x37, 0x10,
    ];

    #[test]
    fn matches_nist_empty_message() {
        let expected: [u8; 16] = [
            0xbb, 0x1d, 0x69, 0x29, 0xe9, 0x59, 0x37, 0x28, 0x7f, 0xa3, 0x7d,
            0x12, 0x9b, 0x75, 0x67, 0x46,
        ];
        assert_eq!(cmac_aes128(&KEY, &[]), expected);
    }

    #[test]
    fn matches_nist_one_block() {
        let expected: [u8; 16] = [
            0x07, 0x0a, 0x16, 0xb4, 0x6b, 0x4d, 0x41, 0x44, 0xf7, 0x9b, 0xdd,
            0x9d, 0xd0, 0x4a, 0x28, 0x7c,
        ];
        assert_eq!(cmac_aes128(&KEY, &MESSAGE[..16]), expected);
    }

    #[test]
    fn matches_nist_partial_block() {
        let expected: [u8; 16] = [
            0x7d, 0x85, 0x44, 0x9e, 0xa6, 0xea, 0x19, 0xc8, 0x23, 0xa7, 0xbf,
            0x78, 0x83, 0x7d, 0xfa, 0xde,
        ];
        assert_eq!(cmac_aes128(&KEY, &MESSAGE[..40]), expected);
    }

    #[test]
    fn matches_nist_four_blocks() {
        let expected: [u8; 16] = [
            0x51, 0xf0, 0xbe, 0xbf, 0x7e, 0x3b, 0x9d, 0x92, 0xfc, 0x49, 0x74,
            0x17, 0x79, 0x36, 0x3c, 0xfe,
        ];
        assert_eq!(cmac_aes128(&KEY, &MESSAGE), expected);
    }

    #[test]
    fn flipped_byte_changes_tag() {
        let mut tampered = MESSAGE;
        tampered[0] ^= 1;
        assert_ne!(cmac_aes128(&KEY, &MESSAGE), cmac_aes128(&KEY, &tampered));
    }
}
