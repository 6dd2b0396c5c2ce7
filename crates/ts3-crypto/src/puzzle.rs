//! The "RSA puzzle" the server poses in Init3: `y = x^(2^level) mod n`,
//! computed as `level` successive modular squarings over 512-bit unsigned
//! big-endian integers.

use num_bigint::BigUint;

use crate::Error;

/// Width, in bytes, of `x`, `n` and `y`.
pub const WIDTH: usize = 64;

/// Safety ceiling on `level`. A hostile or misconfigured server that sends
/// a `level` above this is rejected without running a single squaring,
/// because the cost is otherwise attacker-controlled and unbounded.
pub const LEVEL_CEILING: u32 = 10_000_000;

/// Solves `y = x^(2^level) mod n`.
///
/// # Errors
///
/// - [`Error::PuzzleLevelTooHigh`] if `level` exceeds [`LEVEL_CEILING`].
/// - [`Error::PuzzleModulusInvalid`] if `n` is zero.
pub fn solve(
    x: &[u8; WIDTH],
    n: &[u8; WIDTH],
    level: u32,
) -> Result<[u8; WIDTH], Error> {
    if level > LEVEL_CEILING {
        return Err(Error::PuzzleLevelTooHigh);
    }
    let modulus = BigUint::from_bytes_be(n);
    if modulus == BigUint::from(0_u32) {
        return Err(Error::PuzzleModulusInvalid);
    }

    let mut y = BigUint::from_bytes_be(x) % &modulus;
    for _ in 0..level {
        y = (&y * &y) % &modulus;
    }

    let bytes = y.to_bytes_be();
    let mut out = [0_u8; WIDTH];
    out[WIDTH - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widen(v: u64) -> [u8; WIDTH] {
        let mut out = [0_u8; WIDTH];
        out[WIDTH - 8..].copy_from_slice(&v.to_be_bytes());
        out
    }

    fn narrow(out: &[u8; WIDTH]) -> u64 {
        let mut b = [0_u8; 8];
        b.copy_from_slice(&out[WIDTH - 8..]);
        u64::from_be_bytes(b)
    }

    #[test]
    fn matches_reference_bignum_computation() {
        // y = 3^(2^4) mod 1000003 = 3^16 mod 1000003, computed two
        // independent ways: direct repeated multiplication (the reference)
        // and repeated squaring (what `solve` does internally).
        let x = widen(3);
        let n = widen(1_000_003);
        let y = solve(&x, &n, 4).unwrap();

        let reference = {
            let mut acc: u128 = 1;
            for _ in 0..16 {
                acc = (acc * 3) % 1_000_003;
            }
            acc
        };
        assert_eq!(narrow(&y), reference as u64);
    }

    #[test]
    fn zero_level_is_identity_mod_n() {
        let x = widen(12345);
        let n = widen(1_000_003);
        let y = solve(&x, &n, 0).unwrap();
        assert_eq!(narrow(&y), 12345);
    }

    #[test]
    fn level_over_ceiling_rejects_without_running() {
        let x = widen(2);
        let n = widen(1_000_003);
        assert_eq!(
            solve(&x, &n, LEVEL_CEILING + 1),
            Err(Error::PuzzleLevelTooHigh)
        );
    }

    #[test]
    fn zero_modulus_is_rejected() {
        let x = widen(2);
        let n = [0_u8; WIDTH];
        assert_eq!(solve(&x, &n, 1), Err(Error::PuzzleModulusInvalid));
    }
}
