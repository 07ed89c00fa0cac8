// Modular arithmetic helpers on top of num-bigint.
use crate::{ChannelError, Result};

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// `base ^ exponent mod modulus`. Panics if `modulus` is zero.
pub fn mod_pow(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
    base.modpow(exponent, modulus)
}

/// The `x` in `[0, m)` with `a * x = 1 mod m`.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Result<BigUint> {
    if m.is_zero() || greatest_common_divisor(a.clone(), m.clone()) != BigUint::one() {
        return Err(ChannelError::NoInverse);
    }
    a.modinv(m).ok_or(ChannelError::NoInverse)
}

pub fn greatest_common_divisor(mut a: BigUint, mut b: BigUint) -> BigUint {
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}
