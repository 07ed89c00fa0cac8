// Functions related to identification and generation of prime numbers.

use crate::prime_tables::SMALL_ODD_PRIMES;
use crate::{ChannelError, Result};

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::Rng;

const MILLER_RABIN_ROUNDS: u32 = 5;

pub fn is_likely_prime<R: Rng + ?Sized>(
    candidate_prime: &BigUint,
    miller_rabin_rng: &mut R,
) -> bool {
    let one = BigUint::one();
    if candidate_prime.is_zero() || candidate_prime == &one {
        return false;
    }
    let two = BigUint::from(2u64);
    if candidate_prime == &two {
        return true;
    }
    if !candidate_prime.bit(0) {
        return false;
    }

    for small_prime in SMALL_ODD_PRIMES {
        let x = BigUint::from(small_prime);
        if candidate_prime == &x {
            return true;
        }
        if (candidate_prime % &x).is_zero() {
            return false;
        }
    }

    miller_rabin(candidate_prime, MILLER_RABIN_ROUNDS, miller_rabin_rng)
}

fn miller_rabin<R: Rng + ?Sized>(candidate_prime: &BigUint, n_rounds: u32, rng: &mut R) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u64);
    let n_minus_one = candidate_prime - &one;

    // Write n - 1 = d * 2^r with d odd.
    let mut d = n_minus_one.clone();
    let mut r = 0;
    while !d.bit(0) {
        d >>= 1;
        r += 1;
    }
    'witness: for _ in 0..n_rounds {
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        let mut x = a.modpow(&d, candidate_prime);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 0..(r - 1) {
            x = x.modpow(&two, candidate_prime);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }

    true
}

/// The smallest probable prime greater than or equal to `start`.
pub fn next_prime<R: Rng + ?Sized>(start: &BigUint, rng: &mut R) -> BigUint {
    let two = BigUint::from(2u64);
    if start <= &two {
        return two;
    }
    let mut candidate = start.clone();
    if !candidate.bit(0) {
        candidate += 1u32;
    }
    while !is_likely_prime(&candidate, rng) {
        candidate += 2u32;
    }
    candidate
}

/// Draw a random prime of exactly `n_bits` bits.
///
/// Each draw is an odd integer with its top bit set, advanced to the next
/// prime. When that search runs past `n_bits` bits the draw is thrown away.
pub fn random_prime<R: Rng + ?Sized>(n_bits: u64, rng: &mut R) -> Result<BigUint> {
    if n_bits < 2 {
        return Err(ChannelError::KeyGenerationError(format!(
            "cannot draw a {n_bits}-bit prime"
        )));
    }
    let top_bit = BigUint::one() << (n_bits - 1);
    loop {
        let sample = rng.gen_biguint(n_bits) | &top_bit | BigUint::one();
        let prime = next_prime(&sample, rng);
        if prime.bits() == n_bits {
            return Ok(prime);
        }
    }
}
