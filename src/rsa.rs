// Textbook RSA with a fixed public exponent.
//
// Messages are treated as unsigned big-endian integers and results come back
// in their minimal big-endian encoding, so a result may be shorter than the
// buffer that went in.

use crate::{mod_inverse, mod_pow, random_prime, ChannelError, RandomSource, Result};

use num_bigint::BigUint;
use num_traits::One;

pub const PUBLIC_EXPONENT: u64 = 65537;

pub struct RsaPrivateKey {
    p: BigUint,
    q: BigUint,
    n: BigUint,
    e: BigUint,
    d: BigUint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    n: BigUint,
    e: BigUint,
}

impl RsaPrivateKey {
    /// Draw fresh primes of `p_bits` and `q_bits` bits and derive a key pair.
    ///
    /// The two prime searches run in parallel, each on its own generator
    /// forked from `source`. Not retried when `e` turns out to share a factor
    /// with the totient.
    pub fn generate(p_bits: u64, q_bits: u64, source: &RandomSource) -> Result<Self> {
        let mut p_rng = source.fork();
        let mut q_rng = source.fork();
        let (p, q) = rayon::join(
            || random_prime(p_bits, &mut p_rng),
            || random_prime(q_bits, &mut q_rng),
        );
        let (p, q) = (p?, q?);
        if p == q {
            return Err(ChannelError::KeyGenerationError(
                "drew the same prime twice".to_string(),
            ));
        }
        Self::from_primes(p, q)
    }

    pub fn from_primes(p: BigUint, q: BigUint) -> Result<Self> {
        let one = BigUint::one();
        let e = BigUint::from(PUBLIC_EXPONENT);
        let n = &p * &q;
        let totient = (&p - &one) * (&q - &one);
        let d = mod_inverse(&e, &totient).map_err(|_| {
            ChannelError::KeyGenerationError(
                "public exponent is not invertible modulo the totient".to_string(),
            )
        })?;
        Ok(Self { p, q, n, e, d })
    }

    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey {
            n: self.n.clone(),
            e: self.e.clone(),
        }
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        rsa_apply(&self.d, &self.n, ciphertext).ok_or(ChannelError::CiphertextTooLarge)
    }

    /// Apply the private exponent to a message, i.e. a raw signature.
    pub fn encrypt(&self, message: &[u8]) -> Result<Vec<u8>> {
        rsa_apply(&self.d, &self.n, message).ok_or(ChannelError::PlaintextTooLarge)
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn q(&self) -> &BigUint {
        &self.q
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn e(&self) -> &BigUint {
        &self.e
    }

    pub fn d(&self) -> &BigUint {
        &self.d
    }
}

impl RsaPublicKey {
    pub fn new(n: BigUint, e: BigUint) -> Result<Self> {
        if n <= BigUint::one() {
            return Err(ChannelError::InvalidPublicKey(format!(
                "modulus must be greater than one, got {n}"
            )));
        }
        if e < BigUint::one() {
            return Err(ChannelError::InvalidPublicKey(
                "exponent must be positive".to_string(),
            ));
        }
        Ok(Self { n, e })
    }

    pub fn from_be_bytes(n: &[u8], e: &[u8]) -> Result<Self> {
        Self::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
    }

    pub fn encrypt(&self, message: &[u8]) -> Result<Vec<u8>> {
        rsa_apply(&self.e, &self.n, message).ok_or(ChannelError::PlaintextTooLarge)
    }

    /// Undo `RsaPrivateKey::encrypt`, i.e. recover a raw signature's message.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        rsa_apply(&self.e, &self.n, ciphertext).ok_or(ChannelError::CiphertextTooLarge)
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn e(&self) -> &BigUint {
        &self.e
    }
}

impl From<&RsaPrivateKey> for RsaPublicKey {
    fn from(key: &RsaPrivateKey) -> Self {
        key.public_key()
    }
}

// None when the message, as an integer, does not fit below the modulus.
fn rsa_apply(key: &BigUint, n: &BigUint, msg: &[u8]) -> Option<Vec<u8>> {
    let msg_int = BigUint::from_bytes_be(msg);
    if &msg_int >= n {
        return None;
    }
    Some(mod_pow(&msg_int, key, n).to_bytes_be())
}
