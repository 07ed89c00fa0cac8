// Settings shared by the client and server.
use std::time::Duration;

use crate::aes::{check_key_length, BLOCK_SIZE};
use crate::{ChannelError, Result};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_KEY_BYTES: usize = 32;
pub const DEFAULT_PRIME_BITS: u64 = 1024;
pub const DEFAULT_MAX_SESSIONS: usize = 64;
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Longest line, in characters, either side accepts as one frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 * 1024;
pub const MAX_PRIME_BITS: u64 = 8192;

/// The line a client types to end its session.
pub const EXIT_SENTINEL: &str = "exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    /// Length of the AES key the server draws. The IV adds one more block.
    pub key_bytes: usize,
    /// Bit length of each of the client's RSA primes.
    pub prime_bits: u64,
    pub max_sessions: usize,
    pub drain_timeout: Duration,
    pub max_frame_len: usize,
}

impl ChannelConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn key_material_len(&self) -> usize {
        self.key_bytes + BLOCK_SIZE
    }

    /// Smallest modulus the product of two `prime_bits`-bit primes can have.
    pub fn min_modulus_bits(&self) -> u64 {
        self.prime_bits.saturating_mul(2).saturating_sub(1)
    }

    pub fn validate(&self) -> Result<()> {
        check_key_length(self.key_bytes)?;
        if !(2..=MAX_PRIME_BITS).contains(&self.prime_bits) {
            return Err(ChannelError::KeyGenerationError(format!(
                "prime size of {} bits is outside 2..={}",
                self.prime_bits, MAX_PRIME_BITS
            )));
        }
        // The key material has to stay below the smallest possible modulus,
        // 2^(2 * prime_bits - 2).
        let modulus_bytes = (self.min_modulus_bits() - 1) / 8;
        if self.key_material_len() as u64 > modulus_bytes {
            return Err(ChannelError::KeyGenerationError(format!(
                "{}-bit primes cannot carry {} bytes of key material",
                self.prime_bits,
                self.key_material_len()
            )));
        }
        // Two hex digits per byte of a full-size modulus.
        let handshake_frame_len = 2 * (2 * self.prime_bits as usize).div_ceil(8);
        if self.max_frame_len < handshake_frame_len {
            return Err(ChannelError::MalformedFrame(format!(
                "frame limit of {} is below the {} characters a handshake needs",
                self.max_frame_len, handshake_frame_len
            )));
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            key_bytes: DEFAULT_KEY_BYTES,
            prime_bits: DEFAULT_PRIME_BITS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn default_config_is_valid() {
        let config = ChannelConfig::new(4000);

        assert!(config.validate().is_ok());
        assert_eq!(config.address(), "0.0.0.0:4000");
        assert_eq!(config.key_material_len(), 48);
    }

    #[rstest]
    #[case(16, 1024, true)]
    #[case(24, 256, true)]
    #[case(20, 1024, false)]
    #[case(8, 1024, false)]
    #[case(32, 128, false)]
    #[case(32, 1, false)]
    fn validate_checks_key_and_prime_sizes(
        #[case] key_bytes: usize,
        #[case] prime_bits: u64,
        #[case] valid: bool,
    ) {
        let config = ChannelConfig {
            key_bytes,
            prime_bits,
            ..ChannelConfig::default()
        };

        assert_eq!(config.validate().is_ok(), valid);
    }

    #[rstest]
    #[case(MAX_PRIME_BITS + 1)]
    #[case(u64::MAX / 2 + 1)]
    #[case(u64::MAX)]
    fn validate_rejects_huge_prime_sizes_without_overflow(#[case] prime_bits: u64) {
        let config = ChannelConfig {
            prime_bits,
            ..ChannelConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ChannelError::KeyGenerationError(_))
        ));
    }

    #[rstest]
    #[case(1024, 2047)]
    #[case(256, 511)]
    #[case(2, 3)]
    #[case(u64::MAX, u64::MAX)]
    fn min_modulus_bits_is_one_below_twice_the_prime_size(
        #[case] prime_bits: u64,
        #[case] expected: u64,
    ) {
        let config = ChannelConfig {
            prime_bits,
            ..ChannelConfig::default()
        };

        assert_eq!(config.min_modulus_bits(), expected);
    }

    #[test]
    fn validate_rejects_frame_limit_too_small_for_handshake() {
        let config = ChannelConfig {
            max_frame_len: 511,
            ..ChannelConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ChannelError::MalformedFrame(_))
        ));
        assert!(ChannelConfig {
            max_frame_len: 512,
            ..ChannelConfig::default()
        }
        .validate()
        .is_ok());
    }
}
