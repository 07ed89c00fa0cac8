mod aes;
mod bigint;
mod cbc;
mod client;
mod config;
mod error;
mod handshake;
mod hex;
mod pkcs7;
mod prime;
mod prime_tables;
mod random;
mod rsa;
mod server;
mod session;
mod transport;

pub use aes::{check_key_length, AesCipher, KeySchedule, BLOCK_SIZE};
pub use bigint::{greatest_common_divisor, mod_inverse, mod_pow};
pub use cbc::{decrypt_cbc, encrypt_cbc};
pub use client::Client;
pub use config::{
    ChannelConfig, DEFAULT_DRAIN_TIMEOUT, DEFAULT_HOST, DEFAULT_KEY_BYTES, DEFAULT_MAX_FRAME_LEN,
    DEFAULT_MAX_SESSIONS, DEFAULT_PRIME_BITS, EXIT_SENTINEL, MAX_PRIME_BITS,
};
pub use error::{ChannelError, Result};
pub use handshake::{client_handshake, generate_key_pair, server_handshake};
pub use hex::{bytes_to_hex, hex_to_bytes};
pub use pkcs7::{pkcs7_check_invalid, pkcs7_pad, pkcs7_unpad};
pub use prime::{is_likely_prime, next_prime, random_prime};
pub use random::RandomSource;
pub use rsa::{RsaPrivateKey, RsaPublicKey, PUBLIC_EXPONENT};
pub use server::{ReceivedMessage, Server};
pub use session::{SecureSession, SymmetricKeyMaterial};
pub use transport::FrameTransport;
