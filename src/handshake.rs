// Key exchange.
//
//   client -> server   hex(n)
//   client -> server   hex(e)
//   server -> client   hex(RSA(key || iv))
//
// The public key is taken on trust; nothing here authenticates either side.
use crate::aes::BLOCK_SIZE;
use crate::session::SymmetricKeyMaterial;
use crate::transport::FrameTransport;
use crate::{
    bytes_to_hex, hex_to_bytes, ChannelError, RandomSource, Result, RsaPrivateKey, RsaPublicKey,
};

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Generate the client's key pair on the blocking pool. Prime search is pure
/// CPU work and would otherwise stall the runtime.
pub async fn generate_key_pair(
    prime_bits: u64,
    source: Arc<RandomSource>,
) -> Result<RsaPrivateKey> {
    debug!(prime_bits, "generating RSA key pair");
    let key = tokio::task::spawn_blocking(move || {
        RsaPrivateKey::generate(prime_bits, prime_bits, &source)
    })
    .await??;
    debug!(modulus_bits = key.n().bits(), "RSA key pair ready");
    Ok(key)
}

/// Client side: publish `key`'s public half and recover the session keys the
/// server sends back.
///
/// The AES key size is whatever the server chose. With `expected_key_bytes`
/// set, any other size fails the handshake.
pub async fn client_handshake<S>(
    transport: &mut FrameTransport<S>,
    key: &RsaPrivateKey,
    expected_key_bytes: Option<usize>,
) -> Result<SymmetricKeyMaterial>
where
    S: AsyncRead + AsyncWrite,
{
    let public = key.public_key();
    transport.send_frame(&bytes_to_hex(&public.n().to_bytes_be())).await?;
    transport.send_frame(&bytes_to_hex(&public.e().to_bytes_be())).await?;
    debug!(peer = transport.peer(), "sent public key");

    let frame = transport.recv_frame().await?;
    let ciphertext = hex_to_bytes(&frame)?;
    let material = key.decrypt(&ciphertext)?;
    let material = restore_leading_zeros(material);
    let key_bytes = material.len() - BLOCK_SIZE;
    if let Some(expected) = expected_key_bytes {
        if key_bytes != expected {
            return Err(ChannelError::Handshake(format!(
                "server sent a {key_bytes}-byte key, expected {expected}"
            )));
        }
    }
    let keys = SymmetricKeyMaterial::from_bytes(material)?;

    info!(peer = transport.peer(), key_bytes, "handshake complete");
    Ok(keys)
}

/// Server side: read the client's public key, draw fresh session keys and
/// send them back encrypted under it. Moduli shorter than
/// `min_modulus_bits` are refused.
pub async fn server_handshake<S>(
    transport: &mut FrameTransport<S>,
    source: &RandomSource,
    key_bytes: usize,
    min_modulus_bits: u64,
) -> Result<SymmetricKeyMaterial>
where
    S: AsyncRead + AsyncWrite,
{
    let n = hex_to_bytes(&transport.recv_frame().await?)?;
    let e = hex_to_bytes(&transport.recv_frame().await?)?;
    let public = RsaPublicKey::from_be_bytes(&n, &e)?;
    let modulus_bits = public.n().bits();
    debug!(peer = transport.peer(), modulus_bits, "received public key");
    if modulus_bits < min_modulus_bits {
        return Err(ChannelError::InvalidPublicKey(format!(
            "{modulus_bits}-bit modulus is below the {min_modulus_bits}-bit minimum"
        )));
    }

    let keys = SymmetricKeyMaterial::generate(key_bytes, source)?;
    let ciphertext = public.encrypt(keys.as_bytes())?;
    transport.send_frame(&bytes_to_hex(&ciphertext)).await?;

    info!(peer = transport.peer(), key_bytes, "handshake complete");
    Ok(keys)
}

// RSA results come back minimally encoded, so key material that happened to
// start with zero bytes arrives short. Valid material is a key of 16 + 8k
// bytes plus the IV, so the true length is the next multiple of 8 from 32.
fn restore_leading_zeros(material: Vec<u8>) -> Vec<u8> {
    let len = material.len().next_multiple_of(8).max(2 * BLOCK_SIZE);
    let mut padded = vec![0u8; len - material.len()];
    padded.extend_from_slice(&material);
    padded
}
