// The symmetric half of the channel.
//
// Every message is padded, CBC-encrypted and hex-encoded on its own. Each one
// starts the CBC chain again from the IV fixed at handshake time, so equal
// messages within a session produce equal frames.
use crate::aes::BLOCK_SIZE;
use crate::transport::FrameTransport;
use crate::{
    bytes_to_hex, decrypt_cbc, encrypt_cbc, hex_to_bytes, pkcs7_pad, pkcs7_unpad, ChannelError,
    RandomSource, Result,
};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// An AES key followed by a one-block IV, exactly as sent during the
/// handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKeyMaterial {
    bytes: Vec<u8>,
}

impl SymmetricKeyMaterial {
    pub fn generate(key_bytes: usize, source: &RandomSource) -> Result<Self> {
        crate::aes::check_key_length(key_bytes)?;
        Self::from_bytes(source.random_bytes(key_bytes + BLOCK_SIZE))
    }

    pub fn from_parts(key: &[u8], iv: &[u8; BLOCK_SIZE]) -> Result<Self> {
        Self::from_bytes([key, iv.as_slice()].concat())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < BLOCK_SIZE {
            return Err(ChannelError::Handshake(format!(
                "{} bytes of key material cannot hold a {}-byte IV",
                bytes.len(),
                BLOCK_SIZE
            )));
        }
        crate::aes::check_key_length(bytes.len() - BLOCK_SIZE)?;
        Ok(Self { bytes })
    }

    pub fn key(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - BLOCK_SIZE]
    }

    pub fn iv(&self) -> [u8; BLOCK_SIZE] {
        let mut iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&self.bytes[self.bytes.len() - BLOCK_SIZE..]);
        iv
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Pad, encrypt and hex-encode one message into a frame.
    pub fn seal(&self, message: &[u8]) -> Result<String> {
        let padded = pkcs7_pad(message, BLOCK_SIZE as u8);
        let ciphertext = encrypt_cbc(&padded, self.key(), &self.iv())?;
        Ok(bytes_to_hex(&ciphertext))
    }

    /// Reverse `seal`. Tampered frames surface as `InvalidPadding` or as a
    /// different message; CBC carries no integrity check.
    pub fn open(&self, frame: &str) -> Result<Vec<u8>> {
        let ciphertext = hex_to_bytes(frame)?;
        let padded = decrypt_cbc(&ciphertext, self.key(), &self.iv())?;
        pkcs7_unpad(&padded, BLOCK_SIZE as u8)
    }
}

impl std::fmt::Debug for SymmetricKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKeyMaterial")
            .field("key_bytes", &self.key().len())
            .finish_non_exhaustive()
    }
}

pub struct SecureSession<S> {
    transport: FrameTransport<S>,
    keys: SymmetricKeyMaterial,
}

impl<S: AsyncRead + AsyncWrite> SecureSession<S> {
    pub fn new(transport: FrameTransport<S>, keys: SymmetricKeyMaterial) -> Self {
        Self { transport, keys }
    }

    pub fn peer(&self) -> &str {
        self.transport.peer()
    }

    pub async fn send_message(&mut self, message: &[u8]) -> Result<()> {
        let frame = self.keys.seal(message)?;
        debug!(peer = self.peer(), n_bytes = message.len(), "sending message");
        self.transport.send_frame(&frame).await
    }

    pub async fn recv_message(&mut self) -> Result<Vec<u8>> {
        let frame = self.transport.recv_frame().await?;
        let message = self.keys.open(&frame)?;
        debug!(peer = self.peer(), n_bytes = message.len(), "received message");
        Ok(message)
    }

    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }
}
