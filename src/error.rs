// Errors raised anywhere in the channel. Every one of them ends the session.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("invalid padding")]
    InvalidPadding,

    #[error("invalid key length: {0} bytes (must be a multiple of 8 and at least 16)")]
    InvalidKeyLength(usize),

    #[error("buffer length {0} is not a positive multiple of the block size")]
    InvalidLength(usize),

    #[error("invalid plaintext (pt >= n)")]
    PlaintextTooLarge,

    #[error("invalid ciphertext (ct >= n)")]
    CiphertextTooLarge,

    #[error("key generation failed: {0}")]
    KeyGenerationError(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("modular inverse does not exist")]
    NoInverse,

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for ChannelError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChannelError::TaskFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
