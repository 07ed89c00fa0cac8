// Client driver: connect, run the handshake, then forward lines of input as
// encrypted messages until the user types the exit sentinel.
use crate::config::{ChannelConfig, EXIT_SENTINEL};
use crate::handshake::{client_handshake, generate_key_pair};
use crate::session::SecureSession;
use crate::transport::FrameTransport;
use crate::{RandomSource, Result, RsaPrivateKey};

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

pub struct Client {
    session: SecureSession<TcpStream>,
}

impl Client {
    /// Connect to `config.address()`, generate a fresh key pair and complete
    /// the handshake. The server picks the AES key size; pass
    /// `expected_key_bytes` to insist on one.
    pub async fn connect(
        config: &ChannelConfig,
        source: Arc<RandomSource>,
        expected_key_bytes: Option<usize>,
    ) -> Result<Self> {
        let transport = FrameTransport::connect(config.address())
            .await?
            .with_max_frame_len(config.max_frame_len);
        info!(peer = transport.peer(), "connected to server");
        let key = generate_key_pair(config.prime_bits, source).await?;
        Self::handshake(transport, &key, expected_key_bytes).await
    }

    /// Complete the handshake over an already open connection with an
    /// existing key pair.
    pub async fn handshake(
        mut transport: FrameTransport<TcpStream>,
        key: &RsaPrivateKey,
        expected_key_bytes: Option<usize>,
    ) -> Result<Self> {
        let keys = client_handshake(&mut transport, key, expected_key_bytes).await?;
        Ok(Self {
            session: SecureSession::new(transport, keys),
        })
    }

    pub async fn send(&mut self, message: &str) -> Result<()> {
        self.session.send_message(message.as_bytes()).await
    }

    /// Send every line of `input` until it reads `exit` or runs dry.
    /// Returns the number of messages sent.
    pub async fn forward_lines<R>(&mut self, input: R) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut n_sent = 0;
        while let Some(line) = lines.next_line().await? {
            let line = line.trim_end_matches('\r');
            if line == EXIT_SENTINEL {
                debug!("exit requested");
                break;
            }
            self.send(line).await?;
            n_sent += 1;
        }
        Ok(n_sent)
    }

    pub async fn close(mut self) -> Result<()> {
        self.session.close().await?;
        info!("connection closed");
        Ok(())
    }
}
