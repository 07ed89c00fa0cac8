// Connection supervisor.
//
// Each accepted connection gets its own worker task holding one permit from a
// semaphore sized by `max_sessions`. Workers own their socket and keys; the
// only thing they share is the random source and the inbox messages are
// delivered to. Shutdown stops the accept loop, tells every worker to stop
// waiting on its peer, and gives them `drain_timeout` to finish before the
// rest are aborted.
use crate::config::ChannelConfig;
use crate::handshake::server_handshake;
use crate::session::SecureSession;
use crate::transport::FrameTransport;
use crate::{ChannelError, RandomSource, Result};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

const ACCEPT_RETRY_BASE: Duration = Duration::from_millis(10);
const ACCEPT_RETRY_MAX: Duration = Duration::from_secs(1);

/// A decrypted message and the peer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub peer: String,
    pub body: Vec<u8>,
}

impl ReceivedMessage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct Server {
    listener: TcpListener,
    config: Arc<ChannelConfig>,
    source: Arc<RandomSource>,
    inbox: mpsc::UnboundedSender<ReceivedMessage>,
}

impl Server {
    pub async fn bind(
        config: ChannelConfig,
        source: Arc<RandomSource>,
        inbox: mpsc::UnboundedSender<ReceivedMessage>,
    ) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.address()).await?;
        info!(address = %listener.local_addr()?, "server listening");
        Ok(Self {
            listener,
            config: Arc::new(config),
            source,
            inbox,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` turns true (or its sender is dropped), then
    /// drain the workers still running.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.config.max_sessions));
        let mut workers = JoinSet::new();
        let mut accept_failures = 0u32;

        loop {
            let permit = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                Some(joined) = workers.join_next() => {
                    report_worker_exit(joined);
                    continue;
                }
                permit = Arc::clone(&permits).acquire_owned() => {
                    permit.map_err(|e| ChannelError::TaskFailed(e.to_string()))?
                }
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        accept_failures = accept_failures.saturating_add(1);
                        let delay = accept_retry_delay(accept_failures);
                        warn!(error = %e, retry_in = ?delay, "failed to accept connection");
                        tokio::select! {
                            _ = shutdown_requested(&mut shutdown) => break,
                            _ = tokio::time::sleep(delay) => continue,
                        }
                    }
                },
            };
            accept_failures = 0;

            info!(%peer, "client connected");
            let worker = SessionWorker {
                config: Arc::clone(&self.config),
                source: Arc::clone(&self.source),
                inbox: self.inbox.clone(),
                shutdown: shutdown.clone(),
            };
            workers.spawn(async move {
                let _permit = permit;
                match worker.serve(stream, peer).await {
                    Ok(()) => info!(%peer, "connection closed"),
                    Err(e) => error!(%peer, error = %e, "session failed"),
                }
            });
        }

        info!("server shutting down");
        drain(workers, self.config.drain_timeout).await;
        info!("server closed");
        Ok(())
    }
}

struct SessionWorker {
    config: Arc<ChannelConfig>,
    source: Arc<RandomSource>,
    inbox: mpsc::UnboundedSender<ReceivedMessage>,
    shutdown: watch::Receiver<bool>,
}

impl SessionWorker {
    async fn serve(mut self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut transport = FrameTransport::new(stream, peer.to_string())
            .with_max_frame_len(self.config.max_frame_len);
        let (key_bytes, min_modulus_bits) =
            (self.config.key_bytes, self.config.min_modulus_bits());

        let keys = tokio::select! {
            _ = shutdown_requested(&mut self.shutdown) => return Ok(()),
            keys = server_handshake(&mut transport, &self.source, key_bytes, min_modulus_bits) => keys?,
        };
        let mut session = SecureSession::new(transport, keys);

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut self.shutdown) => {
                    debug!(%peer, "closing session for shutdown");
                    break;
                }
                message = session.recv_message() => match message {
                    Ok(body) => {
                        let message = ReceivedMessage { peer: peer.to_string(), body };
                        if self.inbox.send(message).is_err() {
                            debug!(%peer, "inbox closed, dropping message");
                        }
                    }
                    Err(ChannelError::ConnectionClosed) => break,
                    Err(e) => return Err(e),
                },
            }
        }

        if let Err(e) = session.close().await {
            debug!(%peer, error = %e, "error while closing connection");
        }
        Ok(())
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender means nobody is left to ask for a clean stop either.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn drain(mut workers: JoinSet<()>, timeout: Duration) {
    if workers.is_empty() {
        return;
    }
    info!(in_flight = workers.len(), "draining sessions");
    let drained = tokio::time::timeout(timeout, async {
        while let Some(joined) = workers.join_next().await {
            report_worker_exit(joined);
        }
    })
    .await;
    if drained.is_err() {
        warn!(remaining = workers.len(), "drain timed out, aborting sessions");
        workers.shutdown().await;
    }
}

// Accept errors such as EMFILE tend to repeat until something else frees a
// descriptor, so back off exponentially instead of retrying at once.
fn accept_retry_delay(consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(16);
    ACCEPT_RETRY_BASE
        .saturating_mul(1 << exponent)
        .min(ACCEPT_RETRY_MAX)
}

fn report_worker_exit(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "session task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::handshake::{client_handshake, generate_key_pair};
    use crate::RsaPrivateKey;

    use futures::future::join_all;
    use rstest::rstest;
    use tokio::io::AsyncWriteExt;
    use tokio::task::JoinHandle;

    struct RunningServer {
        addr: SocketAddr,
        shutdown: watch::Sender<bool>,
        inbox: mpsc::UnboundedReceiver<ReceivedMessage>,
        task: JoinHandle<Result<()>>,
    }

    fn test_config(max_sessions: usize) -> ChannelConfig {
        ChannelConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            prime_bits: 256,
            max_sessions,
            drain_timeout: Duration::from_secs(2),
            max_frame_len: 1024,
            ..ChannelConfig::default()
        }
    }

    async fn start_server(config: ChannelConfig) -> RunningServer {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let source = Arc::new(RandomSource::from_seed([21; 32]));
        let server = Server::bind(config, source, inbox_tx).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(server.run(shutdown_rx));
        RunningServer {
            addr,
            shutdown,
            inbox,
            task,
        }
    }

    async fn client_key(seed: u8) -> RsaPrivateKey {
        generate_key_pair(256, Arc::new(RandomSource::from_seed([seed; 32])))
            .await
            .unwrap()
    }

    async fn connect_session(addr: SocketAddr, key: &RsaPrivateKey) -> SecureSession<TcpStream> {
        let mut transport = FrameTransport::connect(addr).await.unwrap();
        let keys = client_handshake(&mut transport, key, Some(32)).await.unwrap();
        SecureSession::new(transport, keys)
    }

    #[tokio::test]
    async fn messages_are_delivered_in_order_over_loopback() {
        let mut server = start_server(test_config(4)).await;
        let key = client_key(1).await;
        let mut client = connect_session(server.addr, &key).await;

        for msg in ["hello", "", "a longer message that spans more than one block"] {
            client.send_message(msg.as_bytes()).await.unwrap();
        }

        for expected in ["hello", "", "a longer message that spans more than one block"] {
            let received = server.inbox.recv().await.unwrap();
            assert_eq!(received.text(), expected);
        }

        client.close().await.unwrap();
        server.shutdown.send(true).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn sessions_are_served_concurrently() {
        let mut server = start_server(test_config(4)).await;
        let key_a = client_key(2).await;
        let key_b = client_key(3).await;
        let mut client_a = connect_session(server.addr, &key_a).await;
        let mut client_b = connect_session(server.addr, &key_b).await;

        client_b.send_message(b"from b").await.unwrap();
        let from_b = server.inbox.recv().await.unwrap();
        client_a.send_message(b"from a").await.unwrap();
        let from_a = server.inbox.recv().await.unwrap();

        assert_eq!(from_b.body, b"from b");
        assert_eq!(from_a.body, b"from a");
        assert_ne!(from_a.peer, from_b.peer);

        server.shutdown.send(true).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn many_clients_connect_at_once() {
        let mut server = start_server(test_config(8)).await;
        let addr = server.addr;

        let clients = (0..4u8).map(|i| async move {
            let key = client_key(30 + i).await;
            let mut session = connect_session(addr, &key).await;
            session.send_message(&[b'0' + i]).await.unwrap();
            session
        });
        let sessions = join_all(clients).await;

        let mut bodies = Vec::new();
        for _ in 0..sessions.len() {
            bodies.push(server.inbox.recv().await.unwrap().body);
        }
        bodies.sort();
        assert_eq!(bodies, vec![b"0".to_vec(), b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);

        server.shutdown.send(true).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_idle_sessions() {
        let server = start_server(test_config(4)).await;
        let key = client_key(4).await;
        let mut transport = FrameTransport::connect(server.addr).await.unwrap();
        client_handshake(&mut transport, &key, Some(32)).await.unwrap();

        server.shutdown.send(true).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(5), server.task).await;

        assert!(stopped.unwrap().unwrap().is_ok());
        assert!(matches!(
            transport.recv_frame().await,
            Err(ChannelError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn sessions_beyond_the_limit_wait_for_a_free_slot() {
        let server = start_server(test_config(1)).await;
        let key_a = client_key(5).await;
        let key_b = client_key(6).await;
        let addr = server.addr;
        let mut first = connect_session(addr, &key_a).await;

        let second = tokio::spawn(async move {
            let mut transport = FrameTransport::connect(addr).await.unwrap();
            client_handshake(&mut transport, &key_b, Some(32)).await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!second.is_finished());

        first.close().await.unwrap();
        let handshake = tokio::time::timeout(Duration::from_secs(5), second).await;

        assert!(handshake.unwrap().unwrap().is_ok());
        server.shutdown.send(true).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_session_does_not_affect_others() {
        let mut server = start_server(test_config(4)).await;
        let key = client_key(7).await;

        let mut rogue = FrameTransport::connect(server.addr).await.unwrap();
        rogue.send_frame("not hex at all").await.unwrap();
        assert!(matches!(
            rogue.recv_frame().await,
            Err(ChannelError::ConnectionClosed)
        ));

        let mut client = connect_session(server.addr, &key).await;
        client.send_message(b"still serving").await.unwrap();
        assert_eq!(server.inbox.recv().await.unwrap().body, b"still serving");

        server.shutdown.send(true).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn oversized_frame_ends_only_that_session() {
        let mut server = start_server(test_config(4)).await;
        let key = client_key(8).await;

        let mut rogue = TcpStream::connect(server.addr).await.unwrap();
        // The server may hang up before all of this is written.
        let _ = rogue.write_all(&vec![b'a'; 64 * 1024]).await;
        let _ = rogue.write_all(b"\n").await;
        let mut rogue = FrameTransport::new(rogue, "server");
        assert!(matches!(
            rogue.recv_frame().await,
            Err(ChannelError::ConnectionClosed) | Err(ChannelError::Io(_))
        ));

        let mut client = connect_session(server.addr, &key).await;
        client.send_message(b"after the flood").await.unwrap();
        assert_eq!(server.inbox.recv().await.unwrap().body, b"after the flood");

        server.shutdown.send(true).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn client_key_below_the_configured_prime_size_is_refused() {
        let server = start_server(ChannelConfig {
            prime_bits: 512,
            ..test_config(4)
        })
        .await;
        let weak_key = client_key(9).await;

        let mut transport = FrameTransport::connect(server.addr).await.unwrap();
        let result = client_handshake(&mut transport, &weak_key, Some(32)).await;

        assert!(matches!(result, Err(ChannelError::ConnectionClosed)));
        server.shutdown.send(true).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[rstest]
    #[case(0, 10)]
    #[case(1, 10)]
    #[case(2, 20)]
    #[case(4, 80)]
    #[case(7, 640)]
    #[case(8, 1000)]
    #[case(u32::MAX, 1000)]
    fn accept_retries_back_off_up_to_a_second(#[case] failures: u32, #[case] expected_ms: u64) {
        assert_eq!(accept_retry_delay(failures), Duration::from_millis(expected_ms));
    }

    #[tokio::test]
    async fn dropping_the_shutdown_sender_stops_the_server() {
        let server = start_server(test_config(4)).await;

        drop(server.shutdown);

        let stopped = tokio::time::timeout(Duration::from_secs(5), server.task).await;
        assert!(stopped.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn bind_rejects_invalid_config() {
        let (inbox_tx, _inbox) = mpsc::unbounded_channel();
        let config = ChannelConfig {
            key_bytes: 20,
            ..test_config(1)
        };

        let result = Server::bind(config, Arc::new(RandomSource::from_entropy()), inbox_tx).await;

        assert!(matches!(result, Err(ChannelError::InvalidKeyLength(20))));
    }
}
