//! Accepts clients on `<host>:<port>`, runs the key exchange with each and
//! prints every message they send. Ctrl+C stops accepting and drains the
//! open sessions.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rsa_aes_channel::{
    ChannelConfig, RandomSource, Result, Server, DEFAULT_HOST, DEFAULT_KEY_BYTES,
    DEFAULT_MAX_FRAME_LEN, DEFAULT_MAX_SESSIONS, DEFAULT_PRIME_BITS,
};

#[derive(Parser, Debug)]
#[command(name = "channel-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    port: u16,

    /// Address to bind
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// AES key length handed to each client, in bytes
    #[arg(long, default_value_t = DEFAULT_KEY_BYTES)]
    key_bytes: usize,

    /// Smallest RSA prime size, in bits, accepted from clients. Moduli
    /// shorter than twice this (less one bit) are refused.
    #[arg(long, default_value_t = DEFAULT_PRIME_BITS)]
    prime_bits: u64,

    /// Longest line, in characters, accepted from a client
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,

    /// Maximum number of concurrent sessions
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS)]
    max_sessions: usize,

    /// Seconds to wait for open sessions on shutdown
    #[arg(long, default_value_t = 5)]
    drain_timeout_secs: u64,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ChannelConfig {
        host: cli.host,
        port: cli.port,
        key_bytes: cli.key_bytes,
        prime_bits: cli.prime_bits,
        max_sessions: cli.max_sessions,
        drain_timeout: Duration::from_secs(cli.drain_timeout_secs),
        max_frame_len: cli.max_frame_len,
    };

    let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
    let server = Server::bind(config, Arc::new(RandomSource::from_entropy()), inbox_tx).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C"),
            Err(e) => error!(error = %e, "failed to listen for Ctrl+C"),
        }
        let _ = shutdown_tx.send(true);
    });

    // Ends once the server and all of its sessions have dropped their senders.
    let printer = tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            println!("message from {}: {}", message.peer, message.text());
        }
    });

    server.run(shutdown_rx).await?;
    printer.await?;
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}
