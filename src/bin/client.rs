//! Connects to a channel server, exchanges keys and sends each line typed on
//! stdin as an encrypted message. Typing `exit` (or closing stdin) ends the
//! session.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rsa_aes_channel::{
    ChannelConfig, Client, RandomSource, Result, DEFAULT_HOST, DEFAULT_KEY_BYTES,
    DEFAULT_MAX_FRAME_LEN, DEFAULT_PRIME_BITS, EXIT_SENTINEL,
};

#[derive(Parser, Debug)]
#[command(name = "channel-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server port
    port: u16,

    /// Server address
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Refuse the session unless the server hands out an AES key of this
    /// many bytes. Any valid size is accepted when omitted.
    #[arg(long)]
    key_bytes: Option<usize>,

    /// Size of each RSA prime, in bits
    #[arg(long, default_value_t = DEFAULT_PRIME_BITS)]
    prime_bits: u64,

    /// Longest line, in characters, accepted from the server
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,

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
        key_bytes: cli.key_bytes.unwrap_or(DEFAULT_KEY_BYTES),
        prime_bits: cli.prime_bits,
        max_frame_len: cli.max_frame_len,
        ..ChannelConfig::default()
    };
    config.validate()?;

    let source = Arc::new(RandomSource::from_entropy());
    let mut client = Client::connect(&config, source, cli.key_bytes).await?;
    println!("(send '{}' to close connection)", EXIT_SENTINEL);

    let n_sent = client
        .forward_lines(BufReader::new(tokio::io::stdin()))
        .await?;
    client.close().await?;
    info!(n_sent, "session ended");
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
