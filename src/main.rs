//! Triologue gateway terminal client - binary entry point.
//!
//! Argument parsing, logging setup, and exit-code mapping live here; the
//! session itself is in the `triologue_cli` library.

use clap::Parser;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use triologue_cli::client::{self, SessionEnd};
use triologue_cli::config::Config;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Connect to Triologue from your terminal.
#[derive(Debug, Parser)]
#[command(name = "triologue")]
#[command(version, about)]
#[command(after_help = "\
Examples:
  triologue --token byoa_xxx --room onboarding          # Interactive chat
  triologue --token byoa_xxx --json                     # JSON stream
  echo \"Hello!\" | triologue --token byoa_xxx --room onboarding --pipe
  triologue --token byoa_xxx --room main --send \"Hello!\" # One-shot send")]
struct Cli {
    /// BYOA agent token (or BYOA_TOKEN env)
    #[arg(long)]
    token: Option<String>,

    /// Gateway WebSocket URL (or GATEWAY_WS_URL env)
    #[arg(long)]
    server: Option<String>,

    /// Room name filter (partial match)
    #[arg(long)]
    room: Option<String>,

    /// Output messages as JSON lines
    #[arg(long)]
    json: bool,

    /// Read stdin and send as messages
    #[arg(long)]
    pipe: bool,

    /// Send a single message and exit
    #[arg(long)]
    send: Option<String>,

    /// Suppress connection info
    #[arg(long, short)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = match Config::resolve(
        cli.token, cli.server, cli.room, cli.json, cli.pipe, cli.send, cli.quiet,
    ) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };
    log::debug!("mode {:?}, server {}", config.mode, config.server_url);

    // Ctrl-C cancels the token; every suspension point in the duplex loop
    // selects on it, so the transport close path still runs.
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });

    match client::run(&config, cancel).await {
        Ok(SessionEnd::Clean) => {}
        Ok(SessionEnd::ConnectionClosed) => {
            eprintln!("\n❌ Connection closed");
        }
        Err(e) => {
            eprintln!("❌ {e:#}");
            std::process::exit(1);
        }
    }
}
