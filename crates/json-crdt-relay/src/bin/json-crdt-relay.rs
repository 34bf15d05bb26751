use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use json_crdt_relay::config::{self, Config};
use json_crdt_relay::logging::init_logging;
use json_crdt_relay::telemetry;
use json_crdt_relay::{SessionHandle, SessionOptions};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "json-crdt-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; defaults to JSON_CRDT_RELAY_* variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Join a channel, print every value as a JSON line and publish each
    /// JSON line read from stdin
    Join {
        /// Channel key
        #[arg(short, long)]
        key: Option<String>,

        /// Initial value offered to the channel (a JSON object)
        #[arg(short, long, default_value = "{}")]
        initial: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::from_env()?,
    };
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.logging.json_format |= args.json_logs;
    config.validate()?;

    init_logging(config.logging.to_log_config()?)?;
    if config.telemetry {
        telemetry::init_metrics();
    }
    config::configure(config)?;

    match args.command {
        Command::Join { key, initial } => join(key, &initial).await,
    }
}

async fn join(key: Option<String>, initial: &str) -> Result<()> {
    let initial: Value = serde_json::from_str(initial).context("parsing --initial")?;
    if !initial.is_object() {
        bail!("--initial must be a JSON object");
    }

    let handle = SessionHandle::connect(initial, SessionOptions { key }).await?;
    let mut status = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("joined channel");

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if let Some(fault) = current.fault {
                    bail!("session faulted: {fault}");
                }
                if current.ready {
                    println!("{}", serde_json::to_string(&current.value)?);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(&line) {
                    Ok(value) => {
                        if let Err(e) = handle.set(value).await {
                            warn!(error = %e, "update rejected");
                        }
                    }
                    Err(e) => warn!(error = %e, "ignoring input line that is not JSON"),
                }
            }
        }
    }

    handle.close().await;
    Ok(())
}
