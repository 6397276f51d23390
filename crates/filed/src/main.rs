use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use filed::broker::Broker;
use filed::client::{self, CallConfig};
use filed::config::Config;

/// Filesystem administration daemon and client.
#[derive(Parser)]
#[command(name = "filed", version)]
struct Cli {
    /// Run in server mode
    #[arg(short, long)]
    server: bool,

    /// Execute one file operation frame against a running daemon
    #[arg(short, long, value_name = "FRAME")]
    execute: Option<String>,

    /// File path to config options
    #[arg(short, long, value_name = "FILE")]
    conf: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// How many times to retry execute requests
    #[arg(short, long, default_value_t = 3)]
    retries: u32,

    /// How long to wait for a reply before abandoning, in seconds
    #[arg(short, long, default_value_t = 25)]
    timeout: u64,
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.server && cli.execute.is_some() {
        anyhow::bail!("cannot execute commands in server mode");
    }

    let config = Arc::new(Config::load(cli.conf.as_deref())?);
    init_tracing(&config)?;

    if cli.server {
        let broker = Broker::new(Arc::clone(&config));
        broker.start().await?;
    } else if let Some(frame) = cli.execute {
        let call_config = CallConfig {
            retries: cli.retries,
            timeout: Duration::from_secs(cli.timeout),
            verbose: cli.verbose,
            ..CallConfig::from_config(&config)
        };
        match client::call(&frame, &call_config).await {
            Ok(message) => {
                if !message.is_empty() {
                    println!("{message}");
                } else if cli.verbose {
                    println!("Success!");
                }
            }
            Err(e) => {
                eprintln!("Request failed: {e}");
                std::process::exit(1);
            }
        }
    } else {
        anyhow::bail!("no run mode (--server | --execute) specified");
    }

    Ok(())
}
