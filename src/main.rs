// src/main.rs

//! The main entry point for the messenger server.

use anyhow::{Context, Result, bail};
use messenger::config::Config;
use messenger::server;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|arg| arg == "--version") {
        println!("messenger server version {VERSION}");
        return Ok(());
    }

    let mut config = load_config(&args)?;

    // A bare positional argument is the port and overrides the file.
    if let Some(port_str) = positional_port(&args) {
        config.port = port_str
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .with_context(|| format!("Invalid port number: {port_str}"))?;
    }

    // RUST_LOG wins over the configured level.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(true),
        )
        .init();

    info!("Starting messenger server {VERSION}");
    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {:#}", e);
        return Err(e);
    }
    Ok(())
}

/// Loads the file named by `--config`, or the defaults when there is none.
fn load_config(args: &[String]) -> Result<Config> {
    match args.iter().position(|arg| arg == "--config") {
        Some(i) => {
            let Some(path) = args.get(i + 1) else {
                bail!("--config flag requires a value");
            };
            Config::from_file(path)
        }
        None => Ok(Config::default()),
    }
}

fn positional_port(args: &[String]) -> Option<&str> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--config" {
            skip_next = true;
            continue;
        }
        if !arg.starts_with("--") {
            return Some(arg);
        }
    }
    None
}
