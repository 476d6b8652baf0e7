// src/bin/client.rs

//! The interactive terminal client.

use anyhow::{Context, Result};
use messenger::client::command::HELP;
use messenger::client::render::describe;
use messenger::client::{ClientCommand, MessengerClient};
use messenger::config::DEFAULT_PORT;
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--version") {
        println!("messenger client version {VERSION}");
        return Ok(());
    }

    // Quiet unless RUST_LOG asks for more; logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();

    let host = args.first().map(String::as_str).unwrap_or("127.0.0.1");
    let port = match args.get(1) {
        Some(port) => port
            .parse::<u16>()
            .with_context(|| format!("Invalid port number: {port}"))?,
        None => DEFAULT_PORT,
    };

    let mut client = MessengerClient::connect(host, port)
        .await
        .with_context(|| format!("Failed to connect to {host}:{port}"))?;
    println!("Connected to {host}:{port}. Type 'help' to see the commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match ClientCommand::parse(&line) {
                    Ok(ClientCommand::Help) => println!("{HELP}"),
                    Ok(ClientCommand::Quit) => break,
                    Ok(ClientCommand::Request(request)) => {
                        client.send(request).await.context("Failed to send request")?;
                    }
                    Err(e) => eprintln!("{e}"),
                }
            }
            message = client.recv() => {
                match message {
                    Some(Ok(message)) => println!("{}", describe(&message)),
                    Some(Err(e)) if !e.is_transport() => eprintln!("{e}"),
                    Some(Err(e)) => {
                        eprintln!("Connection error: {e}");
                        break;
                    }
                    None => {
                        println!("Server closed the connection.");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}
