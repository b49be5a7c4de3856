//! Chat relay - Entry Point
//!
//! Single binary dispatching on a mode argument: runs either the relay
//! server or the interactive command-line client.

use std::env;

use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::{client, control, server};

/// Default server bind address
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("server") => {
            let addr = args
                .get(1)
                .cloned()
                .unwrap_or_else(|| DEFAULT_ADDR.to_string());

            let listener = TcpListener::bind(&addr).await?;
            info!("Chat relay listening on {}", addr);

            // Operator control surface: EXIT on stdin triggers shutdown
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            tokio::spawn(control::watch(
                BufReader::new(tokio::io::stdin()),
                shutdown_tx,
            ));

            server::run(listener, shutdown_rx).await;
        }
        Some("client") => {
            let (Some(addr), Some(username)) = (args.get(1), args.get(2)) else {
                print_usage();
                return Ok(());
            };
            client::run(addr, username).await?;
        }
        _ => print_usage(),
    }

    Ok(())
}

fn print_usage() {
    println!("Usage:");
    println!("  chat_relay server [bind-addr]          Run the relay (default {})", DEFAULT_ADDR);
    println!("  chat_relay client <addr> <username>    Join a chat room");
}
