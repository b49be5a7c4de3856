//! Private Chat Relay Library
//!
//! A WebSocket chat relay built with tokio-tungstenite using the Actor
//! pattern for state management: clients register a username and exchange
//! addressed messages through a central process that looks up the
//! destination by name and forwards the payload.
//!
//! # Features
//! - WebSocket connection handling
//! - Username registration handshake (duplicates rejected)
//! - Addressed message dispatch with "recipient offline" notices
//! - Graceful leave via the EXIT control token
//! - Operator-triggered shutdown that notifies every client first
//! - Matching interactive command-line client
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Relay` is the central actor owning the username directory
//! - Each connection has a handler task communicating with the relay
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use chat_relay::server;
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
//!
//!     // Trigger `shutdown_tx` from an operator input watcher
//!     server::run(listener, shutdown_rx).await;
//! }
//! ```

pub mod client;
pub mod control;
pub mod error;
pub mod handler;
pub mod message;
pub mod peer;
pub mod relay;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use error::{RelayError, SendError};
pub use handler::handle_connection;
pub use message::{Message, EXIT_TOKEN, INIT_TOKEN, SERVER_NAME};
pub use peer::Peer;
pub use relay::{Relay, RelayCommand};
pub use types::{ConnectionId, Username};
