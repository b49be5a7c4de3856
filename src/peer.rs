//! Peer struct definition
//!
//! A registered connection as the directory sees it: the username plus the
//! channel feeding that connection's write task.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::Message;
use crate::types::Username;

/// One registered connection
///
/// The relay actor holds a `Peer` per directory entry for routing only.
/// The WebSocket sink itself is owned exclusively by the connection's write
/// task; the actor enqueues through `sender` and never touches the socket.
#[derive(Debug)]
pub struct Peer {
    /// Username this connection registered under
    pub username: Username,
    /// Relay → connection write task channel
    pub sender: mpsc::Sender<Message>,
    /// Registration time
    pub joined_at: Instant,
}

impl Peer {
    /// Create a new peer with the given username and sender channel
    pub fn new(username: Username, sender: mpsc::Sender<Message>) -> Self {
        Self {
            username,
            sender,
            joined_at: Instant::now(),
        }
    }

    /// Enqueue a message for this peer's write task
    ///
    /// Returns an error if the channel is closed (connection gone).
    pub async fn send(&self, msg: Message) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_peer_send() {
        let (tx, mut rx) = mpsc::channel(8);
        let peer = Peer::new(Username::new("alice"), tx);

        peer.send(Message::new("alice", "bob", "hi")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.content, "hi");
    }

    #[tokio::test]
    async fn test_peer_send_closed_channel() {
        let (tx, rx) = mpsc::channel(8);
        let peer = Peer::new(Username::new("alice"), tx);
        drop(rx);

        let result = peer.send(Message::new("alice", "bob", "hi")).await;
        assert!(matches!(result, Err(SendError::ChannelClosed)));
    }
}
