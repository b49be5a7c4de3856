//! Relay actor implementation
//!
//! The central actor that owns the username directory and performs all
//! message dispatch. Uses the Actor pattern with mpsc channels: connection
//! handlers never touch the directory, they send commands.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::message::Message;
use crate::peer::Peer;
use crate::types::Username;

/// Commands sent from connection handlers to the Relay actor
#[derive(Debug)]
pub enum RelayCommand {
    /// A connection completed its registration handshake
    Register {
        username: Username,
        sender: mpsc::Sender<Message>,
        /// false if the username was already taken
        reply: oneshot::Sender<bool>,
    },
    /// A registered connection is gone (graceful leave or disconnect)
    Remove { username: Username },
    /// Deliver a client message to its addressed destination
    Route { message: Message },
    /// Notify every registered client and stop the actor
    Shutdown { done: oneshot::Sender<()> },
}

/// The Relay actor
///
/// Owns the directory mapping usernames to connected peers. Processing
/// commands one at a time on a single task makes register/lookup/remove
/// linearizable per key without any locking.
pub struct Relay {
    /// All registered connections: Username -> Peer
    directory: HashMap<Username, Peer>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RelayCommand>,
}

impl Relay {
    /// Create a new Relay with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RelayCommand>) -> Self {
        Self {
            directory: HashMap::new(),
            receiver,
        }
    }

    /// Run the Relay event loop
    ///
    /// Processes commands until a `Shutdown` arrives or all senders are
    /// dropped.
    pub async fn run(mut self) {
        info!("Relay started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RelayCommand::Register {
                    username,
                    sender,
                    reply,
                } => {
                    self.handle_register(username, sender, reply).await;
                }
                RelayCommand::Remove { username } => {
                    self.handle_remove(username);
                }
                RelayCommand::Route { message } => {
                    self.handle_route(message).await;
                }
                RelayCommand::Shutdown { done } => {
                    self.handle_shutdown(done).await;
                    break;
                }
            }
        }

        info!("Relay stopped");
    }

    /// Handle a registration request
    ///
    /// Duplicate usernames are rejected: the candidate gets a notice telling
    /// it why and its sender is dropped, so its connection flushes and
    /// closes without ever becoming addressable.
    async fn handle_register(
        &mut self,
        username: Username,
        sender: mpsc::Sender<Message>,
        reply: oneshot::Sender<bool>,
    ) {
        if self.directory.contains_key(&username) {
            warn!("Registration rejected, username '{}' already taken", username);
            let _ = sender
                .send(Message::name_taken_notice(username.as_str()))
                .await;
            let _ = reply.send(false);
            return;
        }

        let peer = Peer::new(username.clone(), sender);
        self.directory.insert(username.clone(), peer);
        info!("{} has joined the chat", username);
        debug!("Directory size: {}", self.directory.len());

        let _ = reply.send(true);
    }

    /// Handle a departed connection
    fn handle_remove(&mut self, username: Username) {
        if self.directory.remove(&username).is_some() {
            info!("{} has left the chat", username);
            debug!("Directory size: {}", self.directory.len());
        }
    }

    /// Dispatch a message to its addressed destination
    ///
    /// On a routing miss the original sender is told; if the sender itself
    /// is gone by then, the notice is dropped. A failed enqueue toward a
    /// recipient is logged and swallowed so it cannot take down the
    /// sender's loop.
    async fn handle_route(&self, message: Message) {
        match self.directory.get(message.to.as_str()) {
            Some(peer) => {
                if let Err(e) = peer.send(message).await {
                    warn!("Failed to deliver to {}: {}", peer.username, e);
                }
            }
            None => {
                debug!("Routing miss: '{}' is not registered", message.to);
                let notice = Message::offline_notice(&message.from, &message.to);
                if let Some(sender_peer) = self.directory.get(message.from.as_str()) {
                    let _ = sender_peer.send(notice).await;
                }
            }
        }
    }

    /// Broadcast the termination notice and clear the directory
    ///
    /// Dropping each peer's sender lets its write task flush the notice and
    /// close the socket; every connection terminates itself.
    async fn handle_shutdown(&mut self, done: oneshot::Sender<()>) {
        info!("The chat room is shutting down...");

        for (username, peer) in self.directory.drain() {
            if let Err(e) = peer.send(Message::shutdown_notice(username.as_str())).await {
                warn!("Failed to notify {} of shutdown: {}", username, e);
            }
        }

        let _ = done.send(());
    }
}
