//! Wire protocol definitions
//!
//! The single `Message` record exchanged in both directions, serialized as
//! JSON, plus the reserved control tokens and the notices the server
//! synthesizes.

use serde::{Deserialize, Serialize};

/// Reserved name the relay itself goes by, as a destination for control
/// messages and as the sender of synthesized notices.
pub const SERVER_NAME: &str = "SERVER";

/// Control token carried in `content`: graceful leave (client to server)
/// or shutdown notice (server to client). Never chat text.
pub const EXIT_TOKEN: &str = "EXIT";

/// `content` of the registration handshake message.
pub const INIT_TOKEN: &str = "INIT";

/// The wire record, identical in both directions
///
/// Fields default to empty strings on decode; a record with every field
/// empty is an artifact of a closing connection, not a real event, and is
/// never dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Destination username, or `SERVER`
    #[serde(default)]
    pub to: String,
    /// Sender username, or `SERVER` for synthesized notices
    #[serde(default)]
    pub from: String,
    /// Message body, or a control token
    #[serde(default)]
    pub content: String,
}

impl Message {
    /// Create a message with the given fields
    pub fn new(to: impl Into<String>, from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            content: content.into(),
        }
    }

    /// The registration handshake: first message a client sends, binding
    /// its username (carried in `from`) to the connection.
    pub fn registration(username: &str) -> Self {
        Self::new(SERVER_NAME, username, INIT_TOKEN)
    }

    /// Graceful-leave control message, client to server.
    pub fn leave(username: &str) -> Self {
        Self::new(SERVER_NAME, username, EXIT_TOKEN)
    }

    /// Shutdown notice, server to one registered client.
    pub fn shutdown_notice(username: &str) -> Self {
        Self::new(username, SERVER_NAME, EXIT_TOKEN)
    }

    /// Notice sent back to `sender` when the user it addressed is not in
    /// the directory.
    pub fn offline_notice(sender: &str, offline_user: &str) -> Self {
        Self::new(
            sender,
            SERVER_NAME,
            format!("The user \"{}\" is not online.", offline_user),
        )
    }

    /// Notice sent to a connection whose chosen username is already
    /// registered, just before the server closes it.
    pub fn name_taken_notice(username: &str) -> Self {
        Self::new(
            username,
            SERVER_NAME,
            format!("The username \"{}\" is already taken.", username),
        )
    }

    /// A decode artifact from a half-closed connection: every field empty.
    pub fn is_blank(&self) -> bool {
        self.to.is_empty() && self.from.is_empty() && self.content.is_empty()
    }

    /// Graceful-leave control message addressed to the server.
    pub fn is_exit(&self) -> bool {
        self.to == SERVER_NAME && self.content == EXIT_TOKEN
    }

    /// Server-sent termination notice; a client receiving this closes its
    /// side of the connection.
    pub fn is_shutdown_notice(&self) -> bool {
        self.from == SERVER_NAME && self.content == EXIT_TOKEN
    }
}
