//! Basic type definitions for the chat relay
//!
//! Provides newtype wrappers for type safety:
//! - `Username`: the registration key clients are addressed by
//! - `ConnectionId`: UUID-based identifier for not-yet-registered connections

use uuid::Uuid;

/// Registered username (newtype pattern)
///
/// The directory key a client is addressed by. Case-sensitive, no
/// normalization. Implements Hash and Eq for use as a HashMap key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(pub String);

impl Username {
    /// Create a username from any string-like value
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw username string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Username {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4. A connection gets one at accept time so log lines can
/// refer to it before the registration handshake has produced a username.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
