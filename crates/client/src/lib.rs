//! TalentDesk Chat
//!
//! Realtime chat session client. Keeps one WebSocket connection to the
//! chat agent alive for the lifetime of a session: resolves who the user is
//! and which conversation to continue, reconnects with exponential backoff,
//! and queues outbound messages until they can be delivered.

pub mod config;
pub mod directory;
pub mod dispatch;
pub mod outbound;
pub mod session;
pub mod session_actor;
mod session_command;
pub mod transition;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{ChatConfig, ReconnectPolicy, RetryPolicy};
pub use directory::{HttpDirectory, ResolvedSession, SessionDirectory};
pub use session::{ChatSnapshot, ChatUpdate, ConnectionStatus};
pub use session_actor::ChatSession;
pub use transport::{Connector, Transport, TransportEvent, WsConnector};

use thiserror::Error;

/// Errors that can occur in the chat client
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory lookup failed: {0}")]
    Directory(String),
}
