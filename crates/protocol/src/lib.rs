//! TalentDesk Protocol
//!
//! Shared types for communication between the chat client and the
//! chat-agent endpoint. Frames are serialized as JSON over WebSocket;
//! directory records come back from the REST services.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod server;
pub mod types;

pub use client::{ClientFrame, ConnectData};
pub use server::ServerFrame;
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
