//! Client → Agent frames

use serde::{Deserialize, Serialize};

/// Frames sent from the chat client to the agent endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Handshake, sent once per successful open
    #[serde(rename = "user.connect")]
    Connect { data: ConnectData },

    /// A user message
    #[serde(rename = "user.input_text.commit")]
    InputTextCommit { data: String },

    /// Keep-alive reply
    #[serde(rename = "pong")]
    Pong,
}

/// Identity carried by the handshake frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectData {
    pub conversation_id: String,
    pub user_id: i64,
    pub token: String,
}

impl ClientFrame {
    pub fn connect(conversation_id: &str, user_id: i64, token: &str) -> Self {
        ClientFrame::Connect {
            data: ConnectData {
                conversation_id: conversation_id.to_string(),
                user_id,
                token: token.to_string(),
            },
        }
    }

    pub fn input_text(content: &str) -> Self {
        ClientFrame::InputTextCommit {
            data: content.to_string(),
        }
    }

    /// Serialize to the JSON text carried by a WebSocket text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
