//! Inbound frame dispatch.

use talentdesk_protocol::{ChatMessage, ClientFrame, ServerFrame};
use tracing::warn;

/// What the session should do with one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Write this frame back on the same transport
    Reply(ClientFrame),
    /// Append to the message list and stop waiting
    Deliver(ChatMessage),
    Ignore,
}

pub fn dispatch(text: &str) -> Dispatch {
    match ServerFrame::decode(text) {
        Ok(ServerFrame::Ping) => Dispatch::Reply(ClientFrame::Pong),
        Ok(ServerFrame::Assistant { content }) => {
            Dispatch::Deliver(ChatMessage::assistant(content))
        }
        Err(e) => {
            warn!(
                component = "dispatch",
                event = "chat.frame.parse_failed",
                error = %e,
                payload_bytes = text.len(),
                payload_preview = %truncate_for_log(text, 240),
                "Failed to parse inbound frame"
            );
            Dispatch::Ignore
        }
    }
}

fn truncate_for_log(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
