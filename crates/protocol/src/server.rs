//! Agent → Client frames
//!
//! The agent only defines one control frame (`ping`). Any other JSON object is
//! an assistant message whose `data` field is the content, whatever its
//! `type`, so inbound frames are decoded as a loose object instead of a
//! closed enum.

use serde_json::{Map, Value};

const PING: &str = "ping";

/// Frames received from the agent endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Keep-alive probe; must be answered with a pong
    Ping,
    /// Assistant-authored content
    Assistant { content: String },
}

impl ServerFrame {
    /// Decode a WebSocket text frame. Fails only when the frame is not a JSON
    /// object.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let mut object: Map<String, Value> = serde_json::from_str(text)?;
        if object.get("type").and_then(Value::as_str) == Some(PING) {
            return Ok(ServerFrame::Ping);
        }
        let data = object.remove("data").unwrap_or(Value::Null);
        Ok(ServerFrame::Assistant {
            content: content_from_data(data),
        })
    }
}

fn content_from_data(data: Value) -> String {
    match data {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ping() {
        let frame = ServerFrame::decode(r#"{"type":"ping"}"#).expect("decode ping");
        assert_eq!(frame, ServerFrame::Ping);
    }

    #[test]
    fn any_other_type_is_assistant_content() {
        let frame = ServerFrame::decode(r#"{"type":"agent.output_text","data":"Hi there"}"#)
            .expect("decode message");
        assert_eq!(
            frame,
            ServerFrame::Assistant {
                content: "Hi there".into()
            }
        );
    }

    #[test]
    fn missing_data_is_empty_content() {
        let frame = ServerFrame::decode(r#"{"type":"agent.done"}"#).expect("decode");
        assert!(matches!(frame, ServerFrame::Assistant { ref content, .. } if content.is_empty()));
    }

    #[test]
    fn structured_data_is_rendered_as_json() {
        let frame = ServerFrame::decode(r#"{"type":"agent.card","data":{"score":3}}"#)
            .expect("decode");
        assert!(
            matches!(frame, ServerFrame::Assistant { ref content, .. } if content == r#"{"score":3}"#)
        );
    }

    #[test]
    fn objects_without_a_string_type_are_assistant_content() {
        assert_eq!(
            ServerFrame::decode(r#"{"data":"orphan"}"#).expect("decode"),
            ServerFrame::Assistant {
                content: "orphan".into()
            }
        );
        assert_eq!(
            ServerFrame::decode(r#"{"type":7,"data":"hi"}"#).expect("decode"),
            ServerFrame::Assistant {
                content: "hi".into()
            }
        );
    }

    #[test]
    fn ping_must_be_the_exact_string() {
        assert!(matches!(
            ServerFrame::decode(r#"{"type":"PING"}"#),
            Ok(ServerFrame::Assistant { .. })
        ));
        assert!(matches!(
            ServerFrame::decode(r#"{"type":["ping"]}"#),
            Ok(ServerFrame::Assistant { .. })
        ));
    }

    #[test]
    fn rejects_frames_that_are_not_objects() {
        assert!(ServerFrame::decode("not json").is_err());
        assert!(ServerFrame::decode(r#"["ping"]"#).is_err());
        assert!(ServerFrame::decode(r#""ping""#).is_err());
    }
}
