//! Transport seam between the session actor and the network.
//!
//! A `Connector` instantiates a transport without blocking, the way a
//! browser constructs a WebSocket: the handle is usable immediately and the
//! lifecycle (`Opened`, `Frame`, `Error`, `Closed`) arrives later as events.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::session_command::SessionEvent;
use crate::ChatError;

/// Lifecycle and data events reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed { reason: Option<String> },
}

/// Where a transport reports its events.
///
/// Each sink is stamped with the epoch of the transport it was handed to, so
/// the session can tell a stale socket's events from the live one's.
#[derive(Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub(crate) fn new(epoch: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { epoch, tx }
    }

    /// Returns false once the session is gone
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEvent::Transport {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// A live connection handle
pub trait Transport: Send {
    /// Queue a text frame. Fails synchronously when the connection is gone.
    fn send_text(&self, text: String) -> Result<(), ChatError>;

    fn close(&self);
}

pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str, events: EventSink) -> Box<dyn Transport>;
}

// ---------------------------------------------------------------------------
// WsConnector (tokio-tungstenite)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

enum Outgoing {
    Text(String),
    Close,
}

struct WsTransport {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Transport for WsTransport {
    fn send_text(&self, text: String) -> Result<(), ChatError> {
        self.tx
            .send(Outgoing::Text(text))
            .map_err(|_| ChatError::Transport("connection writer closed".into()))
    }

    fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &str, events: EventSink) -> Box<dyn Transport> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(url.to_string(), rx, events));
        Box::new(WsTransport { tx })
    }
}

async fn run_socket(
    url: String,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: EventSink,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(
                component = "transport",
                event = "ws.connect.failed",
                url = %url,
                error = %e,
                "WebSocket connect failed"
            );
            events.emit(TransportEvent::Error(e.to_string()));
            events.emit(TransportEvent::Closed {
                reason: Some("connect failed".into()),
            });
            return;
        }
    };

    info!(
        component = "transport",
        event = "ws.connection.opened",
        url = %url,
        "WebSocket connection opened"
    );
    events.emit(TransportEvent::Opened);

    let (mut ws_tx, mut ws_rx) = stream.split();
    let mut reason = None;

    loop {
        tokio::select! {
            cmd = outgoing.recv() => match cmd {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        events.emit(TransportEvent::Error(e.to_string()));
                        reason = Some(format!("send failed: {e}"));
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    reason = Some("closed by client".into());
                    break;
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !events.emit(TransportEvent::Frame(text.to_string())) {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(
                        component = "transport",
                        event = "ws.connection.close_frame",
                        url = %url,
                        "Server sent close frame"
                    );
                    reason = frame.map(|f| f.reason.to_string());
                    break;
                }
                // Control frames are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events.emit(TransportEvent::Error(e.to_string()));
                    reason = Some(e.to_string());
                    break;
                }
                None => break,
            },
        }
    }
    // Later sends must fail synchronously instead of vanishing.
    drop(outgoing);

    info!(
        component = "transport",
        event = "ws.connection.closed",
        url = %url,
        reason = ?reason,
        "WebSocket connection closed"
    );
    events.emit(TransportEvent::Closed { reason });
}
