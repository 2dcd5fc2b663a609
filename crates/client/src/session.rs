//! Consumer-facing view of a chat session
//!
//! The actor is the only writer. Readers either load the latest
//! `ChatSnapshot` lock-free or follow the `ChatUpdate` broadcast.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use talentdesk_protocol::{ChatMessage, ReplyStatus};
use tokio::sync::broadcast;

use crate::transition::Phase;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Connection state as the consumer sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32, delay_ms: u64 },
    Exhausted,
    ShutDown,
}

impl From<&Phase> for ConnectionStatus {
    fn from(phase: &Phase) -> Self {
        match phase {
            Phase::Idle => ConnectionStatus::Disconnected,
            Phase::Resolving { .. } | Phase::Opening => ConnectionStatus::Connecting,
            Phase::Open => ConnectionStatus::Connected,
            Phase::Reconnecting { attempt, delay } => ConnectionStatus::Reconnecting {
                attempt: *attempt,
                delay_ms: delay.as_millis() as u64,
            },
            Phase::Exhausted => ConnectionStatus::Exhausted,
            Phase::ShutDown => ConnectionStatus::ShutDown,
        }
    }
}

/// Point-in-time copy of everything the consumer renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub status: ReplyStatus,
    pub connection: ConnectionStatus,
    /// Messages waiting for an open transport
    pub queued: usize,
}

impl Default for ChatSnapshot {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            status: ReplyStatus::Done,
            connection: ConnectionStatus::Disconnected,
            queued: 0,
        }
    }
}

/// Incremental changes, in the order they happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    /// Prior history arrived; `messages` is the full list after merging
    HistoryLoaded { messages: Vec<ChatMessage> },
    MessageAppended(ChatMessage),
    StatusChanged(ReplyStatus),
    ConnectionChanged(ConnectionStatus),
    /// A queued message ran out of retries and will never be sent
    MessageDropped { content: String },
    ReconnectExhausted { attempts: u32 },
}

pub(crate) struct ChatView {
    state: ChatSnapshot,
    snapshot: Arc<ArcSwap<ChatSnapshot>>,
    updates: broadcast::Sender<ChatUpdate>,
}

impl ChatView {
    pub(crate) fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: ChatSnapshot::default(),
            snapshot: Arc::new(ArcSwap::from_pointee(ChatSnapshot::default())),
            updates,
        }
    }

    pub(crate) fn snapshot_arc(&self) -> Arc<ArcSwap<ChatSnapshot>> {
        self.snapshot.clone()
    }

    pub(crate) fn updates(&self) -> broadcast::Sender<ChatUpdate> {
        self.updates.clone()
    }

    pub(crate) fn append(&mut self, message: ChatMessage) {
        self.state.messages.push(message.clone());
        self.notify(ChatUpdate::MessageAppended(message));
    }

    /// Put loaded history ahead of anything appended during this mount.
    pub(crate) fn load_history(&mut self, history: Vec<ChatMessage>) {
        let local = std::mem::take(&mut self.state.messages);
        self.state.messages = history;
        self.state.messages.extend(local);
        self.notify(ChatUpdate::HistoryLoaded {
            messages: self.state.messages.clone(),
        });
    }

    pub(crate) fn set_status(&mut self, status: ReplyStatus) {
        if self.state.status != status {
            self.state.status = status;
            self.notify(ChatUpdate::StatusChanged(status));
        }
    }

    pub(crate) fn set_connection(&mut self, connection: ConnectionStatus) {
        if self.state.connection != connection {
            self.state.connection = connection;
            self.notify(ChatUpdate::ConnectionChanged(connection));
        }
    }

    pub(crate) fn set_queued(&mut self, queued: usize) {
        self.state.queued = queued;
    }

    pub(crate) fn notify(&self, update: ChatUpdate) {
        // No receivers is fine; the snapshot still carries the state.
        let _ = self.updates.send(update);
    }

    /// Publish the current state to lock-free readers
    pub(crate) fn refresh_snapshot(&self) {
        self.snapshot.store(Arc::new(self.state.clone()));
    }
}
