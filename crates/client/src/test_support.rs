//! In-memory connector and directory for session tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use talentdesk_protocol::ChatMessage;

use crate::directory::SessionDirectory;
use crate::transport::{Connector, EventSink, Transport, TransportEvent};
use crate::ChatError;

/// Let spawned tasks run until they block again.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// FakeConnector
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ConnectorState {
    sinks: Vec<EventSink>,
    wire: Vec<String>,
    fail_sends: bool,
    closes: usize,
}

/// Records every frame written by any transport it handed out
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().sinks.len()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    /// Frames written so far, parsed as JSON
    pub fn wire(&self) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .wire
            .iter()
            .map(|text| serde_json::from_str(text).expect("client wrote invalid JSON"))
            .collect()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    pub fn emit_on(&self, index: usize, event: TransportEvent) {
        let sink = self.state.lock().unwrap().sinks[index].clone();
        sink.emit(event);
    }

    pub fn frame_on(&self, index: usize, text: &str) {
        self.emit_on(index, TransportEvent::Frame(text.to_string()));
    }

    fn emit_latest(&self, event: TransportEvent) {
        let sink = self
            .state
            .lock()
            .unwrap()
            .sinks
            .last()
            .cloned()
            .expect("no transport opened yet");
        sink.emit(event);
    }

    pub fn open_latest(&self) {
        self.emit_latest(TransportEvent::Opened);
    }

    pub fn close_latest(&self) {
        self.emit_latest(TransportEvent::Closed { reason: None });
    }

    pub fn frame_latest(&self, text: &str) {
        self.emit_latest(TransportEvent::Frame(text.to_string()));
    }
}

struct FakeTransport {
    state: Arc<Mutex<ConnectorState>>,
}

impl Transport for FakeTransport {
    fn send_text(&self, text: String) -> Result<(), ChatError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(ChatError::Transport("fake send failure".into()));
        }
        state.wire.push(text);
        Ok(())
    }

    fn close(&self) {
        self.state.lock().unwrap().closes += 1;
    }
}

impl Connector for FakeConnector {
    fn connect(&self, _url: &str, events: EventSink) -> Box<dyn Transport> {
        self.state.lock().unwrap().sinks.push(events);
        Box::new(FakeTransport {
            state: self.state.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeDirectory
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakeDirectory {
    user_id: Option<i64>,
    conversations: Vec<String>,
    history: Vec<ChatMessage>,
    fail_history: bool,
    lookup_delay: Option<Duration>,
    lookups: Arc<AtomicUsize>,
    history_loads: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
}

impl FakeDirectory {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            conversations: Vec::new(),
            history: Vec::new(),
            fail_history: false,
            lookup_delay: None,
            lookups: Arc::new(AtomicUsize::new(0)),
            history_loads: Arc::new(AtomicUsize::new(0)),
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every username lookup fails
    pub fn failing() -> Self {
        Self {
            user_id: None,
            ..Self::new(0)
        }
    }

    pub fn with_conversations(mut self, ids: &[&str]) -> Self {
        self.conversations = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_failing_history(mut self) -> Self {
        self.fail_history = true;
        self
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn history_count(&self) -> usize {
        self.history_loads.load(Ordering::SeqCst)
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionDirectory for FakeDirectory {
    async fn user_id(&self, username: &str) -> Result<i64, ChatError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        self.user_id
            .ok_or_else(|| ChatError::Directory(format!("unknown user {username}")))
    }

    async fn conversation_ids(&self, _user_id: i64) -> Result<Vec<String>, ChatError> {
        Ok(self.conversations.clone())
    }

    async fn create_conversation(&self, _user_id: i64) -> Result<String, ChatError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("created-{n}"))
    }

    async fn history(
        &self,
        _user_id: i64,
        _conversation_id: &str,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.history_loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_history {
            return Err(ChatError::Directory("history unavailable".into()));
        }
        Ok(self.history.clone())
    }
}
