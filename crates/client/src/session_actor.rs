//! Session actor: owns the connection, the outbound queue and the view,
//! and processes events sequentially.
//!
//! Each session runs as one tokio task. Consumers talk to it through
//! `ChatSession`, which posts `SessionEvent`s on an unbounded channel and
//! reads the view lock-free through `ArcSwap`. Timers, the resolver and the
//! transport post their continuations on the same channel, so every
//! mutation happens inside this loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use talentdesk_protocol::{ChatMessage, ClientFrame, ReplyStatus};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::directory::{resolve_session, ResolvedSession, SessionDirectory};
use crate::dispatch::{dispatch, Dispatch};
use crate::outbound::{OutboundQueue, RetryOutcome};
use crate::session::{ChatSnapshot, ChatUpdate, ChatView, ConnectionStatus};
use crate::session_command::SessionEvent;
use crate::transition::{transition, ConnectionState, Effect, Input, Phase};
use crate::transport::{Connector, EventSink, Transport, TransportEvent};
use crate::ChatError;

/// Handle to a running chat session (cheap to Clone).
///
/// Dropping the last clone tears the session down.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

struct Inner {
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    snapshot: Arc<ArcSwap<ChatSnapshot>>,
    updates: broadcast::Sender<ChatUpdate>,
    mounted: Arc<AtomicBool>,
}

impl Inner {
    fn post(&self, event: SessionEvent) {
        if !self.mounted.load(Ordering::SeqCst) {
            return;
        }
        if self.events_tx.send(event).is_err() {
            warn!(
                component = "session_actor",
                "Session loop gone, event dropped"
            );
        }
    }

    fn shutdown(&self) {
        if self.mounted.swap(false, Ordering::SeqCst) {
            let _ = self.events_tx.send(SessionEvent::Shutdown);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ChatSession {
    /// Mount a session and start its first connect.
    pub fn spawn(
        config: ChatConfig,
        directory: Arc<dyn SessionDirectory>,
        connector: Arc<dyn Connector>,
    ) -> ChatSession {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mounted = Arc::new(AtomicBool::new(true));
        let view = ChatView::new();

        let inner = Inner {
            events_tx: events_tx.clone(),
            snapshot: view.snapshot_arc(),
            updates: view.updates(),
            mounted: mounted.clone(),
        };

        let actor = SessionActor {
            config,
            directory,
            connector,
            events_tx,
            mounted,
            conn: ConnectionState::default(),
            queue: OutboundQueue::new(),
            view,
            transport: None,
            epoch: 0,
            reconnect_timer: None,
            reconnect_token: 0,
            retry_tickers: HashMap::new(),
        };
        tokio::spawn(actor.run(events_rx));

        ChatSession {
            inner: Arc::new(inner),
        }
    }

    /// Submit a user message. It shows up in the message list immediately.
    pub fn send(&self, content: impl Into<String>) {
        self.inner.post(SessionEvent::Send {
            content: content.into(),
        });
    }

    /// Explicitly ask for a connection attempt, e.g. after reconnects ran out.
    pub fn reconnect(&self) {
        self.inner.post(SessionEvent::Reconnect);
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<ChatSnapshot> {
        self.inner.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatUpdate> {
        self.inner.updates.subscribe()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::SeqCst)
    }

    /// Tear the session down. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

// ---------------------------------------------------------------------------
// SessionActor
// ---------------------------------------------------------------------------

struct SessionActor {
    config: ChatConfig,
    directory: Arc<dyn SessionDirectory>,
    connector: Arc<dyn Connector>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    /// Lifecycle guard shared with every spawned continuation
    mounted: Arc<AtomicBool>,
    conn: ConnectionState,
    queue: OutboundQueue,
    view: ChatView,
    transport: Option<Box<dyn Transport>>,
    /// Bumped for every transport; events from older ones are stale
    epoch: u64,
    reconnect_timer: Option<JoinHandle<()>>,
    /// Bumped on every schedule/cancel; stale timer firings are ignored
    reconnect_token: u64,
    retry_tickers: HashMap<String, JoinHandle<()>>,
}

impl SessionActor {
    async fn run(mut self, mut events_rx: mpsc::UnboundedReceiver<SessionEvent>) {
        info!(
            component = "session_actor",
            event = "chat.session.mounted",
            username = %self.config.username,
            "Chat session mounted"
        );
        self.apply(Input::ConnectRequested { reconnect: false });
        self.publish();

        while let Some(event) = events_rx.recv().await {
            let stop = if self.mounted.load(Ordering::SeqCst) {
                self.handle(event)
            } else {
                true
            };
            if stop {
                self.apply(Input::Teardown);
                self.publish();
                break;
            }
            self.publish();
        }

        info!(
            component = "session_actor",
            event = "chat.session.unmounted",
            username = %self.config.username,
            "Chat session torn down"
        );
    }

    /// Returns true when the session should stop.
    fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Send { content } => self.send(content),
            SessionEvent::Reconnect => self.apply(Input::ConnectRequested { reconnect: true }),
            SessionEvent::Shutdown => return true,
            SessionEvent::Resolved(resolved) => self.on_resolved(resolved),
            SessionEvent::Transport { epoch, event } => self.on_transport(epoch, event),
            SessionEvent::ReconnectDue { token } => {
                if token == self.reconnect_token {
                    self.reconnect_timer = None;
                    self.apply(Input::ReconnectTimerFired);
                }
            }
            SessionEvent::RetryTick { id } => self.on_retry_tick(&id),
        }
        false
    }

    fn apply(&mut self, input: Input) {
        let state = std::mem::take(&mut self.conn);
        let (state, effects) = transition(state, input, &self.config.reconnect);
        self.conn = state;
        for effect in effects {
            self.execute(effect);
        }
        self.view
            .set_connection(ConnectionStatus::from(&self.conn.phase));
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Resolve { load_history } => self.spawn_resolve(load_history),

            Effect::OpenTransport => {
                if let Some(old) = self.transport.take() {
                    old.close();
                }
                self.epoch += 1;
                let sink = EventSink::new(self.epoch, self.events_tx.clone());
                debug!(
                    component = "session_actor",
                    event = "chat.transport.opening",
                    epoch = self.epoch,
                    url = %self.config.ws_url,
                    "Opening transport"
                );
                self.transport = Some(self.connector.connect(&self.config.ws_url, sink));
            }

            Effect::SendHandshake(identity) => {
                let frame = ClientFrame::connect(
                    &identity.conversation_id,
                    identity.user_id,
                    &self.config.token,
                );
                if let Err(e) = self.write(&frame) {
                    warn!(
                        component = "session_actor",
                        event = "chat.handshake.failed",
                        error = %e,
                        "Failed to send handshake frame"
                    );
                }
            }

            Effect::FlushQueue => self.flush_queue(),

            Effect::ScheduleReconnect { delay, attempt } => {
                self.cancel_reconnect_timer();
                let token = self.reconnect_token;
                let tx = self.events_tx.clone();
                let mounted = self.mounted.clone();
                info!(
                    component = "session_actor",
                    event = "chat.reconnect.scheduled",
                    attempt,
                    max_attempts = self.config.reconnect.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting in {}ms (attempt {})",
                    delay.as_millis(),
                    attempt
                );
                self.reconnect_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if mounted.load(Ordering::SeqCst) {
                        let _ = tx.send(SessionEvent::ReconnectDue { token });
                    }
                }));
            }

            Effect::CancelReconnect => self.cancel_reconnect_timer(),

            Effect::ReleaseTransport => {
                self.transport = None;
            }

            Effect::CloseTransport => {
                if let Some(transport) = self.transport.take() {
                    transport.close();
                }
                self.epoch += 1;
            }

            Effect::ClearQueue => {
                self.queue.clear();
                for (_, ticker) in self.retry_tickers.drain() {
                    ticker.abort();
                }
            }

            Effect::ReconnectExhausted { attempts } => {
                warn!(
                    component = "session_actor",
                    event = "chat.reconnect.exhausted",
                    attempts,
                    "Max reconnection attempts reached, giving up"
                );
                self.view.notify(ChatUpdate::ReconnectExhausted { attempts });
            }
        }
    }

    fn spawn_resolve(&self, load_history: bool) {
        let directory = self.directory.clone();
        let username = self.config.username.clone();
        let mounted = self.mounted.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            if !mounted.load(Ordering::SeqCst) {
                return;
            }
            let resolved = resolve_session(directory.as_ref(), &username, load_history).await;
            // Not cancelled mid-flight; the result is just discarded.
            if mounted.load(Ordering::SeqCst) {
                let _ = tx.send(SessionEvent::Resolved(resolved));
            }
        });
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        self.reconnect_token += 1;
    }

    fn on_resolved(&mut self, resolved: Option<ResolvedSession>) {
        let wants_history = matches!(
            self.conn.phase,
            Phase::Resolving { load_history: true }
        );
        let identity = match resolved {
            Some(resolved) => {
                if let (true, Some(history)) = (wants_history, resolved.history) {
                    self.view.load_history(history);
                }
                info!(
                    component = "session_actor",
                    event = "chat.session.resolved",
                    user_id = resolved.identity.user_id,
                    conversation_id = %resolved.identity.conversation_id,
                    "Resolved chat session"
                );
                Some(resolved.identity)
            }
            None => None,
        };
        self.apply(Input::Resolved(identity));
    }

    fn on_transport(&mut self, epoch: u64, event: TransportEvent) {
        if epoch != self.epoch || self.transport.is_none() {
            debug!(
                component = "session_actor",
                event = "chat.transport.stale_event",
                epoch,
                current_epoch = self.epoch,
                "Ignoring event from a stale transport"
            );
            return;
        }

        match event {
            TransportEvent::Opened => {
                info!(
                    component = "session_actor",
                    event = "chat.transport.opened",
                    epoch,
                    "Chat transport open"
                );
                self.apply(Input::TransportOpened);
            }
            TransportEvent::Frame(text) => self.on_frame(&text),
            TransportEvent::Error(error) => {
                warn!(
                    component = "session_actor",
                    event = "chat.transport.error",
                    epoch,
                    error = %error,
                    "Chat transport error"
                );
                self.apply(Input::TransportError);
            }
            TransportEvent::Closed { reason } => {
                info!(
                    component = "session_actor",
                    event = "chat.transport.closed",
                    epoch,
                    reason = ?reason,
                    "Chat transport closed"
                );
                self.apply(Input::TransportClosed);
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        match dispatch(text) {
            Dispatch::Reply(frame) => {
                if let Err(e) = self.write(&frame) {
                    warn!(
                        component = "session_actor",
                        event = "chat.pong.failed",
                        error = %e,
                        "Failed to answer keep-alive"
                    );
                }
            }
            Dispatch::Deliver(message) => {
                self.view.append(message);
                self.view.set_status(ReplyStatus::Done);
            }
            Dispatch::Ignore => {}
        }
    }

    fn send(&mut self, content: String) {
        self.view.append(ChatMessage::user(content.clone()));
        self.view.set_status(ReplyStatus::Waiting);

        if self.conn.phase.is_open() {
            if let Err(e) = self.write(&ClientFrame::input_text(&content)) {
                warn!(
                    component = "session_actor",
                    event = "chat.send.failed",
                    error = %e,
                    "Send failed, queueing message"
                );
                self.queue.enqueue(content);
            }
            return;
        }

        let id = self.queue.enqueue(content);
        debug!(
            component = "session_actor",
            event = "chat.send.queued",
            message_id = %id,
            queued = self.queue.len(),
            "Transport not open, message queued"
        );
        if !self.conn.phase.is_connecting() {
            self.apply(Input::ConnectRequested { reconnect: true });
        }
        self.start_retry_ticker(id);
    }

    fn write(&self, frame: &ClientFrame) -> Result<(), ChatError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| ChatError::Transport("no transport".into()))?;
        transport.send_text(frame.to_json()?)
    }

    fn flush_queue(&mut self) {
        let Some(transport) = self.transport.as_deref() else {
            return;
        };
        let report = self.queue.flush(|entry| {
            transport.send_text(ClientFrame::input_text(&entry.content).to_json()?)
        });
        if report.sent > 0 || report.remaining > 0 {
            info!(
                component = "session_actor",
                event = "chat.queue.flushed",
                sent = report.sent,
                remaining = report.remaining,
                "Flushed outbound queue"
            );
        }

        let queue = &self.queue;
        self.retry_tickers.retain(|id, ticker| {
            let keep = queue.contains(id);
            if !keep {
                ticker.abort();
            }
            keep
        });
    }

    fn start_retry_ticker(&mut self, id: String) {
        let period = self.config.retry.interval;
        let tx = self.events_tx.clone();
        let mounted = self.mounted.clone();
        let tick_id = id.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if !mounted.load(Ordering::SeqCst) {
                    break;
                }
                if tx
                    .send(SessionEvent::RetryTick {
                        id: tick_id.clone(),
                    })
                    .is_err()
                {
                    break;
                }
            }
        });
        self.retry_tickers.insert(id, ticker);
    }

    fn stop_retry_ticker(&mut self, id: &str) {
        if let Some(ticker) = self.retry_tickers.remove(id) {
            ticker.abort();
        }
    }

    fn on_retry_tick(&mut self, id: &str) {
        let Some(content) = self.queue.get(id).map(|entry| entry.content.clone()) else {
            // Already delivered by a flush.
            self.stop_retry_ticker(id);
            return;
        };

        if self.conn.phase.is_open() && self.write(&ClientFrame::input_text(&content)).is_ok() {
            self.queue.remove(id);
            self.stop_retry_ticker(id);
            debug!(
                component = "session_actor",
                event = "chat.retry.sent",
                message_id = %id,
                "Queued message delivered on retry"
            );
            return;
        }

        match self.queue.record_retry(id, self.config.retry.max_retries) {
            RetryOutcome::Pending(retries) => {
                debug!(
                    component = "session_actor",
                    event = "chat.retry.pending",
                    message_id = %id,
                    retries,
                    "Queued message still undelivered"
                );
            }
            RetryOutcome::Dropped(entry) => {
                self.stop_retry_ticker(id);
                warn!(
                    component = "session_actor",
                    event = "chat.retry.exhausted",
                    message_id = %id,
                    retries = entry.retries,
                    "Dropping queued message after max retries"
                );
                self.view.set_status(ReplyStatus::Done);
                self.view.notify(ChatUpdate::MessageDropped {
                    content: entry.content,
                });
            }
            RetryOutcome::Gone => self.stop_retry_ticker(id),
        }
    }

    fn publish(&mut self) {
        self.view.set_queued(self.queue.len());
        self.view.refresh_snapshot();
    }
}
