//! Events drained by the session actor.
//!
//! Consumer commands, resolver results, transport events and timer ticks all
//! arrive on one channel, so the actor handles them strictly one at a time.

use crate::directory::ResolvedSession;
use crate::transport::TransportEvent;

pub enum SessionEvent {
    // -- Consumer commands --
    Send { content: String },
    Reconnect,
    Shutdown,

    // -- Continuations --
    Resolved(Option<ResolvedSession>),
    Transport { epoch: u64, event: TransportEvent },
    ReconnectDue { token: u64 },
    RetryTick { id: String },
}
