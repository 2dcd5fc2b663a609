//! Pure connection state transition function
//!
//! The connection lifecycle lives here as a pure, synchronous function:
//! `transition(state, input, policy) -> (state, effects)`.
//! No IO and no timers; the session actor executes the effects.

use std::time::Duration;

use talentdesk_protocol::SessionIdentity;

use crate::config::ReconnectPolicy;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where the connection currently is.
///
/// A transport closure never rests in a "closed" phase: it immediately
/// becomes `Reconnecting` (attempts remain) or `Exhausted` (they don't).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Resolving { load_history: bool },
    Opening,
    Open,
    Reconnecting { attempt: u32, delay: Duration },
    Exhausted,
    ShutDown,
}

impl Phase {
    /// A connect flow is in flight; further connect requests are no-ops.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Phase::Resolving { .. } | Phase::Opening)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Phase::Open)
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: Phase,
    /// Consecutive closures since the last successful open
    pub attempts: u32,
    /// Cached after the first successful resolution
    pub identity: Option<SessionIdentity>,
    pub history_loaded: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            attempts: 0,
            identity: None,
            history_loaded: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Input / Effect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    ConnectRequested { reconnect: bool },
    Resolved(Option<SessionIdentity>),
    TransportOpened,
    TransportError,
    TransportClosed,
    ReconnectTimerFired,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Run the session resolver
    Resolve { load_history: bool },
    /// Instantiate a transport for the cached identity
    OpenTransport,
    SendHandshake(SessionIdentity),
    FlushQueue,
    /// `attempt` is 1-based
    ScheduleReconnect { delay: Duration, attempt: u32 },
    CancelReconnect,
    /// The peer closed the transport; drop the handle
    ReleaseTransport,
    /// Actively close the transport (teardown)
    CloseTransport,
    ClearQueue,
    ReconnectExhausted { attempts: u32 },
}

// ---------------------------------------------------------------------------
// transition
// ---------------------------------------------------------------------------

pub fn transition(
    mut state: ConnectionState,
    input: Input,
    policy: &ReconnectPolicy,
) -> (ConnectionState, Vec<Effect>) {
    let mut effects = Vec::new();

    if state.phase == Phase::ShutDown {
        return (state, effects);
    }

    match input {
        Input::ConnectRequested { reconnect } => {
            begin_connect(&mut state, reconnect, &mut effects);
        }

        Input::ReconnectTimerFired => {
            if matches!(state.phase, Phase::Reconnecting { .. }) {
                begin_connect(&mut state, true, &mut effects);
            }
        }

        Input::Resolved(resolved) => {
            if !matches!(state.phase, Phase::Resolving { .. }) {
                return (state, effects);
            }
            match resolved {
                Some(identity) => {
                    state.identity = Some(identity);
                    state.history_loaded = true;
                    state.phase = Phase::Opening;
                    effects.push(Effect::OpenTransport);
                }
                // Silent abort: wait for the next external trigger.
                None => state.phase = Phase::Idle,
            }
        }

        Input::TransportOpened => {
            if state.phase != Phase::Opening {
                return (state, effects);
            }
            state.phase = Phase::Open;
            state.attempts = 0;
            if let Some(identity) = state.identity.clone() {
                effects.push(Effect::SendHandshake(identity));
            }
            effects.push(Effect::FlushQueue);
        }

        // Closure drives reconnection, errors only get logged.
        Input::TransportError => {}

        Input::TransportClosed => {
            if !matches!(state.phase, Phase::Opening | Phase::Open) {
                return (state, effects);
            }
            effects.push(Effect::ReleaseTransport);
            if state.attempts < policy.max_attempts {
                let delay = policy.delay_for(state.attempts);
                state.attempts += 1;
                state.phase = Phase::Reconnecting {
                    attempt: state.attempts,
                    delay,
                };
                effects.push(Effect::ScheduleReconnect {
                    delay,
                    attempt: state.attempts,
                });
            } else {
                state.phase = Phase::Exhausted;
                effects.push(Effect::ReconnectExhausted {
                    attempts: state.attempts,
                });
            }
        }

        Input::Teardown => {
            state.phase = Phase::ShutDown;
            effects.push(Effect::CancelReconnect);
            effects.push(Effect::CloseTransport);
            effects.push(Effect::ClearQueue);
        }
    }

    (state, effects)
}

fn begin_connect(state: &mut ConnectionState, reconnect: bool, effects: &mut Vec<Effect>) {
    if state.phase.is_connecting() || state.phase.is_open() {
        return;
    }
    if matches!(state.phase, Phase::Reconnecting { .. }) {
        effects.push(Effect::CancelReconnect);
    }

    if reconnect && state.identity.is_some() {
        state.phase = Phase::Opening;
        effects.push(Effect::OpenTransport);
    } else {
        let load_history = !state.history_loaded;
        state.phase = Phase::Resolving { load_history };
        effects.push(Effect::Resolve { load_history });
    }
}
