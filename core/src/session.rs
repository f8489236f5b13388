//! # Session State
//!
//! The mutable state shared by establishment and dispatch: the connection
//! state, the Candidate Set and the Refused Set.
//!
//! Outside this crate the session is read-only. Collaborators take a
//! [`Snapshot`], watch [`ConnectionState`] or subscribe to [`SessionEvent`]s;
//! every mutation happens inside one short critical section here.
//!
//! Each establishment round runs under a generation number. A reset bumps the
//! generation, so a round that was superseded cannot commit its results.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use linkr_common::endpoint::Endpoint;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::dispatch::{Attempt, DeliveryReport};
use crate::link::Outcome;
use crate::scanner::ScanProgress;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting {
        attempt: u32,
    },
    Connected(Endpoint),
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting { attempt } => write!(f, "connecting (attempt {attempt})"),
            ConnectionState::Connected(endpoint) => write!(f, "connected to {endpoint}"),
            ConnectionState::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    /// No endpoint has ever been stored; emitted at most once per session.
    FirstRun,
    ScanStarted {
        candidates: usize,
    },
    ScanProgress(ScanProgress),
    ScanFinished {
        reachable: usize,
    },
    ProbeFinished {
        endpoint: Endpoint,
        outcome: Outcome,
    },
    SendAttempt {
        endpoint: Endpoint,
        attempt: Attempt,
    },
    SendFinished(DeliveryReport),
}

/// Point-in-time copy of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub state: ConnectionState,
    pub candidates: BTreeSet<Endpoint>,
    pub refused: BTreeSet<Endpoint>,
}

struct Inner {
    candidates: BTreeSet<Endpoint>,
    refused: BTreeSet<Endpoint>,
    generation: u64,
    first_run_pending: bool,
}

pub struct Session {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Mutex::new(Inner {
                candidates: BTreeSet::new(),
                refused: BTreeSet::new(),
                generation: 0,
                first_run_pending: true,
            }),
            state_tx,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            state: self.state(),
            candidates: inner.candidates.clone(),
            refused: inner.refused.clone(),
        }
    }

    /// Candidates in ascending host-octet order.
    pub fn candidates(&self) -> Vec<Endpoint> {
        self.lock().candidates.iter().cloned().collect()
    }

    pub fn is_refused(&self, endpoint: &Endpoint) -> bool {
        self.lock().refused.contains(endpoint)
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn current_generation(&self) -> u64 {
        self.lock().generation
    }

    /// Opens a new round and returns its generation.
    pub(crate) fn begin_round(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.generation
    }

    /// Moves to `state` if `generation` is still current.
    pub(crate) fn transition(&self, generation: u64, state: ConnectionState) -> bool {
        let inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        self.publish_state(state);
        true
    }

    /// Replaces the Candidate Set with fresh sweep results.
    pub(crate) fn replace_candidates(&self, generation: u64, found: BTreeSet<Endpoint>) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.candidates = found;
        true
    }

    /// Makes `endpoint` the single active candidate and marks it connected.
    pub(crate) fn settle(&self, generation: u64, endpoint: Endpoint) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.candidates = BTreeSet::from([endpoint.clone()]);
        inner.refused.clear();
        self.publish_state(ConnectionState::Connected(endpoint));
        true
    }

    /// Adds `endpoint` to the Refused Set, returning whether it was new.
    ///
    /// Nothing is recorded once `generation` has been superseded.
    pub(crate) fn mark_refused(&self, generation: u64, endpoint: &Endpoint) -> bool {
        let mut inner = self.lock();
        inner.generation == generation && inner.refused.insert(endpoint.clone())
    }

    /// Runs `commit` while holding the session lock, only if `generation` is
    /// still current.
    ///
    /// A reset bumps the generation under the same lock, so work it supersedes
    /// either lands before the reset (and is cleared by it) or not at all.
    pub(crate) fn commit_if_current<R>(&self, generation: u64, commit: impl FnOnce() -> R) -> Option<R> {
        let inner = self.lock();
        (inner.generation == generation).then(commit)
    }

    /// Drops all candidates and refusals and invalidates any running round.
    pub(crate) fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.candidates.clear();
        inner.refused.clear();
        self.publish_state(ConnectionState::Disconnected);
    }

    /// True exactly once per session.
    pub(crate) fn take_first_run(&self) -> bool {
        std::mem::replace(&mut self.lock().first_run_pending, false)
    }

    // Called with `inner` held so state and sets change together.
    fn publish_state(&self, state: ConnectionState) {
        debug!(%state, "connection state changed");
        self.state_tx.send_replace(state.clone());
        self.emit(SessionEvent::StateChanged(state));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
