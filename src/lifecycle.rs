//! Subscriber-driven capture lifecycle.
//!
//! Capture runs while at least one consumer session is attached. Duplicate
//! attach/detach notifications are ignored. An optional stop grace period
//! absorbs a consumer that drops and immediately reconnects.

use crate::lock_or_recover;
use crate::segment::SegmentWriter;
use anyhow::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Opaque identity of a consumer connection, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for SessionId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Sessions currently attached.
#[derive(Debug, Default, Clone)]
pub struct SubscriberSet {
    sessions: HashSet<SessionId>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the session was already present.
    pub fn add(&mut self, session: SessionId) -> bool {
        self.sessions.insert(session)
    }

    /// Returns false if the session was not present.
    pub fn remove(&mut self, session: &SessionId) -> bool {
        self.sessions.remove(session)
    }

    pub fn contains(&self, session: &SessionId) -> bool {
        self.sessions.contains(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

/// What the controller drives. Implemented by [`SegmentWriter`].
pub trait CaptureControl: Send + Sync + 'static {
    fn start(&self) -> Result<()>;
    fn stop(&self);
    fn is_active(&self) -> bool;
}

impl CaptureControl for SegmentWriter {
    fn start(&self) -> Result<()> {
        SegmentWriter::start(self)
    }

    fn stop(&self) {
        SegmentWriter::stop(self)
    }

    fn is_active(&self) -> bool {
        SegmentWriter::is_active(self)
    }
}

#[derive(Debug, Default)]
struct LifecycleState {
    subscribers: SubscriberSet,
    /// Bumped on every membership change so a pending deferred stop can tell
    /// it has been overtaken.
    generation: u64,
}

pub struct LifecycleController<C: CaptureControl> {
    capture: Arc<C>,
    state: Arc<Mutex<LifecycleState>>,
    stop_grace: Duration,
}

impl<C: CaptureControl> LifecycleController<C> {
    /// `stop_grace` of zero stops capture in the same call that removes the
    /// last subscriber.
    pub fn new(capture: Arc<C>, stop_grace: Duration) -> Self {
        Self {
            capture,
            state: Arc::new(Mutex::new(LifecycleState::default())),
            stop_grace,
        }
    }

    /// Attach a session; starts capture when it is the first one.
    ///
    /// Errors only when capture had to start and the source failed to open.
    /// A session whose attach failed is not kept, so retrying it (or any
    /// other session) attempts the start again. A duplicate subscribe also
    /// retries when capture is not running.
    pub fn on_subscribe(&self, session: impl Into<SessionId>) -> Result<()> {
        let session = session.into();
        let mut state = lock_or_recover(&self.state, "lifecycle subscribe");
        let added = state.subscribers.add(session.clone());
        if added {
            state.generation += 1;
            info!(session = %session, subscribers = state.subscribers.len(), "subscriber attached");
        } else {
            debug!(session = %session, "duplicate subscribe");
        }

        if self.capture.is_active() {
            return Ok(());
        }
        if let Err(err) = self.capture.start() {
            if added {
                state.subscribers.remove(&session);
                state.generation += 1;
            }
            return Err(err.context(format!("failed to start capture for session {session}")));
        }
        Ok(())
    }

    /// Detach a session; stops capture when it was the last one.
    pub fn on_unsubscribe(&self, session: impl Into<SessionId>) {
        let session = session.into();
        let mut state = lock_or_recover(&self.state, "lifecycle unsubscribe");
        if !state.subscribers.remove(&session) {
            debug!(session = %session, "unsubscribe for unknown session ignored");
            return;
        }
        state.generation += 1;
        info!(session = %session, subscribers = state.subscribers.len(), "subscriber detached");

        if !state.subscribers.is_empty() {
            return;
        }
        if self.stop_grace.is_zero() {
            self.capture.stop();
            return;
        }

        let generation = state.generation;
        drop(state);
        let capture = self.capture.clone();
        let shared = self.state.clone();
        let grace = self.stop_grace;
        let spawned = thread::Builder::new()
            .name("capture-stop-grace".to_string())
            .spawn(move || {
                thread::sleep(grace);
                let state = lock_or_recover(&shared, "lifecycle deferred stop");
                if state.generation == generation && state.subscribers.is_empty() {
                    capture.stop();
                } else {
                    debug!("deferred stop cancelled by a new subscriber");
                }
            });
        if let Err(err) = spawned {
            warn!("failed to schedule deferred stop, stopping now: {err}");
            let _state = lock_or_recover(&self.state, "lifecycle stop fallback");
            self.capture.stop();
        }
    }

    /// Drop every session and stop capture immediately.
    pub fn shutdown(&self) {
        let mut state = lock_or_recover(&self.state, "lifecycle shutdown");
        state.subscribers.clear();
        state.generation += 1;
        self.capture.stop();
    }

    pub fn subscriber_count(&self) -> usize {
        lock_or_recover(&self.state, "lifecycle status").subscribers.len()
    }

    pub fn is_subscribed(&self, session: &SessionId) -> bool {
        lock_or_recover(&self.state, "lifecycle status")
            .subscribers
            .contains(session)
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_active()
    }
}
