//! Admission control for inbound chat actions.
//!
//! Two checks run before an action reaches the store:
//! - dedup: the same `(user, chat, message, payload)` repeated within
//!   `dedup_ttl` of its previous sighting is dropped. Every sighting refreshes
//!   the timestamp, so a burst of repeats stays suppressed (debounce, not a
//!   fixed window).
//! - in-flight: at most one action per user is processed at a time. The lock
//!   expires on its own after `in_flight_timeout` if a release is missed.
//!
//! Both maps sit behind one mutex so the checks are linearizable with each
//! other.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use quiz_core::model::UserId;

use crate::config::GuardConfig;

/// Identity of one inbound action for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub user: UserId,
    pub chat: i64,
    pub message: i64,
    pub payload: String,
}

impl ActionKey {
    #[must_use]
    pub fn new(user: UserId, chat: i64, message: i64, payload: impl Into<String>) -> Self {
        Self {
            user,
            chat,
            message,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Default)]
struct GuardState {
    last_seen: HashMap<ActionKey, Instant>,
    in_flight: HashMap<UserId, Instant>,
    calls_since_sweep: u32,
}

impl GuardState {
    fn is_duplicate(&mut self, key: &ActionKey, now: Instant, config: &GuardConfig) -> bool {
        let previous = self.last_seen.insert(key.clone(), now);
        previous.is_some_and(|at| now.saturating_duration_since(at) < config.dedup_ttl)
    }

    fn try_acquire(&mut self, user: UserId, now: Instant, config: &GuardConfig) -> bool {
        if let Some(&at) = self.in_flight.get(&user) {
            if now.saturating_duration_since(at) < config.in_flight_timeout {
                return false;
            }
        }
        self.in_flight.insert(user, now);
        true
    }

    fn sweep(&mut self, now: Instant, config: &GuardConfig) -> usize {
        let before = self.last_seen.len() + self.in_flight.len();
        self.last_seen
            .retain(|_, at| now.saturating_duration_since(*at) < config.dedup_ttl);
        self.in_flight
            .retain(|_, at| now.saturating_duration_since(*at) < config.in_flight_timeout);
        self.calls_since_sweep = 0;
        before - (self.last_seen.len() + self.in_flight.len())
    }

    fn tick(&mut self, now: Instant, config: &GuardConfig) {
        self.calls_since_sweep = self.calls_since_sweep.saturating_add(1);
        if config.sweep_every > 0 && self.calls_since_sweep >= config.sweep_every {
            let purged = self.sweep(now, config);
            if purged > 0 {
                tracing::trace!(purged, "action guard swept stale entries");
            }
        }
    }
}

/// Outcome of [`ActionGuard::admit`].
#[derive(Debug)]
#[must_use]
pub enum Admission<'a> {
    /// Same action seen moments ago; drop it.
    Duplicate,
    /// Another action of this user is still being handled.
    Busy,
    /// Go ahead; the user stays locked until the permit is dropped.
    Admitted(InFlightPermit<'a>),
}

/// Holds a user's in-flight lock and releases it on drop, on every exit path
/// of the handler including early returns and panics.
#[derive(Debug)]
#[must_use = "dropping the permit releases the user immediately"]
pub struct InFlightPermit<'a> {
    guard: &'a ActionGuard,
    user: UserId,
}

impl InFlightPermit<'_> {
    #[must_use]
    pub fn user(&self) -> UserId {
        self.user
    }
}

impl Drop for InFlightPermit<'_> {
    fn drop(&mut self) {
        self.guard.release(self.user);
    }
}

/// Dedup window plus per-user in-flight lock.
#[derive(Debug, Default)]
pub struct ActionGuard {
    config: GuardConfig,
    state: Mutex<GuardState>,
}

impl ActionGuard {
    #[must_use]
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GuardState::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    // The maps stay structurally valid if a holder panicked, so a poisoned
    // lock is still usable.
    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a sighting of `key` at `now`; true if the previous sighting was
    /// less than `dedup_ttl` ago.
    pub fn is_duplicate(&self, key: &ActionKey, now: Instant) -> bool {
        let mut state = self.lock();
        state.tick(now, &self.config);
        let duplicate = state.is_duplicate(key, now, &self.config);
        if duplicate {
            tracing::debug!(user = %key.user, payload = %key.payload, "duplicate action suppressed");
        }
        duplicate
    }

    /// Take the in-flight lock for `user`. False while an unexpired lock exists.
    pub fn try_acquire(&self, user: UserId, now: Instant) -> bool {
        let mut state = self.lock();
        state.tick(now, &self.config);
        let acquired = state.try_acquire(user, now, &self.config);
        if !acquired {
            tracing::debug!(%user, "user busy, action rejected");
        }
        acquired
    }

    /// Drop the in-flight lock for `user`, whether or not it is held.
    pub fn release(&self, user: UserId) {
        self.lock().in_flight.remove(&user);
    }

    /// Dedup check and lock acquisition in one step.
    ///
    /// The dedup timestamp is refreshed even when the user turns out to be busy.
    pub fn admit(&self, key: &ActionKey, now: Instant) -> Admission<'_> {
        let mut state = self.lock();
        state.tick(now, &self.config);
        if state.is_duplicate(key, now, &self.config) {
            tracing::debug!(user = %key.user, payload = %key.payload, "duplicate action suppressed");
            return Admission::Duplicate;
        }
        if !state.try_acquire(key.user, now, &self.config) {
            tracing::debug!(user = %key.user, "user busy, action rejected");
            return Admission::Busy;
        }
        Admission::Admitted(InFlightPermit {
            guard: self,
            user: key.user,
        })
    }

    /// [`admit`](Self::admit) at the current instant.
    pub fn admit_now(&self, key: &ActionKey) -> Admission<'_> {
        self.admit(key, Instant::now())
    }

    /// Purge dedup entries and locks that have already expired. Returns how
    /// many were removed. Runs automatically every `sweep_every` calls.
    pub fn sweep(&self, now: Instant) -> usize {
        self.lock().sweep(now, &self.config)
    }

    /// Number of tracked dedup keys and in-flight users.
    #[must_use]
    pub fn tracked(&self) -> (usize, usize) {
        let state = self.lock();
        (state.last_seen.len(), state.in_flight.len())
    }
}
