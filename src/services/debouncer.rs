//! Per-space coalescing of re-index requests.
//!
//! A burst of change signals for one space collapses into a single callback
//! run `delay` after the last signal. A space never runs two callbacks at
//! once: if the timer fires while a run is still in progress, the timer is
//! re-armed and the callback runs again after the current run finishes.

use crate::models::{SpaceId, UserId};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Callback invoked once a space has been quiet for the debounce delay.
///
/// Runs on the blocking thread pool.
pub type DebounceCallback = Arc<dyn Fn(&SpaceId, &UserId) + Send + Sync>;

struct Pending {
    generation: u64,
    user: UserId,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    pending: HashMap<SpaceId, Pending>,
    in_progress: HashSet<SpaceId>,
    next_generation: u64,
}

struct Inner {
    delay: Duration,
    callback: DebounceCallback,
    runtime: Handle,
    state: Mutex<State>,
}

/// Schedules at most one callback run per space.
///
/// Cloning is cheap; clones share their timers.
#[derive(Clone)]
pub struct SpaceDebouncer {
    inner: Arc<Inner>,
}

impl SpaceDebouncer {
    /// Creates a debouncer on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when called outside a tokio runtime.
    pub fn new(delay: Duration, callback: DebounceCallback) -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|e| Error::operation("debouncer_runtime", e))?;
        Ok(Self::with_handle(runtime, delay, callback))
    }

    /// Creates a debouncer whose timers run on `runtime`.
    #[must_use]
    pub fn with_handle(runtime: Handle, delay: Duration, callback: DebounceCallback) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay,
                callback,
                runtime,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Returns the debounce delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Schedules the callback for `space`, resetting any pending timer.
    ///
    /// The most recent `user` is the one passed to the callback.
    pub fn debounce(&self, space: &SpaceId, user: &UserId) {
        let mut state = self.inner.lock();
        if let Some(previous) = state.pending.remove(space) {
            previous.timer.abort();
        }
        Inner::arm(&self.inner, &mut state, space.clone(), user.clone());
        metrics::counter!("debouncer_scheduled_total").increment(1);
        tracing::debug!(space_id = %space, "Scheduled space re-index");
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("debouncer mutex was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Starts a timer for `space` and records it as pending.
    fn arm(this: &Arc<Self>, state: &mut State, space: SpaceId, user: UserId) {
        state.next_generation += 1;
        let generation = state.next_generation;

        let inner = Arc::clone(this);
        let timer_space = space.clone();
        let timer = this.runtime.spawn(async move {
            tokio::time::sleep(inner.delay).await;
            Self::fire(&inner, &timer_space, generation);
        });

        state.pending.insert(
            space,
            Pending {
                generation,
                user,
                timer,
            },
        );
    }

    fn fire(this: &Arc<Self>, space: &SpaceId, generation: u64) {
        let mut state = this.lock();
        // a newer debounce call replaced this timer
        if state.pending.get(space).is_none_or(|p| p.generation != generation) {
            return;
        }

        let Some(pending) = state.pending.remove(space) else {
            return;
        };

        if state.in_progress.contains(space) {
            metrics::counter!("debouncer_rescheduled_total").increment(1);
            tracing::debug!(space_id = %space, "Space is still being indexed, deferring");
            Self::arm(this, &mut state, space.clone(), pending.user);
            return;
        }

        state.in_progress.insert(space.clone());
        drop(state);
        metrics::counter!("debouncer_fired_total").increment(1);

        let inner = Arc::clone(this);
        let space = space.clone();
        let user = pending.user;
        this.runtime.spawn_blocking(move || {
            let _guard = InProgressGuard {
                inner: Arc::clone(&inner),
                space: space.clone(),
            };
            (inner.callback)(&space, &user);
        });
    }
}

/// Clears the in-progress mark when a callback returns or panics.
struct InProgressGuard {
    inner: Arc<Inner>,
    space: SpaceId,
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.inner.lock().in_progress.remove(&self.space);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Arc<AtomicUsize>, DebounceCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let callback: DebounceCallback = Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spaces_are_independent() {
        let (count, callback) = counting();
        let debouncer = SpaceDebouncer::new(Duration::from_millis(50), callback).unwrap();
        let user = UserId::new("alice");

        debouncer.debounce(&SpaceId::new("st", "a"), &user);
        debouncer.debounce(&SpaceId::new("st", "b"), &user);
        debouncer.debounce(&SpaceId::new("st", "a"), &user);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let (_, callback) = counting();
        assert!(SpaceDebouncer::new(Duration::from_millis(1), callback).is_err());
    }
}
