//! Destroy confirmation polling
//!
//! Deleting a cluster only starts an asynchronous teardown. The wait loop
//! polls the store until the cluster is gone, the timeout elapses, or the
//! caller cancels. Time is read through a [`Clock`] so tests can run the loop
//! against a [`ManualClock`] without sleeping.

use crate::spec::ClusterSpec;
use crate::store::ClusterStore;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Timeout used when none is configured.
pub const DEFAULT_DESTROY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Longest single sleep of [`SystemClock`] before re-checking cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Whether and how long to wait for delete confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyWaitPolicy {
    pub disabled: bool,
    /// `None` means [`DEFAULT_DESTROY_TIMEOUT`]
    pub timeout: Option<Duration>,
}

impl DestroyWaitPolicy {
    /// Policy from the spec's destroy flags.
    ///
    /// Zero or negative timeouts select the default; they never mean "don't wait".
    pub fn from_spec(spec: &ClusterSpec) -> Self {
        Self {
            disabled: spec.disable_waiting_in_destroy,
            timeout: spec.destroy_timeout.and_then(minutes),
        }
    }

    /// Policy that returns right after the delete call.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_DESTROY_TIMEOUT)
    }
}

fn minutes(value: i64) -> Option<Duration> {
    let value = u64::try_from(value).ok().filter(|m| *m > 0)?;
    Some(Duration::from_secs(value.saturating_mul(60)))
}

/// Shared cancellation flag with an optional deadline.
///
/// Clones share the flag, so any clone can cancel a wait in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also counts as cancelled once `deadline` has passed.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if the token was cancelled or its deadline is at or before `now`.
    pub fn is_cancelled(&self, now: Instant) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| now >= d)
    }
}

/// Source of time for the wait loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Sleep for `duration`, returning early if `cancel` fires.
    fn sleep(&self, duration: Duration, cancel: &CancelToken);
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        let until = Instant::now().checked_add(duration);
        loop {
            let now = Instant::now();
            if cancel.is_cancelled(now) {
                return;
            }
            let slice = match until {
                Some(until) if now >= until => return,
                Some(until) => (until - now).min(SLEEP_SLICE),
                None => SLEEP_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}

/// Clock that only advances when slept on.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock().unwrap_or_else(std::sync::PoisonError::into_inner) += by;
    }

    /// Time advanced since creation.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Every sleep requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration, _cancel: &CancelToken) {
        self.sleeps
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(duration);
        self.advance(duration);
    }
}

/// How a wait for removal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The store reported the cluster as not found.
    Gone { waited: Duration },
    /// The timeout elapsed with the cluster still present.
    TimedOut { waited: Duration },
    /// The cancel token fired first.
    Cancelled { waited: Duration },
}

/// Poll `store` until `id` is gone, `timeout` elapses, or `cancel` fires.
///
/// The first poll happens immediately. Fetch errors are logged and polling
/// continues, since the delete has already been accepted.
pub fn wait_until_gone<S, C>(
    store: &S,
    id: &str,
    timeout: Duration,
    poll_interval: Duration,
    clock: &C,
    cancel: &CancelToken,
) -> WaitResult
where
    S: ClusterStore + ?Sized,
    C: Clock + ?Sized,
{
    let start = clock.now();
    // A timeout past the end of the clock's range never elapses.
    let deadline = start.checked_add(timeout);
    let mut attempt = 0u32;

    loop {
        let now = clock.now();
        if cancel.is_cancelled(now) {
            return WaitResult::Cancelled {
                waited: now - start,
            };
        }

        attempt += 1;
        match store.fetch(id) {
            Ok(None) => {
                return WaitResult::Gone {
                    waited: clock.now() - start,
                };
            }
            Ok(Some(doc)) => match doc.state {
                Some(state) => debug!("Poll {attempt}: cluster {id} is {state}"),
                None => debug!("Poll {attempt}: cluster {id} still present"),
            },
            Err(e) => warn!("Poll {attempt}: failed to fetch cluster {id}: {e}"),
        }

        let now = clock.now();
        let sleep = match deadline {
            Some(deadline) if now >= deadline => {
                return WaitResult::TimedOut {
                    waited: now - start,
                };
            }
            Some(deadline) => poll_interval.min(deadline - now),
            None => poll_interval,
        };
        clock.sleep(sleep, cancel);
    }
}
