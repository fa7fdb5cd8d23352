//! Bounded polling with a fixed delay
//!
//! The only retry semantics of a run: no backoff, no jitter.

use super::cancel::CancelToken;
use std::time::{Duration, Instant};

/// Waits between poll attempts
pub trait Sleeper: Send + Sync {
    /// Sleeps for `duration`. Returns false if the wait was interrupted.
    fn sleep(&self, duration: Duration) -> bool;
}

/// Sleeps on the current thread, waking early when the token is cancelled
#[derive(Debug, Clone, Default)]
pub struct ThreadSleeper {
    cancel: CancelToken,
}

impl ThreadSleeper {
    const SLICE: Duration = Duration::from_millis(100);

    /// Creates a sleeper observing `cancel`
    #[must_use]
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(Self::SLICE.min(deadline - now));
        }
    }
}

/// Calls `predicate` up to `max_attempts` times, sleeping `delay` between
/// attempts. Returns true on the first success, false when attempts run out.
pub fn poll_until<P>(predicate: P, max_attempts: u32, delay: Duration) -> bool
where
    P: FnMut(u32) -> bool,
{
    poll_until_with(predicate, max_attempts, delay, &ThreadSleeper::default())
}

/// [`poll_until`] with an explicit [`Sleeper`].
///
/// The predicate receives the 1-based attempt number. An interrupted sleep
/// ends polling with false.
pub fn poll_until_with<P>(
    mut predicate: P,
    max_attempts: u32,
    delay: Duration,
    sleeper: &dyn Sleeper,
) -> bool
where
    P: FnMut(u32) -> bool,
{
    for attempt in 1..=max_attempts {
        if predicate(attempt) {
            tracing::debug!(attempt, max_attempts, "Poll succeeded");
            return true;
        }

        if attempt == max_attempts {
            break;
        }

        tracing::debug!(attempt, max_attempts, delay_ms = delay.as_millis(), "Poll attempt failed, waiting");
        if !sleeper.sleep(delay) {
            tracing::warn!(attempt, "Polling interrupted");
            return false;
        }
    }

    false
}
