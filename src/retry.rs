//! Cooperative cancellation and interruptible waiting.
//!
//! A single [`StopFlag`] is owned by whoever drives a run and cloned into every
//! component that can block. Waits are split into short slices so that a stop
//! request is observed within one poll interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Shared stop request, cheap to clone across threads
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that in-flight work unwinds
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear a previous stop request before starting a new run
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleep for `total`, re-checking `should_stop` after every slice of at most
/// `slice`. Returns `true` as soon as a stop is observed, `false` once the full
/// duration has elapsed.
pub fn interruptible_wait<F>(total: Duration, slice: Duration, mut should_stop: F) -> bool
where
    F: FnMut() -> bool,
{
    if should_stop() {
        return true;
    }

    let slice = if slice.is_zero() {
        Duration::from_millis(1)
    } else {
        slice
    };
    // A wait past the end of the clock only ends on stop
    let deadline = Instant::now().checked_add(total);

    loop {
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                slice.min(deadline - now)
            }
            None => slice,
        };
        thread::sleep(pause);
        if should_stop() {
            return true;
        }
    }
}

/// Convenience wrapper polling a [`StopFlag`]
pub fn wait_or_stop(total: Duration, slice: Duration, stop: &StopFlag) -> bool {
    interruptible_wait(total, slice, || stop.is_set())
}

/// Terminal state of a bounded polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held on the given attempt (1-based)
    Matched { attempt: u32 },
    /// Every attempt ran without the condition holding
    Exhausted { attempts: u32 },
    /// The stop flag was observed after the given number of completed attempts
    Interrupted { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Matched { attempt } => *attempt,
            PollOutcome::Exhausted { attempts } | PollOutcome::Interrupted { attempts } => *attempts,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, PollOutcome::Matched { .. })
    }
}

/// Run `attempt` up to `max_tries` times, sleeping `interval` (interruptibly)
/// between tries. `attempt` receives the 1-based try number and returns
/// `true` on success. The stop flag is checked before every attempt and during
/// every pause.
pub fn poll_until<F>(
    max_tries: u32,
    interval: Duration,
    slice: Duration,
    stop: &StopFlag,
    mut attempt: F,
) -> PollOutcome
where
    F: FnMut(u32) -> bool,
{
    let max_tries = max_tries.max(1);
    let mut completed = 0;

    for n in 1..=max_tries {
        if stop.is_set() {
            return PollOutcome::Interrupted { attempts: completed };
        }
        let matched = attempt(n);
        completed = n;
        if matched {
            return PollOutcome::Matched { attempt: n };
        }
        if n < max_tries && wait_or_stop(interval, slice, stop) {
            return PollOutcome::Interrupted { attempts: completed };
        }
    }

    PollOutcome::Exhausted {
        attempts: completed,
    }
}
