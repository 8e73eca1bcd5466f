//! `keepalive`: periodic harmless input so the session does not lock.
//!
//! The worker is a plain thread parked on a channel with a timeout. Each
//! timeout taps shift; a message on the channel (or the run's stop flag)
//! ends it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Args, ExecContext, ExecResult, Outcome, ScriptResult};
use crate::backend::{Actuator, Key, NamedKey, SharedInput};
use crate::retry::StopFlag;

pub const DEFAULT_INTERVAL_MINUTES: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    Start { interval_minutes: u32 },
    Stop,
    Status,
}

impl KeepAliveAction {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        let word = args.required("action")?;
        let action = if word.is_word("start") {
            let interval_minutes = match args.peek() {
                Some(_) => args.value("minutes")?,
                None => DEFAULT_INTERVAL_MINUTES,
            };
            if interval_minutes == 0 {
                return Err(args.invalid("minutes", "0"));
            }
            KeepAliveAction::Start { interval_minutes }
        } else if word.is_word("stop") {
            KeepAliveAction::Stop
        } else if word.is_word("status") {
            KeepAliveAction::Status
        } else {
            return Err(args.invalid("action", word.text.clone()));
        };
        args.finish()?;
        Ok(action)
    }

    pub fn to_args(&self) -> Vec<String> {
        match self {
            KeepAliveAction::Start { interval_minutes } => {
                vec!["start".into(), interval_minutes.to_string()]
            }
            KeepAliveAction::Stop => vec!["stop".into()],
            KeepAliveAction::Status => vec!["status".into()],
        }
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        match *self {
            KeepAliveAction::Start { interval_minutes } => {
                let interval = Duration::from_secs(u64::from(interval_minutes) * 60);
                ctx.keepalive.start(ctx.backends.input.clone(), interval, ctx.stop.clone());
            }
            KeepAliveAction::Stop => ctx.keepalive.stop(),
            KeepAliveAction::Status => {
                let status = ctx.keepalive.status();
                info!(
                    running = status.running,
                    interval_secs = status.interval.map(|d| d.as_secs()),
                    ticks = status.ticks,
                    "keepalive status"
                );
            }
        }
        Ok(Outcome::Completed)
    }
}

/// Snapshot of the keepalive worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeepAliveStatus {
    pub running: bool,
    pub interval: Option<Duration>,
    /// Taps sent since the worker was last started
    pub ticks: u64,
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
    interval: Duration,
}

/// Owner of at most one keepalive worker
#[derive(Default)]
pub struct KeepAlive {
    worker: Option<Worker>,
    ticks: Arc<AtomicU64>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tapping shift every `interval`, replacing a running worker.
    /// The worker also ends once `stop` is set.
    pub fn start(&mut self, input: SharedInput, interval: Duration, stop: StopFlag) {
        self.stop();
        self.ticks.store(0, Ordering::SeqCst);

        let (shutdown, signal) = mpsc::channel::<()>();
        let ticks = Arc::clone(&self.ticks);
        let handle = thread::spawn(move || {
            let key = Key::Named(NamedKey::Shift);
            loop {
                match signal.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                if stop.is_set() {
                    break;
                }
                match Actuator::new(&input, &stop).key_tap(key) {
                    Ok(()) => {
                        let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!(ticks = n, "keepalive tap");
                    }
                    Err(e) => warn!(error = %e, "keepalive tap failed"),
                }
            }
            debug!("keepalive worker exited");
        });

        info!(interval_secs = interval.as_secs(), "keepalive started");
        self.worker = Some(Worker {
            shutdown,
            handle,
            interval,
        });
    }

    /// Stop the worker and wait for it to exit; no-op when idle
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(());
            if worker.handle.join().is_err() {
                warn!("keepalive worker panicked");
            }
            info!("keepalive stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    pub fn status(&self) -> KeepAliveStatus {
        KeepAliveStatus {
            running: self.is_running(),
            interval: self.worker.as_ref().map(|w| w.interval),
            ticks: self.ticks.load(Ordering::SeqCst),
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAlive").field("status", &self.status()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{InputEvent, RecordingInput};
    use crate::backend::shared_input;
    use crate::command::tokenize;
    use std::time::Instant;

    fn keepalive(line: &str) -> ScriptResult<KeepAliveAction> {
        let tokens = tokenize(line).unwrap();
        KeepAliveAction::parse(Args::new("keepalive", &tokens))
    }

    #[test]
    fn parses_actions() {
        assert_eq!(
            keepalive("start"),
            Ok(KeepAliveAction::Start {
                interval_minutes: DEFAULT_INTERVAL_MINUTES
            })
        );
        assert_eq!(keepalive("START 2"), Ok(KeepAliveAction::Start { interval_minutes: 2 }));
        assert_eq!(keepalive("stop"), Ok(KeepAliveAction::Stop));
        assert_eq!(keepalive("status"), Ok(KeepAliveAction::Status));
        assert!(keepalive("start 0").is_err());
        assert!(keepalive("pause").is_err());
        assert!(keepalive("").is_err());
    }

    #[test]
    fn worker_taps_shift_until_stopped() {
        let recorder = RecordingInput::new();
        let log = recorder.log();
        let mut keepalive = KeepAlive::new();

        keepalive.start(shared_input(recorder), Duration::from_millis(20), StopFlag::new());
        thread::sleep(Duration::from_millis(110));
        assert!(keepalive.is_running());
        keepalive.stop();

        let status = keepalive.status();
        assert!(!status.running);
        assert!(status.ticks >= 2, "ticks = {}", status.ticks);

        let events = log.events();
        assert_eq!(events.len() as u64, status.ticks * 2);
        assert_eq!(events[0], InputEvent::KeyDown(Key::Named(NamedKey::Shift)));
        assert_eq!(events[1], InputEvent::KeyUp(Key::Named(NamedKey::Shift)));
    }

    #[test]
    fn run_stop_flag_ends_worker() {
        let stop = StopFlag::new();
        let mut keepalive = KeepAlive::new();
        keepalive.start(shared_input(RecordingInput::new()), Duration::from_millis(10), stop.clone());
        stop.set();

        let deadline = Instant::now() + Duration::from_secs(1);
        while keepalive.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!keepalive.is_running());
    }

    #[test]
    fn stop_is_prompt_with_long_interval() {
        let mut keepalive = KeepAlive::new();
        keepalive.start(shared_input(RecordingInput::new()), Duration::from_secs(600), StopFlag::new());
        let started = Instant::now();
        keepalive.stop();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(keepalive.status().ticks, 0);
    }
}
