//! The command processor: parse one line, resolve the target window, execute.
//!
//! Nothing escapes [`Processor::process`]. Parse failures, missing windows and
//! backend errors all come back as an [`Outcome`] and are logged here.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::backend::Backends;
use crate::command::app::rank_windows;
use crate::command::{Command, ExecContext, KeepAlive, Outcome};
use crate::config::RunSettings;
use crate::coords::WindowBox;
use crate::retry::StopFlag;
use crate::session::Session;
use crate::state::SharedState;

#[derive(Debug, Clone)]
struct CachedWindow {
    target: String,
    bounds: WindowBox,
    fetched: Instant,
}

/// Interpreter for script lines, owning everything a run mutates
pub struct Processor {
    backends: Backends,
    state: SharedState,
    session: Session,
    settings: RunSettings,
    stop: StopFlag,
    keepalive: KeepAlive,
    window_cache: Option<CachedWindow>,
}

impl Processor {
    pub fn new(backends: Backends, session: Session, settings: RunSettings) -> Self {
        let title = session.id.clone();
        Self {
            backends,
            state: SharedState::new(title),
            session,
            settings,
            stop: StopFlag::new(),
            keepalive: KeepAlive::new(),
            window_cache: None,
        }
    }

    /// Start from an existing state instead of a fresh one
    pub fn with_state(mut self, state: SharedState) -> Self {
        self.state = state;
        self
    }

    /// Use an externally owned stop flag
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Handle for requesting a stop from another thread
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SharedState {
        &mut self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn keepalive(&self) -> &KeepAlive {
        &self.keepalive
    }

    /// Select the window that commands target from now on
    pub fn select_target(&mut self, title: impl Into<String>) {
        self.state.select_target(title);
        self.window_cache = None;
    }

    /// Set the 1-based pass number seen by iteration-aware commands
    pub fn set_iteration(&mut self, iteration: u32) {
        self.state.iteration_count = iteration.max(1);
    }

    /// Parse and execute one script line
    pub fn process(&mut self, line: &str, fallback: Option<WindowBox>) -> Outcome {
        if self.stop.is_set() {
            debug!(line, "stop requested, not dispatching");
            return Outcome::Interrupted;
        }

        match Command::parse_line(line) {
            Ok(command) => self.dispatch(&command, fallback),
            Err(e) => {
                warn!(line, error = %e, "skipping malformed command");
                Outcome::skipped(e)
            }
        }
    }

    /// Execute an already parsed command
    pub fn dispatch(&mut self, command: &Command, fallback: Option<WindowBox>) -> Outcome {
        if self.stop.is_set() {
            return Outcome::Interrupted;
        }

        let window = self.resolve_window().or(fallback);
        let target_before = self.state.window.target.clone();
        let name = command.name();
        debug!(command = %command, window = ?window, "dispatching");

        let mut ctx = ExecContext {
            backends: &mut self.backends,
            state: &mut self.state,
            session: &self.session,
            settings: &self.settings,
            stop: &self.stop,
            keepalive: &mut self.keepalive,
            window,
        };

        let outcome = match command.execute(&mut ctx) {
            Ok(outcome) => outcome,
            Err(e) => Outcome::from_error(&e),
        };

        if self.state.window.target != target_before {
            self.window_cache = None;
        }

        match &outcome {
            Outcome::Completed => debug!(command = name, "completed"),
            Outcome::Interrupted => info!(command = name, "interrupted"),
            Outcome::TimedOut { attempts } => warn!(command = name, attempts, "timed out"),
            Outcome::Skipped { reason } => warn!(command = name, %reason, "skipped"),
            Outcome::Failed { reason } => error!(command = name, %reason, "failed"),
        }
        outcome
    }

    /// Live bounds of the selected target, if any window matches it.
    ///
    /// With a zero cache TTL (the default) the OS is queried on every call;
    /// otherwise a box younger than the TTL is reused for the same target.
    pub fn resolve_window(&mut self) -> Option<WindowBox> {
        let target = self.state.window.target.clone()?;
        let ttl = self.settings.window_cache_ttl;

        if let Some(cached) = self.cached_window(&target, ttl) {
            return Some(cached);
        }

        let windows = match self.backends.windows.find_windows(&target) {
            Ok(windows) => windows,
            Err(e) => {
                warn!(%target, error = %e, "window lookup failed");
                return None;
            }
        };

        let Some(best) = rank_windows(&target, windows).into_iter().next() else {
            debug!(%target, "target window not found");
            self.window_cache = None;
            return None;
        };

        let bounds = best.bounds();
        if !ttl.is_zero() {
            self.window_cache = Some(CachedWindow {
                target,
                bounds,
                fetched: Instant::now(),
            });
        }
        Some(bounds)
    }

    fn cached_window(&self, target: &str, ttl: Duration) -> Option<WindowBox> {
        if ttl.is_zero() {
            return None;
        }
        self.window_cache
            .as_ref()
            .filter(|c| c.target == target && c.fetched.elapsed() < ttl)
            .map(|c| c.bounds)
    }

    /// Stop background helpers; the processor stays usable
    pub fn shutdown(&mut self) {
        self.keepalive.stop();
    }

    /// Release the state and session, stopping background helpers
    pub fn into_parts(mut self) -> (SharedState, Session) {
        self.shutdown();
        let Processor { state, session, .. } = self;
        (state, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{FramebufferCapturer, InputEvent, RecordingInput, RecordingLauncher, StaticWindows};
    use crate::backend::{MouseButton, WindowInfo, shared_input};
    use crate::coords::Resolution;
    use crate::ocr::ScriptedRecognizer;

    fn processor(
        windows: StaticWindows,
        settings: RunSettings,
    ) -> (Processor, crate::backend::mock::InputLog, tempfile::TempDir) {
        let input = RecordingInput::new();
        let log = input.log();
        let backends = Backends {
            input: shared_input(input),
            capture: Box::new(FramebufferCapturer::new(Resolution::new(1920, 1080))),
            windows: Box::new(windows),
            launcher: Box::new(RecordingLauncher::new()),
            recognizer: Box::new(ScriptedRecognizer::always("")),
        };
        let dir = tempfile::tempdir().unwrap();
        let session = Session::in_dir(dir.path().join("session"));
        session.init().unwrap();
        (Processor::new(backends, session, settings), log, dir)
    }

    fn fast() -> RunSettings {
        RunSettings::defaults()
            .poll_interval(Duration::from_millis(5))
            .tap_delay(Duration::ZERO)
    }

    #[test]
    fn malformed_and_unknown_lines_are_skipped() {
        let (mut p, log, _dir) = processor(StaticWindows::default(), fast());
        assert!(matches!(p.process("click 1", None), Outcome::Skipped { .. }));
        assert!(matches!(p.process("teleport home", None), Outcome::Skipped { .. }));
        assert!(log.events().is_empty());
    }

    #[test]
    fn stop_flag_prevents_dispatch() {
        let (mut p, log, _dir) = processor(StaticWindows::default(), fast());
        p.stop_flag().set();
        assert_eq!(p.process("click 1 1 offset", Some(WindowBox::new(0, 0, 10, 10))), Outcome::Interrupted);
        assert!(log.events().is_empty());
    }

    #[test]
    fn click_without_window_is_skipped() {
        let (mut p, log, _dir) = processor(StaticWindows::default(), fast());
        assert!(matches!(p.process("click 10 10", None), Outcome::Skipped { .. }));
        assert!(log.events().is_empty());
    }

    #[test]
    fn live_window_beats_fallback() {
        let windows = StaticWindows::new(vec![WindowInfo::new("Editor", 100, 200, 800, 600)]);
        let (mut p, log, _dir) = processor(windows.clone(), fast());
        p.select_target("Editor");

        let fallback = Some(WindowBox::new(0, 0, 800, 600));
        assert_eq!(p.process("click 10 10 offset", fallback), Outcome::Completed);

        windows.move_window("Editor", 300, 50, 800, 600);
        assert_eq!(p.process("click 10 10 offset", fallback), Outcome::Completed);

        let moves: Vec<InputEvent> = log
            .events()
            .into_iter()
            .filter(|e| matches!(e, InputEvent::MouseMove(..)))
            .collect();
        assert_eq!(moves, vec![InputEvent::MouseMove(110, 210), InputEvent::MouseMove(310, 60)]);
        assert_eq!(windows.query_count(), 2);
    }

    #[test]
    fn missing_target_falls_back() {
        let (mut p, log, _dir) = processor(StaticWindows::default(), fast());
        p.select_target("Gone");
        assert_eq!(
            p.process("click 5 5 offset", Some(WindowBox::new(10, 10, 100, 100))),
            Outcome::Completed
        );
        assert_eq!(log.events()[0], InputEvent::MouseMove(15, 15));
        assert_eq!(log.events()[1], InputEvent::ButtonDown(MouseButton::Left));
    }

    #[test]
    fn cache_reuses_box_within_ttl() {
        let windows = StaticWindows::new(vec![WindowInfo::new("Editor", 0, 0, 800, 600)]);
        let (mut p, _, _dir) = processor(windows.clone(), fast().window_cache_ttl(Duration::from_secs(60)));
        p.select_target("Editor");
        p.process("wait 0", None);
        p.process("wait 0", None);
        assert_eq!(windows.query_count(), 1);

        p.select_target("Editor");
        p.process("wait 0", None);
        assert_eq!(windows.query_count(), 2);
    }

    #[test]
    fn set_iteration_is_one_based() {
        let (mut p, _, _dir) = processor(StaticWindows::default(), fast());
        p.set_iteration(0);
        assert_eq!(p.state().iteration_count, 1);
        p.set_iteration(4);
        assert_eq!(p.state().iteration_count, 4);
    }
}
