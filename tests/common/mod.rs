#![allow(dead_code)]

use std::time::Duration;

use screen_replay::backend::mock::{
    FramebufferCapturer, InputEvent, InputLog, RecordingInput, RecordingLauncher, StaticWindows,
};
use screen_replay::backend::{Backends, WindowInfo, shared_input};
use screen_replay::coords::Resolution;
use screen_replay::ocr::ScriptedRecognizer;
use screen_replay::{Processor, RunSettings, Session};
use tempfile::TempDir;

/// Processor wired to mock backends, with handles onto each of them
pub struct Harness {
    pub processor: Processor,
    pub input: InputLog,
    pub capture: FramebufferCapturer,
    pub windows: StaticWindows,
    pub launcher: RecordingLauncher,
    pub recognizer: ScriptedRecognizer,
    pub dir: TempDir,
}

/// Short timings so polling tests finish quickly
pub fn fast_settings() -> RunSettings {
    RunSettings::defaults()
        .poll_interval(Duration::from_millis(10))
        .retry_interval(Duration::from_millis(10))
        .tap_delay(Duration::from_millis(1))
        .drag_settle(Duration::from_millis(1))
}

impl Harness {
    pub fn new(windows: Vec<WindowInfo>, recognizer: ScriptedRecognizer) -> Self {
        Self::with_settings(windows, recognizer, fast_settings())
    }

    pub fn with_settings(windows: Vec<WindowInfo>, recognizer: ScriptedRecognizer, settings: RunSettings) -> Self {
        let windows = StaticWindows::new(windows);
        Self::build(RecordingInput::new(), windows, RecordingLauncher::new(), recognizer, settings)
    }

    /// No windows, with a custom recording input
    pub fn with_input(input: RecordingInput) -> Self {
        let windows = StaticWindows::new(vec![]);
        Self::build(input, windows, RecordingLauncher::new(), ScriptedRecognizer::always(""), fast_settings())
    }

    /// No windows at first; every launch opens `window`
    pub fn launching(window: WindowInfo) -> Self {
        let windows = StaticWindows::new(vec![]);
        let launcher = RecordingLauncher::new().opening(windows.clone(), window);
        Self::build(RecordingInput::new(), windows, launcher, ScriptedRecognizer::always(""), fast_settings())
    }

    fn build(
        input: RecordingInput,
        windows: StaticWindows,
        launcher: RecordingLauncher,
        recognizer: ScriptedRecognizer,
        settings: RunSettings,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = input.log();
        let capture = FramebufferCapturer::new(Resolution::new(1920, 1080));

        let backends = Backends {
            input: shared_input(input),
            capture: Box::new(capture.clone()),
            windows: Box::new(windows.clone()),
            launcher: Box::new(launcher.clone()),
            recognizer: Box::new(recognizer.clone()),
        };
        let session = Session::in_dir(dir.path().join("session"));
        session.init().unwrap();

        Self {
            processor: Processor::new(backends, session, settings),
            input: log,
            capture,
            windows,
            launcher,
            recognizer,
            dir,
        }
    }

    /// Every input event recorded so far
    pub fn events(&self) -> Vec<InputEvent> {
        self.input.events()
    }
}
