//! Screen Replay - scripted desktop GUI automation.
//!
//! This crate provides:
//! - A line-oriented script language (press, click, drag, OCR, text polling, ...)
//!   that parses to typed commands and serializes back losslessly
//! - Window-relative coordinate resolution in `scaled` and `offset` modes
//! - A processor that re-resolves the target window before every command and
//!   stops cooperatively, always releasing held keys and buttons
//! - OCR-based assertions with CSV/JSON/text export of the results
//! - Mock backends for dry runs and tests; real OS backends behind `desktop`
//!
//! # Example
//!
//! ```rust,no_run
//! use screen_replay::backend::mock::{FramebufferCapturer, RecordingInput, RecordingLauncher, StaticWindows};
//! use screen_replay::backend::{Backends, WindowInfo, shared_input};
//! use screen_replay::coords::Resolution;
//! use screen_replay::ocr::ScriptedRecognizer;
//! use screen_replay::{Processor, RunPlan, RunSettings, Runner, Script, Session};
//!
//! let backends = Backends {
//!     input: shared_input(RecordingInput::new()),
//!     capture: Box::new(FramebufferCapturer::new(Resolution::QHD)),
//!     windows: Box::new(StaticWindows::new(vec![WindowInfo::new("Editor", 0, 0, 1280, 720)])),
//!     launcher: Box::new(RecordingLauncher::new()),
//!     recognizer: Box::new(ScriptedRecognizer::always("Saved")),
//! };
//! let session = Session::with_name("demo");
//! session.init().unwrap();
//!
//! let script = Script::parse("click 100 50\nscreenshot 0 0 200 40\ni2s\n");
//! let mut processor = Processor::new(backends, session, RunSettings::defaults());
//! let report = Runner::run(&mut processor, &script, &RunPlan::default().target("Editor"), |_| {});
//! println!("{} commands", report.commands_run);
//! ```

pub mod backend;
pub mod command;
pub mod config;
pub mod coords;
pub mod export;
pub mod ocr;
pub mod processor;
pub mod retry;
pub mod runner;
pub mod session;
pub mod state;

// Re-export the script model
pub use command::{Command, ExecError, Outcome, Script, ScriptError, tokenize};

// Re-export orchestration
pub use processor::Processor;
pub use runner::{RunHandle, RunPlan, RunProgress, RunReport, Runner};

// Re-export configuration and shared types
pub use config::{Config, RunSettings};
pub use coords::{CoordMode, Resolution, WindowBox, resolve};
pub use retry::StopFlag;
pub use state::{MatchMode, SharedState, TestResult, Verdict};

// Re-export session management
pub use session::{Session, cleanup_old_sessions, list_sessions};
