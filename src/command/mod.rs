//! The script language: a closed set of commands.
//!
//! Every command can be parsed from tokens, serialized back to a line that
//! parses to the same value, and executed against an [`ExecContext`].
//!
//! ```text
//! press <key> [<key2>] [hold_seconds]
//! write <text> | write --file "<path>" [--prefix "<p>"] [--suffix "<s>"] [--mode all|iter]
//!       | write --random pure|date [--length N]
//! wait <seconds>
//! screenshot [<x> <y> <w> <h> [scaled|offset]]
//! click <x> <y> [<hold>] [scaled|offset]
//! drag <x1> <y1> <x2> <y2>
//! mousewheel up|down <strength> [current | at <x> <y> [scaled|offset]] [delay_ms]
//! ocr | i2s | i2skr | i2sauto
//! waituntil <x> <y> <w> <h> <ocr> "<text>" [exact|contains] [max_tries] [scaled|offset]
//! testtext "<title>" <x> <y> <w> <h> <ocr> "<expected>" [exact|contains] [scaled|offset]
//!          [repeat <max_tries> <wait_interval>]
//! showresults
//! exportresult [csv|json|txt] ["<path>"]
//! runapp folder "<dir>" "<pattern>" | direct "<path>" | window "<pattern>" [flags]
//! keepalive start [minutes] | stop | status
//! ```

pub mod app;
pub mod keepalive;
pub mod keyboard;
pub mod mouse;
pub mod report;
pub mod script;
pub mod timing;
pub mod token;
pub mod vision;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::backend::{Actuator, BackendError, Backends};
use crate::config::RunSettings;
use crate::coords::{CoordMode, Region, WindowBox, resolve};
use crate::export::ExportError;
use crate::ocr::{OcrError, OcrLanguage, RecognizeRequest};
use crate::retry::{StopFlag, wait_or_stop};
use crate::session::Session;
use crate::state::{MatchMode, SharedState};

pub use app::{LaunchSpec, RunAppParams};
pub use keepalive::{KeepAlive, KeepAliveAction, KeepAliveStatus};
pub use keyboard::{FileMode, PressParams, RandomKind, WriteParams};
pub use mouse::{ClickParams, DragParams, MouseWheelParams, WheelDirection, WheelPosition};
pub use report::ExportParams;
pub use script::{Script, ScriptLine};
pub use timing::WaitParams;
pub use token::{Args, Token, quote, quote_if_needed, tokenize};
pub use vision::{RectSpec, Repeat, ScreenshotParams, TestTextParams, WaitUntilParams};

/// Result type for parsing
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Result type for execution
pub type ExecResult<T> = Result<T, ExecError>;

/// Malformed script input
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScriptError {
    #[error("empty command line")]
    Empty,

    #[error("unterminated quote starting at column {column}")]
    UnterminatedQuote { column: usize },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{command}: missing {what}")]
    Missing {
        command: &'static str,
        what: &'static str,
    },

    #[error("{command}: invalid {what} '{value}'")]
    Invalid {
        command: &'static str,
        what: &'static str,
        value: String,
    },

    #[error("{command}: unexpected argument '{value}'")]
    Unexpected { command: &'static str, value: String },

    #[error("cannot read {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    /// Attach a script line number
    pub fn at_line(self, line: usize) -> Self {
        ScriptError::AtLine {
            line,
            source: Box::new(self),
        }
    }
}

/// Failure while executing a parsed command
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("no target window resolved")]
    NoWindow,

    #[error("no screenshot taken yet")]
    NoScreenshot,

    #[error("{0}")]
    NotFound(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a dispatched line ended. Errors never escape a command; they end up here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    /// The stop flag was observed; held input was released
    Interrupted,
    /// A polling command ran out of tries
    TimedOut { attempts: u32 },
    /// Malformed input or a missing resource; nothing was done
    Skipped { reason: String },
    /// An OS or engine call failed part way
    Failed { reason: String },
}

impl Outcome {
    pub fn skipped(reason: impl fmt::Display) -> Self {
        Outcome::Skipped {
            reason: reason.to_string(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Outcome::Interrupted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Interrupted => "interrupted",
            Outcome::TimedOut { .. } => "timed out",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Failed { .. } => "failed",
        }
    }

    /// Classify an execution error
    pub fn from_error(err: &ExecError) -> Self {
        match err {
            ExecError::Backend(BackendError::Stopped(_)) => Outcome::Interrupted,
            ExecError::NoWindow
            | ExecError::NoScreenshot
            | ExecError::NotFound(_)
            | ExecError::OutOfRange(_) => Outcome::skipped(err),
            ExecError::Ocr(OcrError::MissingImage(_)) => Outcome::skipped(err),
            _ => Outcome::Failed {
                reason: err.to_string(),
            },
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::TimedOut { attempts } => write!(f, "timed out after {} attempts", attempts),
            Outcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            Outcome::Failed { reason } => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Everything a command may touch while it runs
pub struct ExecContext<'a> {
    pub backends: &'a mut Backends,
    pub state: &'a mut SharedState,
    pub session: &'a Session,
    pub settings: &'a RunSettings,
    pub stop: &'a StopFlag,
    pub keepalive: &'a mut KeepAlive,
    /// Live bounds of the target window for this dispatch
    pub window: Option<WindowBox>,
}

impl ExecContext<'_> {
    pub fn actuator(&self) -> Actuator<'_> {
        Actuator::new(&self.backends.input, self.stop)
    }

    pub fn require_window(&self) -> ExecResult<WindowBox> {
        self.window.ok_or(ExecError::NoWindow)
    }

    /// Absolute screen position of a window-relative point
    pub fn locate(&self, x: i32, y: i32, mode: CoordMode) -> ExecResult<(i32, i32)> {
        let window = self.require_window()?;
        resolve(x, y, &window, mode, self.settings.reference).ok_or_else(|| {
            ExecError::OutOfRange(format!("point ({}, {}) in window {}", x, y, window))
        })
    }

    /// Interruptible sleep; true if the stop flag cut it short
    pub fn wait(&self, duration: Duration) -> bool {
        wait_or_stop(duration, self.settings.poll_interval, self.stop)
    }

    /// Capture `region` (or the full screen) into a fresh session file and
    /// remember it as the latest screenshot
    pub fn capture(&mut self, region: Option<Region>, label: &str) -> ExecResult<PathBuf> {
        if self.stop.is_set() {
            return Err(BackendError::Stopped("screenshot").into());
        }
        let path = self.session.next_capture_path(label);
        let info = self.backends.capture.capture(region, &path)?;
        tracing::debug!(path = %info.path.display(), width = info.width, height = info.height, "captured");
        self.state.last_screenshot = Some(info.path.clone());
        Ok(info.path)
    }

    /// Recognize text in `image`
    pub fn recognize(
        &mut self,
        image: &Path,
        language: OcrLanguage,
        expected: Option<(&str, MatchMode)>,
    ) -> ExecResult<String> {
        let mut request = RecognizeRequest::new(image, language);
        if let Some((text, mode)) = expected {
            request = request.expecting(text, mode);
        }
        let recognition = self.backends.recognizer.recognize(&request)?;
        Ok(recognition.text)
    }
}

/// Name, usage and description of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub description: &'static str,
}

/// Every command, in display order
pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "press",
        aliases: &["key"],
        usage: "press <key> [<key2>] [hold_seconds]",
        description: "Tap a key or chord, or hold it for a number of seconds",
    },
    CommandInfo {
        name: "write",
        aliases: &["type"],
        usage: "write <text> | --file \"<path>\" ... | --random pure|date ...",
        description: "Paste literal, file-driven or random text",
    },
    CommandInfo {
        name: "wait",
        aliases: &["sleep"],
        usage: "wait <seconds>",
        description: "Pause, stopping early when the run is stopped",
    },
    CommandInfo {
        name: "screenshot",
        aliases: &[],
        usage: "screenshot [<x> <y> <w> <h> [scaled|offset]]",
        description: "Capture a window region or the full screen",
    },
    CommandInfo {
        name: "click",
        aliases: &[],
        usage: "click <x> <y> [<hold>] [scaled|offset]",
        description: "Click or hold the left button at a window position",
    },
    CommandInfo {
        name: "drag",
        aliases: &[],
        usage: "drag <x1> <y1> <x2> <y2>",
        description: "Drag with the left button between two window positions",
    },
    CommandInfo {
        name: "mousewheel",
        aliases: &["wheel", "scroll"],
        usage: "mousewheel up|down <strength> [current | at <x> <y> [scaled|offset]] [delay_ms]",
        description: "Scroll the mouse wheel",
    },
    CommandInfo {
        name: "ocr",
        aliases: &[],
        usage: "ocr",
        description: "Extract text from the last screenshot",
    },
    CommandInfo {
        name: "i2s",
        aliases: &[],
        usage: "i2s",
        description: "Extract English text from the last screenshot",
    },
    CommandInfo {
        name: "i2skr",
        aliases: &[],
        usage: "i2skr",
        description: "Extract Korean text from the last screenshot",
    },
    CommandInfo {
        name: "i2sauto",
        aliases: &[],
        usage: "i2sauto",
        description: "Extract text from the last screenshot, detecting the language",
    },
    CommandInfo {
        name: "waituntil",
        aliases: &["waituntiltextappears"],
        usage: "waituntil <x> <y> <w> <h> <ocr> \"<text>\" [exact|contains] [max_tries] [scaled|offset]",
        description: "Poll a region until the text appears",
    },
    CommandInfo {
        name: "testtext",
        aliases: &[],
        usage: "testtext \"<title>\" <x> <y> <w> <h> <ocr> \"<expected>\" [exact|contains] [scaled|offset] [repeat <tries> <interval>]",
        description: "Assert that a region shows the expected text and record the result",
    },
    CommandInfo {
        name: "showresults",
        aliases: &[],
        usage: "showresults",
        description: "Log a summary of the recorded test results",
    },
    CommandInfo {
        name: "exportresult",
        aliases: &["exportresults"],
        usage: "exportresult [csv|json|txt] [\"<path>\"]",
        description: "Write the recorded test results to a file",
    },
    CommandInfo {
        name: "runapp",
        aliases: &[],
        usage: "runapp folder \"<dir>\" \"<pattern>\" | direct \"<path>\" | window \"<pattern>\" [--window \"<p>\"] [--no-auto] [--timeout N]",
        description: "Launch an application and select its window",
    },
    CommandInfo {
        name: "keepalive",
        aliases: &[],
        usage: "keepalive start [minutes] | stop | status",
        description: "Keep the screen from locking with periodic harmless input",
    },
];

/// Find a command by name or alias, ignoring case
pub fn lookup(name: &str) -> Option<&'static CommandInfo> {
    let lower = name.to_lowercase();
    COMMANDS
        .iter()
        .find(|info| info.name == lower || info.aliases.contains(&lower.as_str()))
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Press(PressParams),
    Write(WriteParams),
    Wait(WaitParams),
    Screenshot(ScreenshotParams),
    Click(ClickParams),
    Drag(DragParams),
    MouseWheel(MouseWheelParams),
    Ocr(OcrLanguage),
    WaitUntil(WaitUntilParams),
    TestText(TestTextParams),
    ShowResults,
    ExportResult(ExportParams),
    RunApp(RunAppParams),
    KeepAlive(KeepAliveAction),
}

impl Command {
    /// Tokenize and parse one line
    pub fn parse_line(line: &str) -> ScriptResult<Self> {
        let tokens = tokenize(line)?;
        let (name, rest) = tokens.split_first().ok_or(ScriptError::Empty)?;
        Self::parse(&name.text, rest)
    }

    /// Parse argument tokens for the command called `name`
    pub fn parse(name: &str, tokens: &[Token]) -> ScriptResult<Self> {
        let info = lookup(name).ok_or_else(|| ScriptError::UnknownCommand(name.to_string()))?;
        let args = Args::new(info.name, tokens);

        let command = match info.name {
            "press" => Command::Press(PressParams::parse(args)?),
            "write" => Command::Write(WriteParams::parse(args)?),
            "wait" => Command::Wait(WaitParams::parse(args)?),
            "screenshot" => Command::Screenshot(ScreenshotParams::parse(args)?),
            "click" => Command::Click(ClickParams::parse(args)?),
            "drag" => Command::Drag(DragParams::parse(args)?),
            "mousewheel" => Command::MouseWheel(MouseWheelParams::parse(args)?),
            "waituntil" => Command::WaitUntil(WaitUntilParams::parse(args)?),
            "testtext" => Command::TestText(TestTextParams::parse(args)?),
            "showresults" => {
                args.finish()?;
                Command::ShowResults
            }
            "exportresult" => Command::ExportResult(ExportParams::parse(args)?),
            "runapp" => Command::RunApp(RunAppParams::parse(args)?),
            "keepalive" => Command::KeepAlive(KeepAliveAction::parse(args)?),
            other => match OcrLanguage::parse(other) {
                Some(language) => {
                    args.finish()?;
                    Command::Ocr(language)
                }
                None => return Err(ScriptError::UnknownCommand(name.to_string())),
            },
        };
        Ok(command)
    }

    /// Canonical command name
    pub fn name(&self) -> &'static str {
        match self {
            Command::Press(_) => "press",
            Command::Write(_) => "write",
            Command::Wait(_) => "wait",
            Command::Screenshot(_) => "screenshot",
            Command::Click(_) => "click",
            Command::Drag(_) => "drag",
            Command::MouseWheel(_) => "mousewheel",
            Command::Ocr(language) => language.token(),
            Command::WaitUntil(_) => "waituntil",
            Command::TestText(_) => "testtext",
            Command::ShowResults => "showresults",
            Command::ExportResult(_) => "exportresult",
            Command::RunApp(_) => "runapp",
            Command::KeepAlive(_) => "keepalive",
        }
    }

    pub fn description(&self) -> &'static str {
        lookup(self.name()).map(|info| info.description).unwrap_or("")
    }

    /// Render as a line that parses back to `self`
    pub fn serialize(&self) -> String {
        let args = match self {
            Command::Press(p) => p.to_args(),
            Command::Write(p) => p.to_args(),
            Command::Wait(p) => p.to_args(),
            Command::Screenshot(p) => p.to_args(),
            Command::Click(p) => p.to_args(),
            Command::Drag(p) => p.to_args(),
            Command::MouseWheel(p) => p.to_args(),
            Command::WaitUntil(p) => p.to_args(),
            Command::TestText(p) => p.to_args(),
            Command::ExportResult(p) => p.to_args(),
            Command::RunApp(p) => p.to_args(),
            Command::KeepAlive(p) => p.to_args(),
            Command::Ocr(_) | Command::ShowResults => Vec::new(),
        };

        let mut line = self.name().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }

    /// Run the command
    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        match self {
            Command::Press(p) => p.execute(ctx),
            Command::Write(p) => p.execute(ctx),
            Command::Wait(p) => p.execute(ctx),
            Command::Screenshot(p) => p.execute(ctx),
            Command::Click(p) => p.execute(ctx),
            Command::Drag(p) => p.execute(ctx),
            Command::MouseWheel(p) => p.execute(ctx),
            Command::Ocr(language) => vision::run_ocr(*language, ctx),
            Command::WaitUntil(p) => p.execute(ctx),
            Command::TestText(p) => p.execute(ctx),
            Command::ShowResults => report::show_results(ctx),
            Command::ExportResult(p) => p.execute(ctx),
            Command::RunApp(p) => p.execute(ctx),
            Command::KeepAlive(p) => p.execute(ctx),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Seconds from a script as a [`Duration`], at most [`token::MAX_SECONDS`]
pub(crate) fn duration_from_seconds(seconds: f64) -> ExecResult<Duration> {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|_| seconds <= token::MAX_SECONDS)
        .ok_or_else(|| ExecError::OutOfRange(format!("{} seconds", seconds)))
}

/// Format seconds so they parse back to the same `f64`
pub(crate) fn fmt_seconds(seconds: f64) -> String {
    format!("{}", seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_knows_aliases() {
        assert_eq!(lookup("Click").map(|c| c.name), Some("click"));
        assert_eq!(lookup("WAITUNTILTEXTAPPEARS").map(|c| c.name), Some("waituntil"));
        assert_eq!(lookup("I2SKR").map(|c| c.name), Some("i2skr"));
        assert!(lookup("teleport").is_none());
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = COMMANDS
            .iter()
            .flat_map(|c| std::iter::once(c.name).chain(c.aliases.iter().copied()))
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn unknown_and_empty_lines() {
        assert_eq!(
            Command::parse_line("teleport 1 2"),
            Err(ScriptError::UnknownCommand("teleport".into()))
        );
        assert_eq!(Command::parse_line("  # nothing"), Err(ScriptError::Empty));
    }

    #[test]
    fn ocr_variants_are_standalone_commands() {
        assert_eq!(Command::parse_line("OCR"), Ok(Command::Ocr(OcrLanguage::Plain)));
        assert_eq!(Command::parse_line("i2sauto"), Ok(Command::Ocr(OcrLanguage::Auto)));
        assert!(Command::parse_line("i2s extra").is_err());
        assert_eq!(Command::Ocr(OcrLanguage::Korean).serialize(), "i2skr");
    }

    #[test]
    fn seconds_beyond_duration_range_are_errors() {
        assert_eq!(duration_from_seconds(0.5).unwrap(), Duration::from_millis(500));
        assert!(matches!(duration_from_seconds(1e20), Err(ExecError::OutOfRange(_))));
        assert!(matches!(duration_from_seconds(1e19), Err(ExecError::OutOfRange(_))));
        assert!(matches!(duration_from_seconds(f64::NAN), Err(ExecError::OutOfRange(_))));
    }

    #[test]
    fn showresults_takes_no_arguments() {
        assert_eq!(Command::parse_line("ShowResults"), Ok(Command::ShowResults));
        assert!(Command::parse_line("showresults now").is_err());
    }

    #[test]
    fn error_outcomes_are_classified() {
        assert_eq!(
            Outcome::from_error(&ExecError::Backend(BackendError::Stopped("click"))),
            Outcome::Interrupted
        );
        assert!(matches!(Outcome::from_error(&ExecError::NoWindow), Outcome::Skipped { .. }));
        assert!(matches!(
            Outcome::from_error(&ExecError::OutOfRange("x".into())),
            Outcome::Skipped { .. }
        ));
        assert!(matches!(
            Outcome::from_error(&ExecError::Backend(BackendError::Input("boom".into()))),
            Outcome::Failed { .. }
        ));
    }

    #[test]
    fn every_command_has_a_description() {
        for info in COMMANDS {
            assert!(!info.description.is_empty(), "{}", info.name);
            assert!(info.usage.starts_with(info.name), "{}", info.name);
        }
    }
}
