//! Backend abstraction for OS interaction.
//!
//! The command core never touches the OS directly. It talks to four seams:
//! - [`InputSynthesizer`] for key/mouse injection and the clipboard
//! - [`ScreenCapturer`] for region or full-screen captures
//! - [`WindowTracker`] for window enumeration and activation
//! - [`AppLauncher`] for starting applications
//!
//! Mock implementations live in [`mock`]; real ones in `desktop` behind the
//! `desktop` cargo feature.

pub mod keys;
pub mod launcher;
pub mod mock;

#[cfg(feature = "desktop")]
pub mod desktop;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::coords::{Region, WindowBox};
use crate::ocr::TextRecognizer;
use crate::retry::StopFlag;

pub use keys::{Key, MouseButton, NamedKey};
pub use launcher::SystemLauncher;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by OS-facing backends
#[derive(Debug, Error)]
pub enum BackendError {
    /// Input injection failed
    #[error("input error: {0}")]
    Input(String),

    /// Screen capture failed
    #[error("capture error: {0}")]
    Capture(String),

    /// Window enumeration or activation failed
    #[error("window error: {0}")]
    Window(String),

    /// Application launch failed
    #[error("launch error: {0}")]
    Launch(String),

    /// Clipboard access failed
    #[error("clipboard error: {0}")]
    Clipboard(String),

    /// A stop request was observed before the action started
    #[error("stopped before {0}")]
    Stopped(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for BackendError {
    fn from(err: image::ImageError) -> Self {
        BackendError::Capture(err.to_string())
    }
}

/// OS-level key and mouse injection
pub trait InputSynthesizer: Send {
    fn key_down(&mut self, key: Key) -> BackendResult<()>;

    fn key_up(&mut self, key: Key) -> BackendResult<()>;

    /// Move the pointer to an absolute screen position
    fn mouse_move(&mut self, x: i32, y: i32) -> BackendResult<()>;

    fn button_down(&mut self, button: MouseButton) -> BackendResult<()>;

    fn button_up(&mut self, button: MouseButton) -> BackendResult<()>;

    /// Scroll vertically; positive values scroll down
    fn scroll(&mut self, amount: i32) -> BackendResult<()>;

    /// Replace the clipboard contents with `text`
    fn set_clipboard(&mut self, text: &str) -> BackendResult<()>;
}

/// Input synthesizer shared between the processor and background helpers
pub type SharedInput = Arc<Mutex<dyn InputSynthesizer>>;

/// Wrap a synthesizer for sharing
pub fn shared_input<I: InputSynthesizer + 'static>(input: I) -> SharedInput {
    Arc::new(Mutex::new(input))
}

/// Result of a capture operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureInfo {
    /// Where the PNG was written
    pub path: PathBuf,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Trait for capture backends
pub trait ScreenCapturer: Send {
    /// Capture `region` (or the full primary screen when `None`) into `dest` as PNG
    fn capture(&mut self, region: Option<Region>, dest: &Path) -> BackendResult<CaptureInfo>;

    /// Get the source type identifier (e.g., "xcap", "mock")
    fn source_type(&self) -> &str;
}

/// A top-level window as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowInfo {
    pub fn new(title: impl Into<String>, left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            left,
            top,
            width,
            height,
        }
    }

    pub fn bounds(&self) -> WindowBox {
        WindowBox::new(self.left, self.top, self.width, self.height)
    }
}

/// Window enumeration and activation
pub trait WindowTracker: Send {
    /// Windows whose title contains `title_substring` (case-insensitive).
    /// An empty filter returns every titled window.
    fn find_windows(&self, title_substring: &str) -> BackendResult<Vec<WindowInfo>>;

    /// Bring `window` to the foreground
    fn activate(&self, window: &WindowInfo) -> BackendResult<()>;
}

/// Application launching
pub trait AppLauncher: Send {
    /// Launch the file at `path`, returning the process id when known
    fn launch(&mut self, path: &Path) -> BackendResult<Option<u32>>;
}

/// Every collaborator the processor needs, bundled
pub struct Backends {
    pub input: SharedInput,
    pub capture: Box<dyn ScreenCapturer>,
    pub windows: Box<dyn WindowTracker>,
    pub launcher: Box<dyn AppLauncher>,
    pub recognizer: Box<dyn TextRecognizer>,
}

/// Stop-aware front for the input synthesizer.
///
/// Every action that starts an OS side effect checks the stop flag first and
/// refuses once it is set. Releases are always delivered.
pub struct Actuator<'a> {
    input: &'a SharedInput,
    stop: &'a StopFlag,
}

impl<'a> Actuator<'a> {
    pub fn new(input: &'a SharedInput, stop: &'a StopFlag) -> Self {
        Self { input, stop }
    }

    fn with_input<T>(
        &self,
        f: impl FnOnce(&mut dyn InputSynthesizer) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let mut guard = self
            .input
            .lock()
            .map_err(|_| BackendError::Input("input synthesizer lock poisoned".into()))?;
        f(&mut *guard)
    }

    fn guard(&self, action: &'static str) -> BackendResult<()> {
        if self.stop.is_set() {
            Err(BackendError::Stopped(action))
        } else {
            Ok(())
        }
    }

    pub fn key_down(&self, key: Key) -> BackendResult<()> {
        self.guard("key press")?;
        self.with_input(|i| i.key_down(key))
    }

    pub fn key_up(&self, key: Key) -> BackendResult<()> {
        self.with_input(|i| i.key_up(key))
    }

    /// Press and release without delay
    pub fn key_tap(&self, key: Key) -> BackendResult<()> {
        self.key_down(key)?;
        self.key_up(key)
    }

    pub fn mouse_move(&self, x: i32, y: i32) -> BackendResult<()> {
        self.guard("pointer move")?;
        self.with_input(|i| i.mouse_move(x, y))
    }

    pub fn button_down(&self, button: MouseButton) -> BackendResult<()> {
        self.guard("mouse press")?;
        self.with_input(|i| i.button_down(button))
    }

    pub fn button_up(&self, button: MouseButton) -> BackendResult<()> {
        self.with_input(|i| i.button_up(button))
    }

    pub fn scroll(&self, amount: i32) -> BackendResult<()> {
        self.guard("scroll")?;
        self.with_input(|i| i.scroll(amount))
    }

    pub fn set_clipboard(&self, text: &str) -> BackendResult<()> {
        self.guard("clipboard write")?;
        self.with_input(|i| i.set_clipboard(text))
    }

    /// Copy `text` to the clipboard and paste it with ctrl+v
    pub fn paste(&self, text: &str) -> BackendResult<()> {
        self.set_clipboard(text)?;
        let ctrl = Key::Named(NamedKey::Ctrl);
        self.key_down(ctrl)?;
        let pasted = self.key_tap(Key::Char('v'));
        let released = self.key_up(ctrl);
        pasted.and(released)
    }
}
