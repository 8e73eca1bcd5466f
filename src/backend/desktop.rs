//! Real OS backends: `enigo` for input, `arboard` for the clipboard and
//! `xcap` for screen capture and window enumeration.

use std::path::Path;
use std::sync::mpsc;
use std::thread;

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use tracing::{debug, warn};
use xcap::{Monitor, Window};

use super::{
    BackendError, BackendResult, CaptureInfo, InputSynthesizer, Key, MouseButton, NamedKey,
    ScreenCapturer, SharedInput, WindowInfo, WindowTracker,
};
use crate::coords::Region;

// =============================================================================
// Input
// =============================================================================

enum InputOp {
    Key(Key, bool),
    Move(i32, i32),
    Button(MouseButton, bool),
    Scroll(i32),
    Clipboard(String),
}

struct InputRequest {
    op: InputOp,
    reply: mpsc::Sender<BackendResult<()>>,
}

/// Input synthesizer backed by `enigo`.
///
/// The `Enigo` handle and clipboard live on a dedicated thread; calls are
/// forwarded over a channel and block until applied.
pub struct EnigoInput {
    tx: mpsc::Sender<InputRequest>,
}

impl EnigoInput {
    pub fn spawn() -> BackendResult<Self> {
        let (tx, rx) = mpsc::channel::<InputRequest>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        thread::Builder::new()
            .name("input-synthesizer".into())
            .spawn(move || {
                let mut enigo = match Enigo::new(&Settings::default()) {
                    Ok(enigo) => {
                        let _ = ready_tx.send(Ok(()));
                        enigo
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let mut clipboard: Option<arboard::Clipboard> = None;

                for request in rx {
                    let result = apply(&mut enigo, &mut clipboard, request.op);
                    let _ = request.reply.send(result);
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { tx }),
            Ok(Err(e)) => Err(BackendError::Input(format!("failed to initialize enigo: {}", e))),
            Err(_) => Err(BackendError::Input("input thread exited during startup".into())),
        }
    }

    fn send(&self, op: InputOp) -> BackendResult<()> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(InputRequest { op, reply })
            .map_err(|_| BackendError::Input("input thread is gone".into()))?;
        rx.recv()
            .map_err(|_| BackendError::Input("input thread dropped the request".into()))?
    }
}

fn apply(
    enigo: &mut Enigo,
    clipboard: &mut Option<arboard::Clipboard>,
    op: InputOp,
) -> BackendResult<()> {
    let input_err = |e: enigo::InputError| BackendError::Input(e.to_string());
    match op {
        InputOp::Key(key, down) => enigo
            .key(to_enigo_key(key), direction(down))
            .map_err(input_err),
        InputOp::Move(x, y) => enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err),
        InputOp::Button(button, down) => enigo
            .button(to_enigo_button(button), direction(down))
            .map_err(input_err),
        InputOp::Scroll(amount) => enigo.scroll(amount, Axis::Vertical).map_err(input_err),
        InputOp::Clipboard(text) => {
            if clipboard.is_none() {
                *clipboard = Some(
                    arboard::Clipboard::new()
                        .map_err(|e| BackendError::Clipboard(e.to_string()))?,
                );
            }
            match clipboard.as_mut() {
                Some(cb) => cb
                    .set_text(text)
                    .map_err(|e| BackendError::Clipboard(e.to_string())),
                None => Err(BackendError::Clipboard("clipboard unavailable".into())),
            }
        }
    }
}

fn direction(down: bool) -> Direction {
    if down { Direction::Press } else { Direction::Release }
}

fn to_enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

fn to_enigo_key(key: Key) -> enigo::Key {
    use enigo::Key as E;
    match key {
        Key::Char(c) => E::Unicode(c),
        Key::Named(named) => match named {
            NamedKey::Enter => E::Return,
            NamedKey::Tab => E::Tab,
            NamedKey::Space => E::Space,
            NamedKey::Backspace => E::Backspace,
            NamedKey::Escape => E::Escape,
            NamedKey::Delete => E::Delete,
            NamedKey::Home => E::Home,
            NamedKey::End => E::End,
            NamedKey::PageUp => E::PageUp,
            NamedKey::PageDown => E::PageDown,
            NamedKey::Up => E::UpArrow,
            NamedKey::Down => E::DownArrow,
            NamedKey::Left => E::LeftArrow,
            NamedKey::Right => E::RightArrow,
            NamedKey::Ctrl => E::Control,
            NamedKey::Shift => E::Shift,
            NamedKey::Alt => E::Alt,
            NamedKey::Meta => E::Meta,
            NamedKey::CapsLock => E::CapsLock,
            NamedKey::F(n) => match n {
                1 => E::F1,
                2 => E::F2,
                3 => E::F3,
                4 => E::F4,
                5 => E::F5,
                6 => E::F6,
                7 => E::F7,
                8 => E::F8,
                9 => E::F9,
                10 => E::F10,
                11 => E::F11,
                _ => E::F12,
            },
        },
    }
}

impl InputSynthesizer for EnigoInput {
    fn key_down(&mut self, key: Key) -> BackendResult<()> {
        self.send(InputOp::Key(key, true))
    }

    fn key_up(&mut self, key: Key) -> BackendResult<()> {
        self.send(InputOp::Key(key, false))
    }

    fn mouse_move(&mut self, x: i32, y: i32) -> BackendResult<()> {
        self.send(InputOp::Move(x, y))
    }

    fn button_down(&mut self, button: MouseButton) -> BackendResult<()> {
        self.send(InputOp::Button(button, true))
    }

    fn button_up(&mut self, button: MouseButton) -> BackendResult<()> {
        self.send(InputOp::Button(button, false))
    }

    fn scroll(&mut self, amount: i32) -> BackendResult<()> {
        self.send(InputOp::Scroll(amount))
    }

    fn set_clipboard(&mut self, text: &str) -> BackendResult<()> {
        self.send(InputOp::Clipboard(text.to_string()))
    }
}

// =============================================================================
// Screen capture
// =============================================================================

fn xcap_err(e: xcap::XCapError) -> BackendError {
    BackendError::Capture(e.to_string())
}

/// Screen capturer backed by `xcap`
#[derive(Debug, Default)]
pub struct XcapCapturer;

impl XcapCapturer {
    pub fn new() -> Self {
        Self
    }
}

fn monitor_contains(monitor: &Monitor, x: i32, y: i32) -> bool {
    match (monitor.x(), monitor.y(), monitor.width(), monitor.height()) {
        (Ok(mx), Ok(my), Ok(w), Ok(h)) => {
            x >= mx && y >= my && x < mx + w as i32 && y < my + h as i32
        }
        _ => false,
    }
}

impl ScreenCapturer for XcapCapturer {
    fn capture(&mut self, region: Option<Region>, dest: &Path) -> BackendResult<CaptureInfo> {
        let monitors = Monitor::all().map_err(xcap_err)?;
        let primary = monitors
            .iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| monitors.first())
            .ok_or_else(|| BackendError::Capture("no monitors found".into()))?;
        let monitor = region
            .and_then(|r| monitors.iter().find(|m| monitor_contains(m, r.x, r.y)))
            .unwrap_or(primary);

        let image = monitor.capture_image().map_err(xcap_err)?;
        let image = match region {
            Some(r) => {
                let scale = monitor.scale_factor().map_err(xcap_err)? as f64;
                let mx = monitor.x().map_err(xcap_err)?;
                let my = monitor.y().map_err(xcap_err)?;
                let px = (((r.x - mx).max(0)) as f64 * scale).round() as u32;
                let py = (((r.y - my).max(0)) as f64 * scale).round() as u32;
                let px = px.min(image.width().saturating_sub(1));
                let py = py.min(image.height().saturating_sub(1));
                let pw = ((r.width as f64 * scale).round() as u32)
                    .clamp(1, image.width() - px);
                let ph = ((r.height as f64 * scale).round() as u32)
                    .clamp(1, image.height() - py);
                image::imageops::crop_imm(&image, px, py, pw, ph).to_image()
            }
            None => image,
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image.save(dest)?;
        debug!(path = %dest.display(), width = image.width(), height = image.height(), "captured");

        Ok(CaptureInfo {
            path: dest.to_path_buf(),
            width: image.width(),
            height: image.height(),
        })
    }

    fn source_type(&self) -> &str {
        "xcap"
    }
}

// =============================================================================
// Windows
// =============================================================================

/// Window tracker backed by `xcap` enumeration.
///
/// `xcap` cannot raise windows, so activation clicks the window's title bar
/// through the shared input synthesizer.
pub struct XcapWindows {
    input: SharedInput,
}

impl XcapWindows {
    pub fn new(input: SharedInput) -> Self {
        Self { input }
    }
}

impl WindowTracker for XcapWindows {
    fn find_windows(&self, title_substring: &str) -> BackendResult<Vec<WindowInfo>> {
        let needle = title_substring.to_lowercase();
        let windows = Window::all().map_err(|e| BackendError::Window(e.to_string()))?;

        let mut found = Vec::new();
        for window in windows {
            let Ok(title) = window.title() else { continue };
            if title.is_empty() || !title.to_lowercase().contains(&needle) {
                continue;
            }
            if window.is_minimized().unwrap_or(false) {
                continue;
            }
            match (window.x(), window.y(), window.width(), window.height()) {
                (Ok(x), Ok(y), Ok(w), Ok(h)) => found.push(WindowInfo::new(title, x, y, w, h)),
                _ => warn!(%title, "skipping window with unreadable geometry"),
            }
        }
        Ok(found)
    }

    fn activate(&self, window: &WindowInfo) -> BackendResult<()> {
        let x = window.left + (window.width / 2) as i32;
        let y = window.top + 8;
        let mut input = self
            .input
            .lock()
            .map_err(|_| BackendError::Window("input synthesizer lock poisoned".into()))?;
        input.mouse_move(x, y)?;
        input.button_down(MouseButton::Left)?;
        input.button_up(MouseButton::Left)
    }
}
