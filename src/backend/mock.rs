//! In-process backends for dry runs and tests.
//!
//! - [`FramebufferCapturer`] renders labelled [`Placeholder`] PNGs instead of grabbing the screen
//! - [`RecordingInput`] logs every input event with a timestamp
//! - [`StaticWindows`] serves a mutable, shareable window list
//! - [`RecordingLauncher`] remembers what it was asked to launch

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageBuffer, RgbImage};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use super::{
    AppLauncher, BackendError, BackendResult, CaptureInfo, InputSynthesizer, Key, MouseButton,
    ScreenCapturer, WindowInfo, WindowTracker,
};
use crate::coords::{Region, Resolution};

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Framebuffer capture
// =============================================================================

/// Longest side a placeholder capture may have
pub const MAX_PLACEHOLDER_SIDE: u32 = 16_384;

/// Solid RGB canvas with a text label, written in place of a real capture
#[derive(Debug, Clone)]
pub struct Placeholder {
    width: u32,
    height: u32,
    /// Row-major RGB, 3 bytes per pixel
    pixels: Vec<u8>,
}

impl Placeholder {
    /// Canvas of `width` x `height` filled with `color`
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> BackendResult<Self> {
        let too_large = || BackendError::Capture(format!("placeholder {}x{} is too large", width, height));
        if width > MAX_PLACEHOLDER_SIDE || height > MAX_PLACEHOLDER_SIDE {
            return Err(too_large());
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(too_large)?;
        Ok(Self {
            width,
            height,
            pixels: color.iter().copied().cycle().take(len).collect(),
        })
    }

    /// Stamp `text` in 8x8 glyphs starting at `(x, y)`, clipped at the edges
    pub fn label(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        for (i, ch) in text.chars().enumerate() {
            let left = x.saturating_add(8 * i as u32);
            if left >= self.width {
                break;
            }
            let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
            for (dy, row) in (0u32..).zip(glyph) {
                for bit in 0..8 {
                    // LSB is the leftmost pixel
                    let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                    self.put(left + bit, y.saturating_add(dy), color);
                }
            }
        }
    }

    fn put(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels[idx..idx + 3].copy_from_slice(&color);
    }

    pub fn to_png(&self) -> BackendResult<Vec<u8>> {
        let img: RgbImage = ImageBuffer::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| BackendError::Capture("placeholder size mismatch".into()))?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Capturer that renders a placeholder image describing the requested region
#[derive(Debug, Clone)]
pub struct FramebufferCapturer {
    screen: Resolution,
    captures: Arc<Mutex<Vec<Option<Region>>>>,
}

impl FramebufferCapturer {
    pub fn new(screen: Resolution) -> Self {
        Self {
            screen,
            captures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Regions requested so far (`None` = full screen), shared with clones
    pub fn captures(&self) -> Vec<Option<Region>> {
        lock(&self.captures).clone()
    }
}

impl ScreenCapturer for FramebufferCapturer {
    fn capture(&mut self, region: Option<Region>, dest: &Path) -> BackendResult<CaptureInfo> {
        let (width, height, label) = match region {
            Some(r) => (r.width.max(1), r.height.max(1), format!("region {}", r)),
            None => (
                self.screen.width,
                self.screen.height,
                format!("screen {}", self.screen),
            ),
        };

        let mut canvas = Placeholder::with_color(width, height, [40, 40, 48])?;
        canvas.label(2, 2, &label, [230, 230, 230], [40, 40, 48]);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, canvas.to_png()?)?;
        lock(&self.captures).push(region);

        Ok(CaptureInfo {
            path: dest.to_path_buf(),
            width,
            height,
        })
    }

    fn source_type(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Input recording
// =============================================================================

/// One injected input event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    MouseMove(i32, i32),
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
    Scroll(i32),
    Clipboard(String),
}

/// An input event with the moment it was injected
#[derive(Debug, Clone)]
pub struct RecordedInput {
    pub event: InputEvent,
    pub at: Instant,
}

/// Shared view onto a [`RecordingInput`]'s event log
#[derive(Debug, Clone, Default)]
pub struct InputLog(Arc<Mutex<Vec<RecordedInput>>>);

impl InputLog {
    pub fn events(&self) -> Vec<InputEvent> {
        lock(&self.0).iter().map(|r| r.event.clone()).collect()
    }

    pub fn timed_events(&self) -> Vec<RecordedInput> {
        lock(&self.0).clone()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }

    fn push(&self, event: InputEvent) {
        tracing::trace!(?event, "input");
        lock(&self.0).push(RecordedInput {
            event,
            at: Instant::now(),
        });
    }
}

/// Input synthesizer that records instead of injecting
#[derive(Debug, Clone, Default)]
pub struct RecordingInput {
    log: InputLog,
    stuck: Option<Key>,
}

impl RecordingInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an error whenever `key` is released; the release is still logged
    pub fn failing_release(mut self, key: Key) -> Self {
        self.stuck = Some(key);
        self
    }

    pub fn log(&self) -> InputLog {
        self.log.clone()
    }
}

impl InputSynthesizer for RecordingInput {
    fn key_down(&mut self, key: Key) -> BackendResult<()> {
        self.log.push(InputEvent::KeyDown(key));
        Ok(())
    }

    fn key_up(&mut self, key: Key) -> BackendResult<()> {
        self.log.push(InputEvent::KeyUp(key));
        if self.stuck == Some(key) {
            return Err(BackendError::Input(format!("{} did not release", key)));
        }
        Ok(())
    }

    fn mouse_move(&mut self, x: i32, y: i32) -> BackendResult<()> {
        self.log.push(InputEvent::MouseMove(x, y));
        Ok(())
    }

    fn button_down(&mut self, button: MouseButton) -> BackendResult<()> {
        self.log.push(InputEvent::ButtonDown(button));
        Ok(())
    }

    fn button_up(&mut self, button: MouseButton) -> BackendResult<()> {
        self.log.push(InputEvent::ButtonUp(button));
        Ok(())
    }

    fn scroll(&mut self, amount: i32) -> BackendResult<()> {
        self.log.push(InputEvent::Scroll(amount));
        Ok(())
    }

    fn set_clipboard(&mut self, text: &str) -> BackendResult<()> {
        self.log.push(InputEvent::Clipboard(text.to_string()));
        Ok(())
    }
}

// =============================================================================
// Windows and launching
// =============================================================================

/// Window tracker over an in-memory list that can be edited while a run is in flight
#[derive(Debug, Clone, Default)]
pub struct StaticWindows {
    windows: Arc<Mutex<Vec<WindowInfo>>>,
    activated: Arc<Mutex<Vec<String>>>,
    queries: Arc<Mutex<usize>>,
}

impl StaticWindows {
    pub fn new(windows: Vec<WindowInfo>) -> Self {
        Self {
            windows: Arc::new(Mutex::new(windows)),
            ..Default::default()
        }
    }

    /// Replace the bounds of every window with exactly this title
    pub fn move_window(&self, title: &str, left: i32, top: i32, width: u32, height: u32) {
        for w in lock(&self.windows).iter_mut().filter(|w| w.title == title) {
            w.left = left;
            w.top = top;
            w.width = width;
            w.height = height;
        }
    }

    pub fn add(&self, window: WindowInfo) {
        lock(&self.windows).push(window);
    }

    /// Titles passed to `activate`, in order
    pub fn activated(&self) -> Vec<String> {
        lock(&self.activated).clone()
    }

    /// Number of `find_windows` calls so far
    pub fn query_count(&self) -> usize {
        *lock(&self.queries)
    }
}

impl WindowTracker for StaticWindows {
    fn find_windows(&self, title_substring: &str) -> BackendResult<Vec<WindowInfo>> {
        *lock(&self.queries) += 1;
        let needle = title_substring.to_lowercase();
        Ok(lock(&self.windows)
            .iter()
            .filter(|w| w.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    fn activate(&self, window: &WindowInfo) -> BackendResult<()> {
        lock(&self.activated).push(window.title.clone());
        Ok(())
    }
}

/// Launcher that only records requests; optionally opens a window on launch
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    launched: Arc<Mutex<Vec<PathBuf>>>,
    opens: Option<(StaticWindows, WindowInfo)>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every launch add `window` to `windows`
    pub fn opening(mut self, windows: StaticWindows, window: WindowInfo) -> Self {
        self.opens = Some((windows, window));
        self
    }

    pub fn launched(&self) -> Vec<PathBuf> {
        lock(&self.launched).clone()
    }
}

impl AppLauncher for RecordingLauncher {
    fn launch(&mut self, path: &Path) -> BackendResult<Option<u32>> {
        lock(&self.launched).push(path.to_path_buf());
        if let Some((windows, window)) = &self.opens {
            windows.add(window.clone());
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_label_paints_glyphs() {
        let mut canvas = Placeholder::with_color(80, 16, [0, 0, 0]).unwrap();
        canvas.label(0, 0, "Hi", [255, 255, 255], [0, 0, 0]);
        let img = image::load_from_memory(&canvas.to_png().unwrap()).unwrap().to_rgb8();
        let has_white = (0..8).any(|y| (0..8).any(|x| img.get_pixel(x, y).0 == [255, 255, 255]));
        assert!(has_white, "Character 'H' should have some foreground pixels");
    }

    #[test]
    fn test_oversized_placeholder_is_a_capture_error() {
        let err = Placeholder::with_color(100_000, 100_000, [0, 0, 0]).unwrap_err();
        assert!(matches!(err, BackendError::Capture(_)));
        assert!(Placeholder::with_color(u32::MAX, u32::MAX, [0, 0, 0]).is_err());

        let dir = tempfile::tempdir().unwrap();
        let mut capturer = FramebufferCapturer::new(Resolution::new(640, 480));
        let result = capturer.capture(Some(Region::new(0, 0, 100_000, 100_000)), &dir.path().join("big.png"));
        assert!(matches!(result, Err(BackendError::Capture(_))));
        assert!(capturer.captures().is_empty());
    }

    #[test]
    fn test_framebuffer_capture_writes_region_sized_png() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("shot.png");
        let mut capturer = FramebufferCapturer::new(Resolution::new(640, 480));

        let info = capturer
            .capture(Some(Region::new(500, 300, 200, 100)), &dest)
            .unwrap();
        assert_eq!((info.width, info.height), (200, 100));

        let data = fs::read(&dest).unwrap();
        assert_eq!(&data[0..4], &[0x89, 0x50, 0x4E, 0x47]);
        let img = image::load_from_memory(&data).unwrap();
        assert_eq!((img.width(), img.height()), (200, 100));
        assert_eq!(capturer.captures(), vec![Some(Region::new(500, 300, 200, 100))]);
    }

    #[test]
    fn test_static_windows_filters_case_insensitively() {
        let windows = StaticWindows::new(vec![
            WindowInfo::new("Notepad - todo.txt", 0, 0, 800, 600),
            WindowInfo::new("Calculator", 10, 10, 300, 400),
        ]);
        let found = windows.find_windows("notepad").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(windows.find_windows("").unwrap().len(), 2);
        assert_eq!(windows.query_count(), 2);
    }
}
