//! Window-relative coordinate resolution.
//!
//! Script coordinates are authored relative to the target window's top-left
//! corner. Two modes turn them into absolute screen positions:
//! - `offset`: plain translation by the window origin
//! - `scaled`: translation plus scaling by `window size / reference resolution`,
//!   so a script authored against one window size keeps working after resizing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A screen or reference resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// 2560x1440, the default authoring reference
    pub const QHD: Resolution = Resolution {
        width: 2560,
        height: 1440,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::QHD
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Bounding box of the target window: `(left, top, width, height)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBox {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowBox {
    pub const fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Center point in absolute screen coordinates
    pub fn center(&self) -> (i32, i32) {
        (
            self.left.saturating_add((self.width / 2) as i32),
            self.top.saturating_add((self.height / 2) as i32),
        )
    }
}

impl fmt::Display for WindowBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}x{})",
            self.left, self.top, self.width, self.height
        )
    }
}

/// A rectangular capture region in absolute screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// How script coordinates map onto the target window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordMode {
    /// Proportional to window size relative to the reference resolution
    #[default]
    Scaled,
    /// Simple translation by the window origin
    Offset,
}

impl CoordMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordMode::Scaled => "scaled",
            CoordMode::Offset => "offset",
        }
    }
}

impl FromStr for CoordMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scaled" | "scale" => Ok(CoordMode::Scaled),
            "offset" => Ok(CoordMode::Offset),
            _ => Err(()),
        }
    }
}

impl fmt::Display for CoordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a window-relative point to absolute screen coordinates.
///
/// Returns `None` when the result does not fit the `i32` screen space.
pub fn resolve(
    x: i32,
    y: i32,
    window: &WindowBox,
    mode: CoordMode,
    reference: Resolution,
) -> Option<(i32, i32)> {
    let (dx, dy) = match mode {
        CoordMode::Offset => (i64::from(x), i64::from(y)),
        CoordMode::Scaled => {
            let (wr, hr) = ratios(window, reference);
            (scale(i64::from(x), wr), scale(i64::from(y), hr))
        }
    };
    let abs_x = i32::try_from(i64::from(window.left) + dx).ok()?;
    let abs_y = i32::try_from(i64::from(window.top) + dy).ok()?;
    Some((abs_x, abs_y))
}

/// Resolve a window-relative rectangle. In scaled mode the size is scaled by
/// the same ratios as the origin.
pub fn resolve_region(
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    window: &WindowBox,
    mode: CoordMode,
    reference: Resolution,
) -> Option<Region> {
    let (abs_x, abs_y) = resolve(x, y, window, mode, reference)?;
    match mode {
        CoordMode::Offset => Some(Region::new(abs_x, abs_y, width, height)),
        CoordMode::Scaled => {
            let (wr, hr) = ratios(window, reference);
            let w = u32::try_from(scale(i64::from(width), wr).max(1)).ok()?;
            let h = u32::try_from(scale(i64::from(height), hr).max(1)).ok()?;
            Some(Region::new(abs_x, abs_y, w, h))
        }
    }
}

fn ratios(window: &WindowBox, reference: Resolution) -> (f64, f64) {
    let ref_w = reference.width.max(1) as f64;
    let ref_h = reference.height.max(1) as f64;
    (window.width as f64 / ref_w, window.height as f64 / ref_h)
}

fn scale(value: i64, ratio: f64) -> i64 {
    (value as f64 * ratio).round() as i64
}
