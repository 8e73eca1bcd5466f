//! `click`, `drag` and `mousewheel`.

use std::time::Duration;

use tracing::{debug, info};

use super::token::MAX_SECONDS;
use super::{Args, ExecContext, ExecResult, Outcome, ScriptResult, duration_from_seconds, fmt_seconds};
use crate::backend::MouseButton;
use crate::coords::CoordMode;

fn coord_mode(word: &str) -> Option<CoordMode> {
    word.parse().ok()
}

// =============================================================================
// click
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ClickParams {
    pub x: i32,
    pub y: i32,
    /// Seconds to hold the button; zero taps
    pub hold: f64,
    pub mode: CoordMode,
}

impl ClickParams {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        let x = args.value("x")?;
        let y = args.value("y")?;
        let hold = match args.peek() {
            Some(t) if coord_mode(&t.text).is_none() => args.seconds("hold")?,
            _ => 0.0,
        };
        let mode = args.keyword(coord_mode).unwrap_or_default();
        args.finish()?;
        Ok(Self { x, y, hold, mode })
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut out = vec![self.x.to_string(), self.y.to_string()];
        if self.hold != 0.0 {
            out.push(fmt_seconds(self.hold));
        }
        out.push(self.mode.as_str().to_string());
        out
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        let (x, y) = ctx.locate(self.x, self.y, self.mode)?;
        let hold = duration_from_seconds(self.hold)?;
        let act = ctx.actuator();

        act.mouse_move(x, y)?;
        act.button_down(MouseButton::Left)?;

        let interrupted = if !hold.is_zero() {
            ctx.wait(hold)
        } else {
            ctx.wait(ctx.settings.tap_delay);
            false
        };
        act.button_up(MouseButton::Left)?;

        debug!(x, y, hold = self.hold, mode = %self.mode, "clicked");
        if interrupted {
            info!(x, y, "click hold interrupted, button released");
            Ok(Outcome::Interrupted)
        } else {
            Ok(Outcome::Completed)
        }
    }
}

// =============================================================================
// drag
// =============================================================================

/// Drag between two points, always in scaled coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragParams {
    pub from: (i32, i32),
    pub to: (i32, i32),
}

impl DragParams {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        let from = (args.value("x1")?, args.value("y1")?);
        let to = (args.value("x2")?, args.value("y2")?);
        args.finish()?;
        Ok(Self { from, to })
    }

    pub fn to_args(&self) -> Vec<String> {
        vec![
            self.from.0.to_string(),
            self.from.1.to_string(),
            self.to.0.to_string(),
            self.to.1.to_string(),
        ]
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        let settle = ctx.settings.drag_settle;
        let (x1, y1) = ctx.locate(self.from.0, self.from.1, CoordMode::Scaled)?;
        let (x2, y2) = ctx.locate(self.to.0, self.to.1, CoordMode::Scaled)?;
        let act = ctx.actuator();

        act.mouse_move(x1, y1)?;
        if ctx.wait(settle) {
            return Ok(Outcome::Interrupted);
        }
        act.button_down(MouseButton::Left)?;

        // From here on the button must come back up whatever happens
        let mut interrupted = ctx.wait(settle);
        let moved = if interrupted { Ok(()) } else { act.mouse_move(x2, y2) };
        if moved.is_ok() && !interrupted {
            interrupted = ctx.wait(settle);
        }
        act.button_up(MouseButton::Left)?;
        moved?;

        debug!(from = ?(x1, y1), to = ?(x2, y2), "dragged");
        Ok(if interrupted {
            Outcome::Interrupted
        } else {
            Outcome::Completed
        })
    }
}

// =============================================================================
// mousewheel
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    Up,
    Down,
}

impl WheelDirection {
    fn parse(word: &str) -> Option<Self> {
        match word.to_lowercase().as_str() {
            "up" => Some(WheelDirection::Up),
            "down" => Some(WheelDirection::Down),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            WheelDirection::Up => "up",
            WheelDirection::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WheelPosition {
    /// Scroll wherever the pointer is
    #[default]
    Current,
    /// Move to a window position first
    At { x: i32, y: i32, mode: CoordMode },
}

pub const DEFAULT_WHEEL_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MouseWheelParams {
    pub direction: WheelDirection,
    /// Number of wheel notches
    pub strength: u32,
    pub position: WheelPosition,
    /// Pause after scrolling
    pub delay_ms: u64,
}

impl MouseWheelParams {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        let word = args.required("direction")?;
        let direction =
            WheelDirection::parse(&word.text).ok_or_else(|| args.invalid("direction", word.text.clone()))?;
        let strength = args.value("strength")?;

        let position = if args.eat("at") {
            let x = args.value("x")?;
            let y = args.value("y")?;
            let mode = args.keyword(coord_mode).unwrap_or_default();
            WheelPosition::At { x, y, mode }
        } else {
            args.eat("current");
            WheelPosition::Current
        };

        let delay_ms: u64 = match args.peek() {
            Some(_) => args.value("delay_ms")?,
            None => DEFAULT_WHEEL_DELAY_MS,
        };
        if delay_ms as f64 > MAX_SECONDS * 1000.0 {
            return Err(args.invalid("delay_ms", delay_ms.to_string()));
        }
        args.finish()?;

        Ok(Self {
            direction,
            strength,
            position,
            delay_ms,
        })
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut out = vec![self.direction.as_str().to_string(), self.strength.to_string()];
        match self.position {
            WheelPosition::Current => out.push("current".into()),
            WheelPosition::At { x, y, mode } => {
                out.extend(["at".into(), x.to_string(), y.to_string(), mode.as_str().into()]);
            }
        }
        out.push(self.delay_ms.to_string());
        out
    }

    /// Signed scroll amount, positive scrolling down
    pub fn amount(&self) -> i32 {
        let strength = self.strength.min(i32::MAX as u32) as i32;
        match self.direction {
            WheelDirection::Up => -strength,
            WheelDirection::Down => strength,
        }
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        let target = match self.position {
            WheelPosition::Current => None,
            WheelPosition::At { x, y, mode } => Some(ctx.locate(x, y, mode)?),
        };

        let act = ctx.actuator();
        if let Some((x, y)) = target {
            act.mouse_move(x, y)?;
        }
        act.scroll(self.amount())?;
        debug!(amount = self.amount(), ?target, "scrolled");

        if ctx.wait(Duration::from_millis(self.delay_ms)) {
            return Ok(Outcome::Interrupted);
        }
        Ok(Outcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tokenize;
    use pretty_assertions::assert_eq;

    fn click(line: &str) -> ScriptResult<ClickParams> {
        let tokens = tokenize(line).unwrap();
        ClickParams::parse(Args::new("click", &tokens))
    }

    fn wheel(line: &str) -> ScriptResult<MouseWheelParams> {
        let tokens = tokenize(line).unwrap();
        MouseWheelParams::parse(Args::new("mousewheel", &tokens))
    }

    #[test]
    fn click_defaults_to_scaled_tap() {
        assert_eq!(
            click("100 50"),
            Ok(ClickParams {
                x: 100,
                y: 50,
                hold: 0.0,
                mode: CoordMode::Scaled
            })
        );
    }

    #[test]
    fn click_with_hold_and_mode() {
        let p = click("100 50 2 Offset").unwrap();
        assert_eq!(p.hold, 2.0);
        assert_eq!(p.mode, CoordMode::Offset);
        assert_eq!(p.to_args(), vec!["100", "50", "2", "offset"]);
    }

    #[test]
    fn click_rejects_garbage() {
        assert!(click("100").is_err());
        assert!(click("100 fifty").is_err());
        assert!(click("100 50 offset extra").is_err());
        assert!(click("100 50 soon").is_err());
    }

    #[test]
    fn drag_needs_four_numbers() {
        let tokens = tokenize("10 20 30 40").unwrap();
        assert_eq!(
            DragParams::parse(Args::new("drag", &tokens)),
            Ok(DragParams {
                from: (10, 20),
                to: (30, 40)
            })
        );
        let tokens = tokenize("10 20 30").unwrap();
        assert!(DragParams::parse(Args::new("drag", &tokens)).is_err());
    }

    #[test]
    fn wheel_defaults() {
        assert_eq!(
            wheel("down 3"),
            Ok(MouseWheelParams {
                direction: WheelDirection::Down,
                strength: 3,
                position: WheelPosition::Current,
                delay_ms: DEFAULT_WHEEL_DELAY_MS,
            })
        );
    }

    #[test]
    fn wheel_at_position() {
        let p = wheel("up 2 at 40 60 offset 250").unwrap();
        assert_eq!(
            p.position,
            WheelPosition::At {
                x: 40,
                y: 60,
                mode: CoordMode::Offset
            }
        );
        assert_eq!(p.delay_ms, 250);
        assert_eq!(p.amount(), -2);
    }

    #[test]
    fn wheel_rejects_sideways() {
        assert!(wheel("left 2").is_err());
        assert!(wheel("up").is_err());
    }

    #[test]
    fn wheel_delay_is_capped() {
        assert!(wheel("down 1 current 86400000").is_ok());
        assert!(wheel("down 1 current 86400001").is_err());
        assert!(wheel("down 1 current 18446744073709551615").is_err());
    }

    #[test]
    fn click_hold_is_capped() {
        assert!(click("1 1 86400").is_ok());
        assert!(click("1 1 1e20 offset").is_err());
    }
}
