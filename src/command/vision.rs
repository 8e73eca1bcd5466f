//! Screenshots, OCR and text polling: `screenshot`, `ocr`/`i2s*`,
//! `waituntil` and `testtext`.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::token::quote;
use super::{
    Args, ExecContext, ExecError, ExecResult, Outcome, ScriptResult, duration_from_seconds, fmt_seconds,
};
use crate::coords::{CoordMode, Region, resolve_region};
use crate::ocr::OcrLanguage;
use crate::retry::{PollOutcome, poll_until};
use crate::state::{MatchMode, TestResult, Verdict};

/// A rectangle relative to the target window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectSpec {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl RectSpec {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn parse(args: &mut Args<'_>) -> ScriptResult<Self> {
        let x = args.value("x")?;
        let y = args.value("y")?;
        let width = args.value("width")?;
        let height = args.value("height")?;
        Ok(Self::new(x, y, width, height))
    }

    fn push_args(&self, out: &mut Vec<String>) {
        out.extend([
            self.x.to_string(),
            self.y.to_string(),
            self.width.to_string(),
            self.height.to_string(),
        ]);
    }

    /// Absolute screen region for this rectangle in `ctx`'s window
    fn resolve(&self, ctx: &ExecContext<'_>, mode: CoordMode) -> ExecResult<Region> {
        let window = ctx.require_window()?;
        resolve_region(
            self.x,
            self.y,
            self.width,
            self.height,
            &window,
            mode,
            ctx.settings.reference,
        )
        .ok_or_else(|| ExecError::OutOfRange(format!("region {} in window {}", self, window)))
    }
}

impl fmt::Display for RectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

fn coord_mode(word: &str) -> Option<CoordMode> {
    word.parse().ok()
}

fn match_mode(word: &str) -> Option<MatchMode> {
    word.parse().ok()
}

fn ocr_language(args: &mut Args<'_>) -> ScriptResult<OcrLanguage> {
    let word = args.required("OCR variant")?;
    OcrLanguage::parse(&word.text).ok_or_else(|| args.invalid("OCR variant", word.text.clone()))
}

/// Capture `region`, recognize it and compare with `expected`
fn capture_and_compare(
    ctx: &mut ExecContext<'_>,
    region: Region,
    label: &str,
    language: OcrLanguage,
    expected: &str,
    mode: MatchMode,
) -> ExecResult<(PathBuf, String, bool)> {
    let path = ctx.capture(Some(region), label)?;
    let text = ctx.recognize(&path, language, Some((expected, mode)))?;
    let matched = mode.matches(expected, &text);
    Ok((path, text, matched))
}

// =============================================================================
// screenshot
// =============================================================================

/// Screenshot target: a window region, or the full screen when absent.
/// Regions default to offset coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenshotParams {
    pub region: Option<(RectSpec, CoordMode)>,
}

impl ScreenshotParams {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        if args.is_empty() {
            return Ok(Self::default());
        }
        let rect = RectSpec::parse(&mut args)?;
        let mode = args.keyword(coord_mode).unwrap_or(CoordMode::Offset);
        args.finish()?;
        Ok(Self {
            region: Some((rect, mode)),
        })
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some((rect, mode)) = &self.region {
            rect.push_args(&mut out);
            out.push(mode.as_str().to_string());
        }
        out
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        let region = match &self.region {
            None => None,
            Some((rect, mode)) => match rect.resolve(ctx, *mode) {
                Ok(region) => Some(region),
                Err(ExecError::NoWindow) => {
                    warn!("no target window, capturing the full screen instead");
                    None
                }
                Err(e) => return Err(e),
            },
        };

        let path = ctx.capture(region, "screenshot")?;
        info!(path = %path.display(), region = ?region, "screenshot saved");
        Ok(Outcome::Completed)
    }
}

// =============================================================================
// ocr / i2s / i2skr / i2sauto
// =============================================================================

/// Recognize the latest screenshot and store the text
pub fn run_ocr(language: OcrLanguage, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
    let image = ctx.state.last_screenshot.clone().ok_or(ExecError::NoScreenshot)?;
    let text = ctx.recognize(&image, language, None)?;
    info!(%language, chars = text.chars().count(), "text extracted");
    debug!(%text, "ocr result");
    ctx.state.extracted_text = Some(text);
    Ok(Outcome::Completed)
}

// =============================================================================
// waituntil
// =============================================================================

pub const DEFAULT_WAIT_TRIES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitUntilParams {
    pub rect: RectSpec,
    pub language: OcrLanguage,
    pub target: String,
    pub match_mode: MatchMode,
    pub max_tries: u32,
    pub mode: CoordMode,
}

impl WaitUntilParams {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        let rect = RectSpec::parse(&mut args)?;
        let language = ocr_language(&mut args)?;
        let target = args.required("target text")?.text.clone();
        let match_mode = args.keyword(match_mode).unwrap_or_default();
        let max_tries = match args.peek() {
            Some(t) if coord_mode(&t.text).is_none() => args.value("max tries")?,
            _ => DEFAULT_WAIT_TRIES,
        };
        if max_tries == 0 {
            return Err(args.invalid("max tries", "0"));
        }
        let mode = args.keyword(coord_mode).unwrap_or_default();
        args.finish()?;

        Ok(Self {
            rect,
            language,
            target,
            match_mode,
            max_tries,
            mode,
        })
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.rect.push_args(&mut out);
        out.extend([
            self.language.token().to_string(),
            quote(&self.target),
            self.match_mode.as_str().to_string(),
            self.max_tries.to_string(),
            self.mode.as_str().to_string(),
        ]);
        out
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        let region = self.rect.resolve(ctx, self.mode)?;
        let stop = ctx.stop;
        let interval = ctx.settings.retry_interval;
        let slice = ctx.settings.poll_interval;

        let mut last_text = None;
        let outcome = poll_until(self.max_tries, interval, slice, stop, |attempt| {
            match capture_and_compare(ctx, region, "waituntil", self.language, &self.target, self.match_mode) {
                Ok((_, text, matched)) => {
                    debug!(attempt, %text, matched, "waituntil attempt");
                    last_text = Some(text);
                    matched
                }
                Err(e) => {
                    warn!(attempt, error = %e, "waituntil attempt failed");
                    false
                }
            }
        });

        if let Some(text) = last_text {
            ctx.state.extracted_text = Some(text);
        }
        ctx.state.expected_text = Some(self.target.clone());

        Ok(match outcome {
            PollOutcome::Matched { attempt } => {
                info!(target = %self.target, attempt, "text appeared");
                Outcome::Completed
            }
            PollOutcome::Exhausted { attempts } => {
                warn!(target = %self.target, attempts, "text did not appear");
                Outcome::TimedOut { attempts }
            }
            PollOutcome::Interrupted { .. } => Outcome::Interrupted,
        })
    }
}

// =============================================================================
// testtext
// =============================================================================

/// Retry policy for `testtext`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Repeat {
    pub max_tries: u32,
    /// Seconds between tries
    pub interval: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestTextParams {
    pub title: String,
    pub rect: RectSpec,
    pub language: OcrLanguage,
    pub expected: String,
    pub match_mode: MatchMode,
    pub mode: CoordMode,
    /// Without a repeat policy the check runs exactly once
    pub repeat: Option<Repeat>,
}

impl TestTextParams {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        let title = args.required("title")?.text.clone();
        let rect = RectSpec::parse(&mut args)?;
        let language = ocr_language(&mut args)?;
        let expected = args.required("expected text")?.text.clone();
        let match_mode = args.keyword(match_mode).unwrap_or_default();
        let mode = args.keyword(coord_mode).unwrap_or_default();

        let repeat = if args.eat("repeat") {
            let max_tries: u32 = args.value("max tries")?;
            if max_tries == 0 {
                return Err(args.invalid("max tries", "0"));
            }
            let interval = args.seconds("wait interval")?;
            Some(Repeat { max_tries, interval })
        } else {
            None
        };
        args.finish()?;

        Ok(Self {
            title,
            rect,
            language,
            expected,
            match_mode,
            mode,
            repeat,
        })
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut out = vec![quote(&self.title)];
        self.rect.push_args(&mut out);
        out.extend([
            self.language.token().to_string(),
            quote(&self.expected),
            self.match_mode.as_str().to_string(),
            self.mode.as_str().to_string(),
        ]);
        if let Some(repeat) = &self.repeat {
            out.extend([
                "repeat".to_string(),
                repeat.max_tries.to_string(),
                fmt_seconds(repeat.interval),
            ]);
        }
        out
    }

    /// Always records exactly one result, whatever happens
    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        let plan = self.rect.resolve(ctx, self.mode).and_then(|region| {
            let (max_tries, interval) = match self.repeat {
                Some(r) => (r.max_tries, duration_from_seconds(r.interval)?),
                None => (1, ctx.settings.retry_interval),
            };
            Ok((region, max_tries, interval))
        });
        let (region, max_tries, interval) = match plan {
            Ok(plan) => plan,
            Err(e) => {
                self.record(ctx, String::new(), None, 0, false);
                return Err(e);
            }
        };
        let stop = ctx.stop;
        let slice = ctx.settings.poll_interval;
        let label = format!("test_{}", self.title);

        let mut last: Option<(PathBuf, String)> = None;
        let outcome = poll_until(max_tries, interval, slice, stop, |attempt| {
            match capture_and_compare(ctx, region, &label, self.language, &self.expected, self.match_mode) {
                Ok((path, text, matched)) => {
                    debug!(title = %self.title, attempt, %text, matched, "testtext attempt");
                    last = Some((path, text));
                    matched
                }
                Err(e) => {
                    warn!(title = %self.title, attempt, error = %e, "testtext attempt failed");
                    false
                }
            }
        });

        let (path, text) = match last {
            Some((path, text)) => (Some(path), text),
            None => (None, String::new()),
        };
        let passed = outcome.is_match();
        self.record(ctx, text, path, outcome.attempts(), passed);

        Ok(match outcome {
            PollOutcome::Interrupted { .. } => Outcome::Interrupted,
            _ => Outcome::Completed,
        })
    }

    fn record(
        &self,
        ctx: &mut ExecContext<'_>,
        extracted: String,
        screenshot: Option<PathBuf>,
        attempts: u32,
        passed: bool,
    ) {
        let result = TestResult {
            title: self.title.clone(),
            expected_text: self.expected.clone(),
            extracted_text: extracted,
            result: Verdict::from_bool(passed),
            screenshot_path: screenshot,
            match_mode: self.match_mode,
            attempt_count: attempts,
            iteration: ctx.state.iteration_count,
        };
        info!(
            title = %result.title,
            result = %result.result,
            attempts,
            expected = %result.expected_text,
            extracted = %result.extracted_text,
            "test recorded"
        );
        ctx.state.record_result(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tokenize;
    use pretty_assertions::assert_eq;

    fn screenshot(line: &str) -> ScriptResult<ScreenshotParams> {
        let tokens = tokenize(line).unwrap();
        ScreenshotParams::parse(Args::new("screenshot", &tokens))
    }

    fn wait_until(line: &str) -> ScriptResult<WaitUntilParams> {
        let tokens = tokenize(line).unwrap();
        WaitUntilParams::parse(Args::new("waituntil", &tokens))
    }

    fn test_text(line: &str) -> ScriptResult<TestTextParams> {
        let tokens = tokenize(line).unwrap();
        TestTextParams::parse(Args::new("testtext", &tokens))
    }

    #[test]
    fn screenshot_full_screen_or_offset_region() {
        assert_eq!(screenshot(""), Ok(ScreenshotParams { region: None }));
        assert_eq!(
            screenshot("0 0 200 100"),
            Ok(ScreenshotParams {
                region: Some((RectSpec::new(0, 0, 200, 100), CoordMode::Offset))
            })
        );
        assert!(screenshot("0 0 200").is_err());
        assert!(screenshot("0 0 -200 100").is_err());
    }

    #[test]
    fn wait_until_defaults() {
        let p = wait_until(r#"10 20 300 40 i2s "Welcome""#).unwrap();
        assert_eq!(p.language, OcrLanguage::English);
        assert_eq!(p.target, "Welcome");
        assert_eq!(p.match_mode, MatchMode::Contains);
        assert_eq!(p.max_tries, DEFAULT_WAIT_TRIES);
        assert_eq!(p.mode, CoordMode::Scaled);
    }

    #[test]
    fn wait_until_all_options() {
        let p = wait_until(r#"10 20 300 40 i2skr "확인" exact 3 offset"#).unwrap();
        assert_eq!(p.language, OcrLanguage::Korean);
        assert_eq!(p.match_mode, MatchMode::Exact);
        assert_eq!(p.max_tries, 3);
        assert_eq!(p.mode, CoordMode::Offset);
    }

    #[test]
    fn wait_until_rejects_zero_tries_and_bad_variant() {
        assert!(wait_until(r#"1 2 3 4 i2s "x" exact 0"#).is_err());
        assert!(wait_until(r#"1 2 3 4 tesseract "x""#).is_err());
    }

    #[test]
    fn quoted_keyword_is_text_not_option() {
        let p = wait_until(r#"1 2 3 4 i2s "exact""#).unwrap();
        assert_eq!(p.target, "exact");
        assert_eq!(p.match_mode, MatchMode::Contains);
    }

    #[test]
    fn test_text_with_repeat() {
        let p = test_text(r#""Login ok" 0 0 100 20 i2s "Welcome" exact offset repeat 5 0.5"#).unwrap();
        assert_eq!(p.title, "Login ok");
        assert_eq!(
            p.repeat,
            Some(Repeat {
                max_tries: 5,
                interval: 0.5
            })
        );
        assert_eq!(
            p.to_args(),
            vec!["\"Login ok\"", "0", "0", "100", "20", "i2s", "\"Welcome\"", "exact", "offset", "repeat", "5", "0.5"]
        );
    }

    #[test]
    fn test_text_without_repeat() {
        let p = test_text(r#""t" 0 0 1 1 ocr "x""#).unwrap();
        assert_eq!(p.repeat, None);
        assert!(test_text(r#""t" 0 0 1 1 ocr "x" repeat 2"#).is_err());
    }
}
