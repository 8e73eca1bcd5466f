//! Mutable state shared by all commands of one run.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How recognized text is compared with the expected text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Equality after trimming surrounding whitespace on both sides
    Exact,
    /// Case-sensitive substring search, untrimmed
    #[default]
    Contains,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Exact => "exact",
            MatchMode::Contains => "contains",
        }
    }

    /// Compare `actual` (recognized) against `expected`
    pub fn matches(&self, expected: &str, actual: &str) -> bool {
        match self {
            MatchMode::Exact => expected.trim() == actual.trim(),
            MatchMode::Contains => actual.contains(expected),
        }
    }
}

impl FromStr for MatchMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(MatchMode::Exact),
            "contains" => Ok(MatchMode::Contains),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pass/fail verdict of a text assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn from_bool(passed: bool) -> Self {
        if passed { Verdict::Pass } else { Verdict::Fail }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One text assertion outcome, immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub title: String,
    pub expected_text: String,
    pub extracted_text: String,
    pub result: Verdict,
    pub screenshot_path: Option<PathBuf>,
    pub match_mode: MatchMode,
    pub attempt_count: u32,
    /// Iteration the assertion ran in (1-based)
    pub iteration: u32,
}

/// Target window metadata for the current run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowMeta {
    /// Title (or title fragment) of the selected target window
    pub target: Option<String>,
    /// Script file the commands were loaded from
    pub source_file: Option<PathBuf>,
}

/// An application started by `runapp` during the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchedApp {
    pub path: PathBuf,
    pub pid: Option<u32>,
    pub window_title: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub launched_at: DateTime<chrono::Utc>,
}

/// State threaded through every command of a run.
///
/// Written only by the worker executing commands; observers should treat any
/// copy they receive as a best-effort snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedState {
    pub last_screenshot: Option<PathBuf>,
    pub extracted_text: Option<String>,
    pub expected_text: Option<String>,
    pub last_result: Option<Verdict>,
    /// Current pass over the script, 1-based; set by the orchestrator
    pub iteration_count: u32,
    pub test_results: Vec<TestResult>,
    pub session_start: DateTime<Local>,
    pub session_title: String,
    pub window: WindowMeta,
    pub launched_apps: Vec<LaunchedApp>,
    /// Last summary produced by `showresults`
    pub last_summary: Option<String>,
    /// Last file written by `exportresult`
    pub last_export: Option<PathBuf>,
}

impl SharedState {
    pub fn new(session_title: impl Into<String>) -> Self {
        Self {
            last_screenshot: None,
            extracted_text: None,
            expected_text: None,
            last_result: None,
            iteration_count: 1,
            test_results: Vec::new(),
            session_start: Local::now(),
            session_title: session_title.into(),
            window: WindowMeta::default(),
            launched_apps: Vec::new(),
            last_summary: None,
            last_export: None,
        }
    }

    /// Select the window that subsequent commands target
    pub fn select_target(&mut self, title: impl Into<String>) {
        self.window.target = Some(title.into());
    }

    pub fn record_result(&mut self, result: TestResult) {
        self.last_result = Some(result.result);
        self.expected_text = Some(result.expected_text.clone());
        self.extracted_text = Some(result.extracted_text.clone());
        self.test_results.push(result);
    }

    pub fn passed(&self) -> usize {
        self.test_results
            .iter()
            .filter(|r| r.result == Verdict::Pass)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.test_results.len() - self.passed()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new("session")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_trims_both_sides() {
        assert!(MatchMode::Exact.matches("LOGIN", " LOGIN "));
        assert!(MatchMode::Exact.matches(" LOGIN\n", "LOGIN"));
        assert!(!MatchMode::Exact.matches("LOGIN", "LOGIN NOW"));
    }

    #[test]
    fn contains_is_case_sensitive_and_untrimmed() {
        assert!(MatchMode::Contains.matches("LOGIN", "PLEASE LOGIN NOW"));
        assert!(!MatchMode::Contains.matches("login", "LOGIN"));
        assert!(!MatchMode::Contains.matches(" LOGIN ", "LOGIN"));
    }

    #[test]
    fn record_result_updates_last_fields() {
        let mut state = SharedState::new("t");
        state.record_result(TestResult {
            title: "login".into(),
            expected_text: "OK".into(),
            extracted_text: "NOPE".into(),
            result: Verdict::Fail,
            screenshot_path: None,
            match_mode: MatchMode::Exact,
            attempt_count: 2,
            iteration: 1,
        });
        assert_eq!(state.last_result, Some(Verdict::Fail));
        assert_eq!(state.extracted_text.as_deref(), Some("NOPE"));
        assert_eq!(state.failed(), 1);
        assert_eq!(state.passed(), 0);
    }
}
