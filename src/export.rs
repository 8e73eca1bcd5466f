//! Test result export: CSV, JSON and a plaintext summary.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::state::{SharedState, TestResult, Verdict};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown export format '{0}' (use csv, json or txt)")]
    UnknownFormat(String),

    #[error("failed to encode results: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode results: {0}")]
    Csv(#[from] csv::Error),

    #[error("results are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("failed to write results: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Txt,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Txt),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Column order of CSV exports
pub const CSV_COLUMNS: [&str; 8] = [
    "number",
    "title",
    "result",
    "expected",
    "extracted",
    "match_mode",
    "screenshot",
    "attempts",
];

/// A CSV line, fields in [`CSV_COLUMNS`] order
#[derive(Serialize)]
struct CsvRow<'a> {
    number: usize,
    title: &'a str,
    result: &'static str,
    expected: &'a str,
    extracted: &'a str,
    match_mode: &'static str,
    screenshot: Option<String>,
    attempts: u32,
}

/// One row per result, numbered from 1, under a header line
pub fn to_csv(results: &[TestResult]) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS)?;
    for (i, r) in results.iter().enumerate() {
        writer.serialize(CsvRow {
            number: i + 1,
            title: &r.title,
            result: r.result.as_str(),
            expected: &r.expected_text,
            extracted: &r.extracted_text,
            match_mode: r.match_mode.as_str(),
            screenshot: r.screenshot_path.as_ref().map(|p| p.display().to_string()),
            attempts: r.attempt_count,
        })?;
    }
    let bytes = writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

#[derive(Serialize)]
struct JsonExport<'a> {
    session_title: &'a str,
    session_start: String,
    total: usize,
    passed: usize,
    failed: usize,
    results: &'a [TestResult],
}

pub fn to_json(state: &SharedState) -> Result<String, ExportError> {
    let export = JsonExport {
        session_title: &state.session_title,
        session_start: state.session_start.to_rfc3339(),
        total: state.test_results.len(),
        passed: state.passed(),
        failed: state.failed(),
        results: &state.test_results,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

/// Human-readable summary of the recorded results
pub fn summary_text(state: &SharedState) -> String {
    let total = state.test_results.len();
    let mut out = String::new();
    let _ = writeln!(out, "{}", state.session_title);
    let _ = writeln!(out, "Started: {}", state.session_start.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(
        out,
        "Results: {} total, {} passed, {} failed",
        total,
        state.passed(),
        state.failed()
    );

    for (i, r) in state.test_results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. [{}] {} (iteration {}, {} attempt{})",
            i + 1,
            r.result,
            r.title,
            r.iteration,
            r.attempt_count,
            if r.attempt_count == 1 { "" } else { "s" }
        );
        if r.result == Verdict::Fail {
            let _ = writeln!(
                out,
                "     expected ({}): {:?}\n     extracted: {:?}",
                r.match_mode, r.expected_text, r.extracted_text
            );
        }
    }
    out
}

/// Write `state`'s results to `path` in `format`, creating parent directories
pub fn write_results(format: ExportFormat, state: &SharedState, path: &Path) -> Result<PathBuf, ExportError> {
    let body = match format {
        ExportFormat::Csv => to_csv(&state.test_results)?,
        ExportFormat::Json => to_json(state)?,
        ExportFormat::Txt => summary_text(state),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MatchMode;
    use pretty_assertions::assert_eq;

    fn sample_state() -> SharedState {
        let mut state = SharedState::new("Nightly login");
        state.record_result(TestResult {
            title: "login".into(),
            expected_text: "Welcome".into(),
            extracted_text: "Welcome, admin".into(),
            result: Verdict::Pass,
            screenshot_path: Some(PathBuf::from("/tmp/s/001_test_login.png")),
            match_mode: MatchMode::Contains,
            attempt_count: 1,
            iteration: 1,
        });
        state.record_result(TestResult {
            title: "banner".into(),
            expected_text: "Say \"hi\"".into(),
            extracted_text: "".into(),
            result: Verdict::Fail,
            screenshot_path: None,
            match_mode: MatchMode::Exact,
            attempt_count: 3,
            iteration: 2,
        });
        state
    }

    #[test]
    fn csv_has_fixed_columns_and_escapes() {
        let csv = to_csv(&sample_state().test_results).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "number,title,result,expected,extracted,match_mode,screenshot,attempts");
        assert_eq!(
            lines[1],
            "1,login,PASS,Welcome,\"Welcome, admin\",contains,/tmp/s/001_test_login.png,1"
        );
        assert_eq!(lines[2], "2,banner,FAIL,\"Say \"\"hi\"\"\",,exact,,3");
    }

    #[test]
    fn csv_keeps_header_without_results() {
        assert_eq!(
            to_csv(&[]).unwrap().trim_end(),
            "number,title,result,expected,extracted,match_mode,screenshot,attempts"
        );
    }

    #[test]
    fn csv_quotes_line_breaks_in_text() {
        let mut state = sample_state();
        state.test_results[0].extracted_text = "line one\nline two".into();
        let csv = to_csv(&state.test_results).unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][4], "line one\nline two");
        assert_eq!(&rows[1][3], "Say \"hi\"");
    }

    #[test]
    fn json_contains_counts() {
        let json: serde_json::Value = serde_json::from_str(&to_json(&sample_state()).unwrap()).unwrap();
        assert_eq!(json["total"], 2);
        assert_eq!(json["passed"], 1);
        assert_eq!(json["results"][1]["result"], "Fail");
    }

    #[test]
    fn summary_lists_failures() {
        let text = summary_text(&sample_state());
        assert!(text.contains("2 total, 1 passed, 1 failed"));
        assert!(text.contains("[FAIL] banner"));
        assert!(text.contains("3 attempts"));
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/results.csv");
        write_results(ExportFormat::Csv, &sample_state(), &path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("number,"));
    }

    #[test]
    fn format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }
}
