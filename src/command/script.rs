//! Scripts: ordered command lines loaded from text.

use std::fs;
use std::path::{Path, PathBuf};

use super::{Command, ScriptError, ScriptResult};

/// One non-blank script line
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    /// 1-based line number in the source text
    pub number: usize,
    /// Line as written, without the trailing newline
    pub text: String,
}

/// An ordered list of command lines.
///
/// Lines are kept as text: the processor parses each one at dispatch time so a
/// malformed line only skips itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub lines: Vec<ScriptLine>,
    /// File the script was read from
    pub source: Option<PathBuf>,
}

impl Script {
    /// Build a script from text, dropping blank and comment-only lines
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let trimmed = line.trim();
                !trimmed.is_empty() && !trimmed.starts_with('#')
            })
            .map(|(i, line)| ScriptLine {
                number: i + 1,
                text: line.trim_end().to_string(),
            })
            .collect();
        Self {
            lines,
            source: None,
        }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text = lines
            .into_iter()
            .map(|l| l.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Self::parse(&text)
    }

    pub fn load(path: impl AsRef<Path>) -> ScriptResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ScriptError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut script = Self::parse(&text);
        script.source = Some(path.to_path_buf());
        Ok(script)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Parse every line, collecting each failure with its line number
    pub fn check(&self) -> Vec<(usize, ScriptResult<Command>)> {
        self.lines
            .iter()
            .map(|line| {
                let parsed = Command::parse_line(&line.text).map_err(|e| e.at_line(line.number));
                (line.number, parsed)
            })
            .collect()
    }

    /// Parse every line, failing on the first error
    pub fn commands(&self) -> ScriptResult<Vec<Command>> {
        self.check().into_iter().map(|(_, parsed)| parsed).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_and_comment_lines_keeping_numbers() {
        let script = Script::parse("# header\n\nclick 1 2 offset\n   \nwait 1   # pause\n");
        assert_eq!(script.len(), 2);
        assert_eq!(script.lines[0].number, 3);
        assert_eq!(script.lines[1].number, 5);
        assert_eq!(script.lines[1].text, "wait 1   # pause");
    }

    #[test]
    fn check_reports_line_numbers() {
        let script = Script::parse("wait 1\nfly 2\n");
        let results = script.check();
        assert!(results[0].1.is_ok());
        let err = results[1].1.as_ref().unwrap_err();
        assert!(err.to_string().starts_with("line 2:"), "{}", err);
    }

    #[test]
    fn load_records_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("login.txt");
        fs::write(&path, "press enter\n").unwrap();

        let script = Script::load(&path).unwrap();
        assert_eq!(script.source.as_deref(), Some(path.as_path()));
        assert_eq!(script.commands().unwrap().len(), 1);
    }

    #[test]
    fn load_missing_file() {
        assert!(matches!(
            Script::load("/definitely/missing.txt"),
            Err(ScriptError::Read { .. })
        ));
    }
}
