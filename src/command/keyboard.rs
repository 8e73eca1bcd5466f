//! `press` and `write`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDate};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::token::{parse_seconds, quote, quote_if_needed};
use super::{
    Args, ExecContext, ExecError, ExecResult, Outcome, ScriptResult, duration_from_seconds, fmt_seconds,
};
use crate::backend::Key;

// =============================================================================
// press
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PressParams {
    pub key: Key,
    /// Second key of a chord: `key` is held while this one is tapped
    pub chord: Option<Key>,
    /// Seconds to hold the key(s) down; zero taps
    pub hold: f64,
}

impl PressParams {
    pub fn tap(key: Key) -> Self {
        Self {
            key,
            chord: None,
            hold: 0.0,
        }
    }

    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        let first = args.required("key")?;
        let key = Key::parse(&first.text).ok_or_else(|| args.invalid("key", first.text.clone()))?;

        let mut params = Self::tap(key);
        match (args.next(), args.next()) {
            (None, _) => {}
            (Some(second), None) => {
                // A lone number after the key is a hold time, not a digit key
                if let Some(hold) = parse_seconds(&second.text).filter(|_| !second.quoted) {
                    params.hold = hold;
                } else {
                    params.chord = Some(
                        Key::parse(&second.text)
                            .ok_or_else(|| args.invalid("key", second.text.clone()))?,
                    );
                }
            }
            (Some(second), Some(hold)) => {
                params.chord = Some(
                    Key::parse(&second.text)
                        .ok_or_else(|| args.invalid("key", second.text.clone()))?,
                );
                params.hold =
                    parse_seconds(&hold.text).ok_or_else(|| args.invalid("hold", hold.text.clone()))?;
            }
        }
        args.finish()?;
        Ok(params)
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut out = vec![quote_if_needed(&self.key.name())];
        if let Some(chord) = self.chord {
            out.push(quote_if_needed(&chord.name()));
        }
        let chord_is_numeric = self.chord.is_some_and(|k| k.looks_numeric());
        if self.hold != 0.0 || chord_is_numeric {
            out.push(fmt_seconds(self.hold));
        }
        out
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        let act = ctx.actuator();

        if self.hold <= 0.0 {
            match self.chord {
                None => act.key_tap(self.key)?,
                Some(chord) => {
                    act.key_down(self.key)?;
                    let tapped = act.key_tap(chord);
                    act.key_up(self.key)?;
                    tapped?;
                }
            }
            debug!(key = %self.key, chord = ?self.chord, "pressed");
            return Ok(Outcome::Completed);
        }

        let hold = duration_from_seconds(self.hold)?;
        act.key_down(self.key)?;
        if let Some(chord) = self.chord {
            if let Err(e) = act.key_down(chord) {
                act.key_up(self.key)?;
                return Err(e.into());
            }
        }

        let interrupted = ctx.wait(hold);

        // Both keys go up even if the first release fails
        let chord_released = match self.chord {
            Some(chord) => act.key_up(chord),
            None => Ok(()),
        };
        let key_released = act.key_up(self.key);
        chord_released.and(key_released)?;

        if interrupted {
            info!(key = %self.key, "hold interrupted, keys released");
            Ok(Outcome::Interrupted)
        } else {
            Ok(Outcome::Completed)
        }
    }
}

// =============================================================================
// write
// =============================================================================

/// How a text file feeds `write`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// All non-blank lines at once
    #[default]
    All,
    /// One line per iteration
    Iter,
}

impl FileMode {
    fn parse(word: &str) -> Option<Self> {
        match word.to_lowercase().as_str() {
            "all" => Some(FileMode::All),
            "iter" | "line" => Some(FileMode::Iter),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            FileMode::All => "all",
            FileMode::Iter => "iter",
        }
    }
}

/// Random text flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomKind {
    /// Alphanumerics from an OS-seeded generator
    Pure,
    /// Today's `YYYYMMDD` followed by alphanumerics seeded from the date
    Date,
}

impl RandomKind {
    fn parse(word: &str) -> Option<Self> {
        match word.to_lowercase().as_str() {
            "pure" => Some(RandomKind::Pure),
            "date" => Some(RandomKind::Date),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RandomKind::Pure => "pure",
            RandomKind::Date => "date",
        }
    }
}

pub const DEFAULT_RANDOM_LENGTH: usize = 10;
pub const MAX_RANDOM_LENGTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteParams {
    Text(String),
    File {
        path: PathBuf,
        prefix: String,
        suffix: String,
        mode: FileMode,
    },
    Random {
        kind: RandomKind,
        length: usize,
    },
}

impl WriteParams {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        if args.eat("--file") {
            let path = PathBuf::from(&args.required("file path")?.text);
            let mut prefix = String::new();
            let mut suffix = String::new();
            let mut mode = FileMode::All;
            while let Some(flag) = args.next() {
                if flag.is_word("--prefix") {
                    prefix = args.required("prefix")?.text.clone();
                } else if flag.is_word("--suffix") {
                    suffix = args.required("suffix")?.text.clone();
                } else if flag.is_word("--mode") {
                    let word = args.required("mode")?;
                    mode = FileMode::parse(&word.text)
                        .ok_or_else(|| args.invalid("mode", word.text.clone()))?;
                } else {
                    return Err(args.invalid("flag", flag.text.clone()));
                }
            }
            return Ok(WriteParams::File {
                path,
                prefix,
                suffix,
                mode,
            });
        }

        if args.eat("--random") {
            let word = args.required("random kind")?;
            let kind =
                RandomKind::parse(&word.text).ok_or_else(|| args.invalid("random kind", word.text.clone()))?;
            let mut length = DEFAULT_RANDOM_LENGTH;
            if args.eat("--length") {
                let value = args.required("length")?;
                length = value
                    .text
                    .parse()
                    .ok()
                    .filter(|n| (1..=MAX_RANDOM_LENGTH).contains(n))
                    .ok_or_else(|| args.invalid("length", value.text.clone()))?;
            }
            args.finish()?;
            return Ok(WriteParams::Random { kind, length });
        }

        let words = args.rest();
        if words.is_empty() {
            return Err(args.missing("text"));
        }
        let text = words
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(WriteParams::Text(text))
    }

    pub fn to_args(&self) -> Vec<String> {
        match self {
            WriteParams::Text(text) => vec![quote(text)],
            WriteParams::File {
                path,
                prefix,
                suffix,
                mode,
            } => {
                let mut out = vec!["--file".to_string(), quote(&path.to_string_lossy())];
                if !prefix.is_empty() {
                    out.extend(["--prefix".to_string(), quote(prefix)]);
                }
                if !suffix.is_empty() {
                    out.extend(["--suffix".to_string(), quote(suffix)]);
                }
                out.extend(["--mode".to_string(), mode.as_str().to_string()]);
                out
            }
            WriteParams::Random { kind, length } => vec![
                "--random".to_string(),
                kind.as_str().to_string(),
                "--length".to_string(),
                length.to_string(),
            ],
        }
    }

    /// Final text to paste for the given 1-based iteration
    pub fn resolve_text(&self, iteration: u32) -> ExecResult<String> {
        match self {
            WriteParams::Text(text) => Ok(text.clone()),
            WriteParams::File {
                path,
                prefix,
                suffix,
                mode,
            } => {
                let body = file_text(path, *mode, iteration)?;
                Ok(format!("{}{}{}", prefix, body, suffix))
            }
            WriteParams::Random { kind, length } => Ok(match kind {
                RandomKind::Pure => random_alphanumeric(&mut rand::thread_rng(), *length),
                RandomKind::Date => date_seeded_text(Local::now().date_naive(), *length),
            }),
        }
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        let text = self.resolve_text(ctx.state.iteration_count)?;
        ctx.actuator().paste(&text)?;
        debug!(chars = text.chars().count(), "pasted text");
        Ok(Outcome::Completed)
    }
}

/// Non-blank lines of `path` for the given mode.
///
/// In `Iter` mode the 1-based `iteration` selects a line; past the end the
/// last line is reused.
pub fn file_text(path: &Path, mode: FileMode, iteration: u32) -> ExecResult<String> {
    let content = fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return Err(ExecError::NotFound(format!(
            "{} has no non-blank lines",
            path.display()
        )));
    }

    Ok(match mode {
        FileMode::All => lines.join("\n"),
        FileMode::Iter => {
            let index = (iteration.max(1) as usize - 1).min(lines.len() - 1);
            lines[index].to_string()
        }
    })
}

fn random_alphanumeric<R: Rng>(rng: &mut R, length: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// `YYYYMMDD` plus alphanumerics from a generator seeded by that date,
/// truncated to `length`
pub fn date_seeded_text(date: NaiveDate, length: usize) -> String {
    let stamp = date.format("%Y%m%d").to_string();
    let seed = date.year() as u64 * 10_000 + date.month() as u64 * 100 + date.day() as u64;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut text: String = stamp.chars().take(length).collect();
    let fill = length.saturating_sub(text.len());
    text.push_str(&random_alphanumeric(&mut rng, fill));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NamedKey;
    use crate::command::tokenize;
    use pretty_assertions::assert_eq;

    fn press(line: &str) -> ScriptResult<PressParams> {
        let tokens = tokenize(line).unwrap();
        PressParams::parse(Args::new("press", &tokens))
    }

    fn write(line: &str) -> ScriptResult<WriteParams> {
        let tokens = tokenize(line).unwrap();
        WriteParams::parse(Args::new("write", &tokens))
    }

    #[test]
    fn press_single_key_and_hold() {
        assert_eq!(press("enter"), Ok(PressParams::tap(Key::Named(NamedKey::Enter))));
        let held = press("shift 1.5").unwrap();
        assert_eq!(held.chord, None);
        assert_eq!(held.hold, 1.5);
    }

    #[test]
    fn press_chord_with_hold() {
        let p = press("ctrl c 0.2").unwrap();
        assert_eq!(p.key, Key::Named(NamedKey::Ctrl));
        assert_eq!(p.chord, Some(Key::Char('c')));
        assert_eq!(p.hold, 0.2);
    }

    #[test]
    fn press_numeric_chord_serializes_explicit_hold() {
        let p = PressParams {
            key: Key::Named(NamedKey::Ctrl),
            chord: Some(Key::Char('1')),
            hold: 0.0,
        };
        assert_eq!(p.to_args(), vec!["ctrl", "1", "0"]);
        let tokens = tokenize(&p.to_args().join(" ")).unwrap();
        assert_eq!(PressParams::parse(Args::new("press", &tokens)), Ok(p));
    }

    #[test]
    fn press_rejects_unknown_key_and_extra_tokens() {
        assert!(press("banana").is_err());
        assert!(press("ctrl c 1 2").is_err());
        assert!(press("").is_err());
    }

    #[test]
    fn write_literal_joins_words() {
        assert_eq!(write("hello   world"), Ok(WriteParams::Text("hello world".into())));
        assert_eq!(write(r#""two  spaces""#), Ok(WriteParams::Text("two  spaces".into())));
    }

    #[test]
    fn write_quoted_flag_is_literal() {
        assert_eq!(write(r#""--file""#), Ok(WriteParams::Text("--file".into())));
    }

    #[test]
    fn write_file_flags() {
        let params = write(r#"--file "ids.txt" --suffix "@x.com" --mode iter"#).unwrap();
        assert_eq!(
            params,
            WriteParams::File {
                path: PathBuf::from("ids.txt"),
                prefix: String::new(),
                suffix: "@x.com".into(),
                mode: FileMode::Iter,
            }
        );
        assert!(write(r#"--file "ids.txt" --mode sometimes"#).is_err());
    }

    #[test]
    fn write_random_length_bounds() {
        assert_eq!(
            write("--random date"),
            Ok(WriteParams::Random {
                kind: RandomKind::Date,
                length: DEFAULT_RANDOM_LENGTH
            })
        );
        assert!(write("--random pure --length 0").is_err());
        assert!(write("--random pure --length 257").is_err());
    }

    #[test]
    fn file_iteration_clamps_to_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.txt");
        fs::write(&path, "first\n\nsecond\nthird\n").unwrap();

        assert_eq!(file_text(&path, FileMode::Iter, 1).unwrap(), "first");
        assert_eq!(file_text(&path, FileMode::Iter, 3).unwrap(), "third");
        assert_eq!(file_text(&path, FileMode::Iter, 5).unwrap(), "third");
        assert_eq!(file_text(&path, FileMode::All, 5).unwrap(), "first\nsecond\nthird");
    }

    #[test]
    fn empty_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.txt");
        fs::write(&path, "\n  \n").unwrap();
        assert!(matches!(file_text(&path, FileMode::All, 1), Err(ExecError::NotFound(_))));
    }

    #[test]
    fn date_seeded_text_is_stable_per_day() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let a = date_seeded_text(day, 16);
        assert_eq!(a, date_seeded_text(day, 16));
        assert!(a.starts_with("20240309"));
        assert_eq!(a.len(), 16);
        assert_eq!(date_seeded_text(day, 4), "2024");

        let next = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_ne!(a[8..], date_seeded_text(next, 16)[8..]);
    }

    #[test]
    fn pure_random_has_requested_length() {
        let text = WriteParams::Random {
            kind: RandomKind::Pure,
            length: 12,
        }
        .resolve_text(1)
        .unwrap();
        assert_eq!(text.len(), 12);
        assert!(text.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
