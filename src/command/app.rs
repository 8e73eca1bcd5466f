//! `runapp`: launch an application and select its window.
//!
//! Three launch modes share one window-selection tail:
//! - `folder`: newest file under a directory tree matching a name pattern
//! - `direct`: an explicit file (executable, shortcut or document)
//! - `window`: no launch, only select an already open window

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};

use super::token::quote;
use super::{Args, ExecContext, ExecError, ExecResult, Outcome, ScriptResult};
use crate::backend::{BackendError, WindowInfo};
use crate::retry::{PollOutcome, poll_until};
use crate::state::LaunchedApp;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Pause between window lookups while waiting for a launched app
pub const WINDOW_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Directory names never descended into during folder search
const SKIPPED_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    "target",
    "build",
    "dist",
    "cache",
    "venv",
    "$recycle.bin",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchSpec {
    Folder { dir: PathBuf, pattern: String },
    Direct { path: PathBuf },
    Window,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunAppParams {
    pub launch: LaunchSpec,
    /// Title pattern of the window to select; launch modes default to the file stem
    pub window_pattern: Option<String>,
    /// Select the window after launching
    pub auto_window: bool,
    /// Seconds to wait for the window to appear
    pub timeout: u64,
}

impl RunAppParams {
    pub fn parse(mut args: Args<'_>) -> ScriptResult<Self> {
        let mode = args.required("mode")?;
        let mut params = Self {
            launch: LaunchSpec::Window,
            window_pattern: None,
            auto_window: true,
            timeout: DEFAULT_TIMEOUT_SECS,
        };

        if mode.is_word("folder") {
            let dir = PathBuf::from(&args.required("folder")?.text);
            let pattern = args.required("file pattern")?.text.clone();
            params.launch = LaunchSpec::Folder { dir, pattern };
        } else if mode.is_word("direct") {
            let path = PathBuf::from(&args.required("path")?.text);
            params.launch = LaunchSpec::Direct { path };
        } else if mode.is_word("window") {
            params.window_pattern = Some(args.required("window pattern")?.text.clone());
        } else {
            return Err(args.invalid("mode", mode.text.clone()));
        }

        let launches = params.launch != LaunchSpec::Window;
        while let Some(flag) = args.next() {
            if flag.is_word("--timeout") {
                params.timeout = args.value("timeout")?;
            } else if launches && flag.is_word("--window") {
                params.window_pattern = Some(args.required("window pattern")?.text.clone());
            } else if launches && flag.is_word("--no-auto") {
                params.auto_window = false;
            } else {
                return Err(args.invalid("flag", flag.text.clone()));
            }
        }
        Ok(params)
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut out = Vec::new();
        match &self.launch {
            LaunchSpec::Folder { dir, pattern } => {
                out.extend(["folder".to_string(), quote(&dir.to_string_lossy()), quote(pattern)]);
            }
            LaunchSpec::Direct { path } => {
                out.extend(["direct".to_string(), quote(&path.to_string_lossy())]);
            }
            LaunchSpec::Window => {
                out.push("window".to_string());
                out.push(quote(self.window_pattern.as_deref().unwrap_or_default()));
            }
        }
        if self.launch != LaunchSpec::Window {
            if let Some(pattern) = &self.window_pattern {
                out.extend(["--window".to_string(), quote(pattern)]);
            }
            if !self.auto_window {
                out.push("--no-auto".to_string());
            }
        }
        out.extend(["--timeout".to_string(), self.timeout.to_string()]);
        out
    }

    pub fn execute(&self, ctx: &mut ExecContext<'_>) -> ExecResult<Outcome> {
        let launched = match &self.launch {
            LaunchSpec::Folder { dir, pattern } => {
                let file = find_latest_match(dir, pattern)?.ok_or_else(|| {
                    ExecError::NotFound(format!(
                        "no file matching '{}' under {}",
                        pattern,
                        dir.display()
                    ))
                })?;
                info!(file = %file.display(), "selected newest match");
                Some(self.launch_file(ctx, &file)?)
            }
            LaunchSpec::Direct { path } => {
                if !path.exists() {
                    return Err(ExecError::NotFound(format!("{} does not exist", path.display())));
                }
                Some(self.launch_file(ctx, path)?)
            }
            LaunchSpec::Window => None,
        };

        if launched.is_some() && !self.auto_window {
            return Ok(Outcome::Completed);
        }

        let pattern = match (&self.window_pattern, &launched) {
            (Some(pattern), _) => pattern.clone(),
            (None, Some(path)) => file_stem(path),
            (None, None) => return Err(ExecError::NotFound("no window pattern".into())),
        };

        let tries = (self.timeout.saturating_mul(1000) / WINDOW_POLL_INTERVAL.as_millis() as u64)
            .clamp(1, u32::MAX as u64) as u32;
        let stop = ctx.stop;
        let slice = ctx.settings.poll_interval;

        let mut ranked = Vec::new();
        let outcome = poll_until(tries, WINDOW_POLL_INTERVAL, slice, stop, |attempt| {
            match ctx.backends.windows.find_windows("") {
                Ok(windows) => {
                    ranked = rank_windows(&pattern, windows);
                    debug!(attempt, candidates = ranked.len(), "window lookup");
                    !ranked.is_empty()
                }
                Err(e) => {
                    warn!(attempt, error = %e, "window lookup failed");
                    false
                }
            }
        });

        match outcome {
            PollOutcome::Matched { .. } => {}
            PollOutcome::Interrupted { .. } => return Ok(Outcome::Interrupted),
            PollOutcome::Exhausted { attempts } => {
                warn!(%pattern, timeout = self.timeout, "window did not appear");
                return Ok(Outcome::TimedOut { attempts });
            }
        }

        let chosen = activate_best(ctx, &ranked);
        info!(title = %chosen.title, bounds = %chosen.bounds(), "target window selected");
        ctx.state.select_target(chosen.title.clone());
        if let (Some(path), Some(app)) = (&launched, ctx.state.launched_apps.last_mut()) {
            if &app.path == path {
                app.window_title = Some(chosen.title.clone());
            }
        }
        ctx.window = Some(chosen.bounds());
        Ok(Outcome::Completed)
    }

    fn launch_file(&self, ctx: &mut ExecContext<'_>, path: &Path) -> ExecResult<PathBuf> {
        if ctx.stop.is_set() {
            return Err(BackendError::Stopped("launch").into());
        }
        let pid = ctx.backends.launcher.launch(path)?;
        info!(path = %path.display(), ?pid, "application launched");
        ctx.state.launched_apps.push(LaunchedApp {
            path: path.to_path_buf(),
            pid,
            window_title: None,
            launched_at: Utc::now(),
        });
        Ok(path.to_path_buf())
    }
}

/// Try to activate candidates best-first. If every activation fails the best
/// candidate is still selected; later commands address it by its bounds.
fn activate_best<'w>(ctx: &ExecContext<'_>, ranked: &'w [WindowInfo]) -> &'w WindowInfo {
    for window in ranked {
        match ctx.backends.windows.activate(window) {
            Ok(()) => return window,
            Err(e) => warn!(title = %window.title, error = %e, "activation failed, trying next candidate"),
        }
    }
    warn!("no candidate could be activated, selecting without activation");
    &ranked[0]
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

// =============================================================================
// Window scoring
// =============================================================================

/// Minimum size for the "real main window" bonus
const MIN_MAIN_WINDOW: (u32, u32) = (400, 300);

/// Titles that usually belong to helper windows, not the app itself
const HELPER_TITLE_WORDS: &[&str] = &["installer", "setup", "updater", "update"];

/// Score how well `window` matches `pattern`; zero means no match.
///
/// Exact title 100, prefix 80, substring 60 (all case-insensitive), plus 5
/// per pattern word found in the title, plus 10 for a main-window-sized
/// window, minus 20 for installer/updater-looking titles.
pub fn score_window(pattern: &str, window: &WindowInfo) -> i32 {
    let title = window.title.trim().to_lowercase();
    let pattern = pattern.trim().to_lowercase();
    if title.is_empty() || pattern.is_empty() {
        return 0;
    }

    let base = if title == pattern {
        100
    } else if title.starts_with(&pattern) {
        80
    } else if title.contains(&pattern) {
        60
    } else {
        0
    };

    let keywords = pattern
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .filter(|w| title.contains(w))
        .count() as i32;

    if base == 0 && keywords == 0 {
        return 0;
    }

    let mut score = base + keywords * 5;
    if window.width >= MIN_MAIN_WINDOW.0 && window.height >= MIN_MAIN_WINDOW.1 {
        score += 10;
    }
    if HELPER_TITLE_WORDS.iter().any(|w| title.contains(w) && !pattern.contains(w)) {
        score -= 20;
    }
    score.max(1)
}

/// Matching windows, best first; equal scores prefer the larger window
pub fn rank_windows(pattern: &str, windows: Vec<WindowInfo>) -> Vec<WindowInfo> {
    let mut scored: Vec<(i32, WindowInfo)> = windows
        .into_iter()
        .map(|w| (score_window(pattern, &w), w))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| {
        sb.cmp(sa)
            .then_with(|| area(b).cmp(&area(a)))
    });
    scored.into_iter().map(|(_, w)| w).collect()
}

fn area(window: &WindowInfo) -> u64 {
    window.width as u64 * window.height as u64
}

// =============================================================================
// Folder search
// =============================================================================

fn is_skipped_dir(name: &str) -> bool {
    let lower = name.to_lowercase();
    (lower.starts_with('.') && lower.chars().count() > 1) || SKIPPED_DIRS.contains(&lower.as_str())
}

/// Translate a `*`/`?` glob into an anchored, case-insensitive regex
fn glob_regex(pattern: &str) -> Option<Regex> {
    if !pattern.contains(['*', '?']) {
        return None;
    }
    let mut re = String::from("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// How a file name matches the search pattern; higher is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NameMatch {
    Substring,
    Glob,
    ExactStem,
}

fn match_name(path: &Path, pattern: &str, glob: Option<&Regex>) -> Option<NameMatch> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    let stem = path.file_stem()?.to_string_lossy().to_lowercase();
    let lower = pattern.to_lowercase();

    if stem == lower || name == lower {
        Some(NameMatch::ExactStem)
    } else if glob.is_some_and(|re| re.is_match(&name)) {
        Some(NameMatch::Glob)
    } else if glob.is_none() && name.contains(&lower) {
        Some(NameMatch::Substring)
    } else {
        None
    }
}

/// Newest file under `dir` matching `pattern`.
///
/// Exact stem beats glob beats substring; within a class the most recently
/// modified file wins. Dot-directories (except one-character names) and
/// build/cache directories are not searched.
pub fn find_latest_match(dir: &Path, pattern: &str) -> ExecResult<Option<PathBuf>> {
    if !dir.is_dir() {
        return Err(ExecError::NotFound(format!("{} is not a directory", dir.display())));
    }
    let glob = glob_regex(pattern);

    let mut best: Option<(NameMatch, SystemTime, PathBuf)> = None;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %current.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else { continue };

            if file_type.is_dir() {
                if !is_skipped_dir(&entry.file_name().to_string_lossy()) {
                    pending.push(path);
                }
                continue;
            }

            let Some(class) = match_name(&path, pattern, glob.as_ref()) else { continue };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let better = match &best {
                None => true,
                Some((best_class, best_time, _)) => (class, modified) > (*best_class, *best_time),
            };
            if better {
                best = Some((class, modified, path));
            }
        }
    }

    Ok(best.map(|(_, _, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tokenize;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn runapp(line: &str) -> ScriptResult<RunAppParams> {
        let tokens = tokenize(line).unwrap();
        RunAppParams::parse(Args::new("runapp", &tokens))
    }

    #[test]
    fn parses_folder_mode_with_flags() {
        let p = runapp(r#"folder "C:\\builds" "app*.exe" --window "My App" --no-auto --timeout 5"#).unwrap();
        assert_eq!(
            p,
            RunAppParams {
                launch: LaunchSpec::Folder {
                    dir: PathBuf::from("C:\\builds"),
                    pattern: "app*.exe".into()
                },
                window_pattern: Some("My App".into()),
                auto_window: false,
                timeout: 5,
            }
        );
    }

    #[test]
    fn window_mode_only_takes_timeout() {
        let p = runapp(r#"window "Notepad""#).unwrap();
        assert_eq!(p.window_pattern.as_deref(), Some("Notepad"));
        assert_eq!(p.timeout, DEFAULT_TIMEOUT_SECS);
        assert!(runapp(r#"window "Notepad" --no-auto"#).is_err());
        assert!(runapp("teleport x").is_err());
    }

    #[test]
    fn scoring_prefers_exact_then_prefix_then_substring() {
        let exact = WindowInfo::new("Calculator", 0, 0, 500, 400);
        let prefix = WindowInfo::new("Calculator - Scientific", 0, 0, 500, 400);
        let inner = WindowInfo::new("My Calculator", 0, 0, 500, 400);
        assert!(score_window("calculator", &exact) > score_window("calculator", &prefix));
        assert!(score_window("calculator", &prefix) > score_window("calculator", &inner));
        assert_eq!(score_window("calculator", &WindowInfo::new("Notepad", 0, 0, 500, 400)), 0);
    }

    #[test]
    fn helper_windows_are_penalized_and_ties_prefer_larger() {
        let ranked = rank_windows(
            "game",
            vec![
                WindowInfo::new("Game Updater", 0, 0, 800, 600),
                WindowInfo::new("Game Launcher", 0, 0, 300, 200),
                WindowInfo::new("Game Client", 0, 0, 1280, 720),
                WindowInfo::new("Game Launcher", 0, 0, 1600, 900),
            ],
        );
        let order: Vec<(String, u32)> = ranked.iter().map(|w| (w.title.clone(), w.width)).collect();
        assert_eq!(
            order,
            vec![
                ("Game Launcher".to_string(), 1600),
                ("Game Client".to_string(), 1280),
                ("Game Launcher".to_string(), 300),
                ("Game Updater".to_string(), 800),
            ]
        );
    }

    #[test]
    fn keyword_match_counts_without_substring() {
        let w = WindowInfo::new("Order Viewer - Store", 0, 0, 800, 600);
        assert!(score_window("store order", &w) > 0);
    }

    #[test]
    fn skipped_directories() {
        assert!(is_skipped_dir(".git"));
        assert!(is_skipped_dir("node_modules"));
        assert!(is_skipped_dir("__pycache__"));
        assert!(!is_skipped_dir("."));
        assert!(!is_skipped_dir("releases"));
    }

    #[test]
    fn folder_search_priority_and_recency() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path();
        fs::create_dir_all(base.join("v1")).unwrap();
        fs::create_dir_all(base.join(".hidden")).unwrap();
        fs::create_dir_all(base.join("node_modules")).unwrap();

        fs::write(base.join("v1/tool-old.exe"), b"").unwrap();
        thread::sleep(Duration::from_millis(30));
        fs::write(base.join("tool-new.exe"), b"").unwrap();
        fs::write(base.join(".hidden/tool.exe"), b"").unwrap();
        fs::write(base.join("node_modules/tool.exe"), b"").unwrap();

        // Glob: newest of the two visible matches
        let found = find_latest_match(base, "tool-*.exe").unwrap().unwrap();
        assert_eq!(found, base.join("tool-new.exe"));

        // Exact stem beats a newer substring match
        thread::sleep(Duration::from_millis(30));
        fs::write(base.join("v1/tool.exe"), b"").unwrap();
        thread::sleep(Duration::from_millis(30));
        fs::write(base.join("tool-newest.exe"), b"").unwrap();
        let found = find_latest_match(base, "tool").unwrap().unwrap();
        assert_eq!(found, base.join("v1/tool.exe"));

        // Substring fallback
        let found = find_latest_match(base, "newest").unwrap().unwrap();
        assert_eq!(found, base.join("tool-newest.exe"));

        assert_eq!(find_latest_match(base, "missing").unwrap(), None);
    }

    #[test]
    fn folder_search_requires_directory() {
        assert!(matches!(
            find_latest_match(Path::new("/definitely/not/a/dir"), "x"),
            Err(ExecError::NotFound(_))
        ));
    }
}
