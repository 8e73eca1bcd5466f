//! Session management for organized run output.
//!
//! Provides centralized management of replay sessions with:
//! - Unique session directories under the configured base location
//! - Numbered screenshot paths so captures never overwrite each other
//! - Automatic cleanup unless explicitly preserved
//! - Session metadata tracking

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::config;
use crate::coords::Resolution;

/// Name of the metadata file written into every session directory
pub const METADATA_FILE: &str = ".session.json";

/// A replay session with organized file management
#[derive(Debug)]
pub struct Session {
    /// Unique session ID
    pub id: String,
    /// Root directory for this session
    pub dir: PathBuf,
    /// Whether to keep files after session ends
    pub keep: bool,
    /// Reference resolution scripts in this session were authored against
    pub reference: Option<Resolution>,
    captures: AtomicU32,
}

impl Session {
    /// Create a new session with a unique ID
    pub fn new() -> Self {
        Self::at(PathBuf::from(config::session_base_dir()), generate_session_id())
    }

    /// Create a session with a specific name/prefix
    pub fn with_name(name: &str) -> Self {
        Self::named_in(config::session_base_dir(), name)
    }

    /// Create a named session under an explicit base directory
    pub fn named_in(base: impl AsRef<Path>, name: &str) -> Self {
        let id = format!("{}_{}", sanitize_name(name), generate_timestamp_suffix());
        Self::at(base.as_ref().to_path_buf(), id)
    }

    /// Create a session in a specific directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(generate_session_id);

        Self {
            id,
            dir,
            keep: true, // User-specified directories are kept by default
            reference: None,
            captures: AtomicU32::new(0),
        }
    }

    fn at(base: PathBuf, id: String) -> Self {
        let dir = base.join(&id);
        Self {
            id,
            dir,
            keep: false,
            reference: None,
            captures: AtomicU32::new(0),
        }
    }

    /// Set whether to keep files after session ends
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Record the reference resolution in the session metadata
    pub fn with_reference(mut self, reference: Resolution) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Initialize the session directory
    pub fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let metadata = serde_json::json!({
            "id": self.id,
            "created": chrono::Utc::now().to_rfc3339(),
            "host": host,
            "reference": self.reference.map(|r| r.to_string()),
        });

        fs::write(
            self.dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        debug!(dir = %self.dir.display(), "session initialized");

        Ok(())
    }

    /// Get path for a named capture file
    pub fn capture_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.png", sanitize_name(name)))
    }

    /// Allocate a fresh, numbered capture path (`003_login.png`)
    pub fn next_capture_path(&self, label: &str) -> PathBuf {
        let n = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        self.capture_path(&format!("{:03}_{}", n, label))
    }

    /// Get path for a non-image artifact in the session directory
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// List all PNG files in the session
    pub fn list_captures(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut captures = Vec::new();
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.extension().is_some_and(|e| e == "png") {
                    captures.push(path);
                }
            }
        }
        captures.sort();
        Ok(captures)
    }

    /// Clean up the session directory
    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// Generate a unique session ID
fn generate_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("session_{}_{}", timestamp, std::process::id())
}

/// Generate a timestamp suffix
fn generate_timestamp_suffix() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Sanitize a name for use in filenames
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Clean up sessions under the configured base older than `max_age`
pub fn cleanup_old_sessions(max_age: Duration) -> std::io::Result<usize> {
    cleanup_old_sessions_in(config::session_base_dir(), max_age)
}

/// Clean up sessions under `base` older than `max_age`
pub fn cleanup_old_sessions_in(base: impl AsRef<Path>, max_age: Duration) -> std::io::Result<usize> {
    let base = base.as_ref();
    if !base.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut cleaned = 0;

    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > max_age) && fs::remove_dir_all(&path).is_ok() {
            cleaned += 1;
        }
    }

    Ok(cleaned)
}

/// List all sessions under the configured base
pub fn list_sessions() -> std::io::Result<Vec<PathBuf>> {
    list_sessions_in(config::session_base_dir())
}

/// List all sessions under `base`
pub fn list_sessions_in(base: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let base = base.as_ref();
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(base)? {
        let path = entry?.path();
        if path.is_dir() {
            sessions.push(path);
        }
    }
    sessions.sort();
    Ok(sessions)
}
