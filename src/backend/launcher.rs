//! Launch applications the way a user double-clicking them would.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use super::{AppLauncher, BackendError, BackendResult};

/// Launcher using the platform's shell association.
///
/// Shortcuts (`.lnk`, `.url`, `.desktop`, `.app`) and documents go through the
/// shell opener; plain executables are spawned directly so their pid is known.
#[derive(Debug, Default, Clone)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl AppLauncher for SystemLauncher {
    fn launch(&mut self, path: &Path) -> BackendResult<Option<u32>> {
        if !path.exists() {
            return Err(BackendError::Launch(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let mut command = if is_direct_executable(path) {
            Command::new(path)
        } else {
            shell_open_command(path)
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BackendError::Launch(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), pid = child.id(), "launched");
        Ok(Some(child.id()))
    }
}

fn is_shortcut(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| matches!(ext.as_str(), "lnk" | "url" | "desktop" | "app"))
}

#[cfg(unix)]
fn is_direct_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    if is_shortcut(path) || path.is_dir() {
        return false;
    }
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(windows)]
fn is_direct_executable(path: &Path) -> bool {
    !is_shortcut(path)
        && path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("exe"))
}

#[cfg(target_os = "windows")]
fn shell_open_command(path: &Path) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", ""]).arg(path);
    cmd
}

#[cfg(target_os = "macos")]
fn shell_open_command(path: &Path) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(path);
    cmd
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn shell_open_command(path: &Path) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(path);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts_are_recognized() {
        assert!(is_shortcut(Path::new("C:/Users/me/Desktop/App.lnk")));
        assert!(is_shortcut(Path::new("/usr/share/applications/app.desktop")));
        assert!(!is_shortcut(Path::new("/usr/bin/app")));
    }

    #[test]
    fn missing_file_is_a_launch_error() {
        let mut launcher = SystemLauncher::new();
        let err = launcher.launch(Path::new("/definitely/not/here.exe")).unwrap_err();
        assert!(matches!(err, BackendError::Launch(_)));
    }
}
