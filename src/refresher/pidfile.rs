//! Single-instance-per-host supervision for the token refresher: a PID
//! file, a liveness check via `sysinfo`, and graceful-then-forced
//! termination of any prior instance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::{Pid, Signal, System};
use tracing::{debug, info, warn};

use crate::error::Result;

/// The process name substring we look for in an existing PID's command
/// line before deciding it's safe to kill — guards against a PID being
/// reused by an unrelated process after a crash.
const PROCESS_MARKER: &str = "token-refresher";

/// Write the current process's PID to `path`.
pub fn write_pidfile(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, std::process::id().to_string())?;
    debug!(path = %path.display(), "wrote PID file");
    Ok(())
}

/// Remove `path` if it exists; failures are logged, not propagated — a
/// leftover PID file is not fatal to shutdown.
pub fn remove_pidfile(path: &Path) {
    if path.exists()
        && let Err(e) = std::fs::remove_file(path)
    {
        warn!(path = %path.display(), error = %e, "failed to remove PID file");
    }
}

/// Read `path`, and if it names a live process whose command line contains
/// [`PROCESS_MARKER`], terminate it: `SIGTERM` first, then `SIGKILL` after
/// a grace period if it hasn't exited. Returns whether an instance was
/// killed.
pub fn kill_existing_instance(path: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return false;
    };

    let Ok(old_pid) = contents.trim().parse::<usize>() else {
        remove_pidfile(path);
        return false;
    };

    let mut system = System::new_all();
    system.refresh_all();
    let pid = Pid::from(old_pid);

    let Some(process) = system.process(pid) else {
        debug!(pid = old_pid, "PID no longer exists");
        remove_pidfile(path);
        return false;
    };

    let cmdline = process
        .cmd()
        .iter()
        .filter_map(|s| s.to_str())
        .collect::<Vec<_>>()
        .join(" ");

    if !cmdline.contains(PROCESS_MARKER) {
        debug!(pid = old_pid, "PID exists but is not a token refresher process");
        return false;
    }

    info!(pid = old_pid, "found existing token refresher instance, terminating");
    process.kill_with(Signal::Term);

    for _ in 0..10 {
        std::thread::sleep(Duration::from_millis(500));
        system.refresh_all();
        if system.process(pid).is_none() {
            info!(pid = old_pid, "gracefully terminated existing instance");
            return true;
        }
    }

    warn!(pid = old_pid, "graceful shutdown timed out, force killing");
    if let Some(process) = system.process(pid) {
        process.kill();
    }
    true
}

/// Default PID file location under the user's home directory.
#[must_use]
pub fn default_pidfile_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-auth-registry")
        .join("token-refresher.pid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_removes_a_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refresher.pid");

        write_pidfile(&path).unwrap();
        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, std::process::id().to_string());

        remove_pidfile(&path);
        assert!(!path.exists());
    }

    #[test]
    fn missing_pidfile_has_no_existing_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.pid");
        assert!(!kill_existing_instance(&path));
    }

    #[test]
    fn garbage_pidfile_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refresher.pid");
        std::fs::write(&path, "not-a-pid").unwrap();
        assert!(!kill_existing_instance(&path));
        assert!(!path.exists());
    }
}
