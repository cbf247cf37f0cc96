use crate::{Result, VaultfindError};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use tracing::debug;

/// PID-file based process management for the daemon.
#[derive(Debug, Clone)]
pub struct ProcessManager {
    pid_file: PathBuf,
}

impl ProcessManager {
    pub fn new(pid_file: PathBuf) -> Self {
        Self { pid_file }
    }

    /// Record the current process id. Fails if another live daemon owns the
    /// pid file.
    pub fn acquire(&self) -> Result<()> {
        if let Some(pid) = self.running_pid() {
            return Err(VaultfindError::Daemon(format!(
                "daemon is already running (pid {pid})"
            )));
        }

        if let Some(parent) = self.pid_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.pid_file, std::process::id().to_string())?;
        debug!(pid_file = %self.pid_file.display(), "acquired pid file");
        Ok(())
    }

    /// Remove the pid file. Safe to call when it is already gone.
    pub fn release(&self) {
        let _ = std::fs::remove_file(&self.pid_file);
    }

    pub fn read_pid(&self) -> Option<i32> {
        std::fs::read_to_string(&self.pid_file)
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// The recorded pid, if that process is still alive.
    pub fn running_pid(&self) -> Option<i32> {
        let pid = self.read_pid()?;
        // Signal 0 probes for existence without delivering anything.
        kill(Pid::from_raw(pid), None).ok().map(|()| pid)
    }

    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    /// Deliver a signal to the recorded process.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        let pid = self
            .running_pid()
            .ok_or_else(|| VaultfindError::Daemon("daemon is not running".to_string()))?;
        kill(Pid::from_raw(pid), signal)
            .map_err(|e| VaultfindError::Daemon(format!("failed to signal pid {pid}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release() {
        let dir = TempDir::new().expect("tempdir");
        let manager = ProcessManager::new(dir.path().join("test.pid"));

        manager.acquire().expect("acquire");
        assert_eq!(manager.read_pid(), Some(std::process::id() as i32));
        // This test process is alive, so a second acquire must fail.
        assert!(manager.acquire().is_err());

        manager.release();
        assert_eq!(manager.read_pid(), None);
        assert!(!manager.is_running());
    }

    #[test]
    fn stale_pid_file_is_reclaimed() {
        let dir = TempDir::new().expect("tempdir");
        let manager = ProcessManager::new(dir.path().join("test.pid"));

        // A pid that cannot exist on Linux (above the default pid_max).
        std::fs::write(dir.path().join("test.pid"), "999999999").expect("write");
        assert!(!manager.is_running());
        manager.acquire().expect("reclaim stale pid file");
        manager.release();
    }
}
