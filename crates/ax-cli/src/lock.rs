//! Input lock coordination
//!
//! The lock is held by a running `axlockd` process. Its pid is recorded in a
//! state file; a record naming a live process means locked, a record naming a
//! dead process is stale and removed on the next query.

use crate::constants::{
    DEFAULT_LOCK_TIMEOUT_SECS, HANDOFF_POLL_ATTEMPTS, HANDOFF_POLL_INTERVAL_MS, LOCK_SETTLE_DELAY_MS,
    MAX_LOCK_TIMEOUT_SECS, UNLOCK_POLL_ATTEMPTS, UNLOCK_POLL_INTERVAL_MS,
};
use crate::errors::AxError;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Name of the suppressor binary
pub const DAEMON_BINARY: &str = "axlockd";

/// Everything the suppressor needs to start
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub timeout_secs: u64,
    pub handoff: PathBuf,
    pub socket: PathBuf,
    pub lock_file: PathBuf,
    pub log_file: PathBuf,
}

/// Starts the suppression process
pub trait Launcher {
    fn launch(&self, request: &LaunchRequest) -> Result<Child, AxError>;
}

/// Launches the `axlockd` binary
#[derive(Debug, Default)]
pub struct DaemonLauncher;

impl DaemonLauncher {
    /// Find `axlockd`: `AX_LOCKD_PATH`, then the build-time path, then next
    /// to the running executable, then `PATH`
    pub fn locate() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os("AX_LOCKD_PATH") {
            return Some(PathBuf::from(path));
        }
        if let Some(path) = option_env!("AXLOCKD_PATH") {
            return Some(PathBuf::from(path));
        }
        if let Some(sibling) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(DAEMON_BINARY)))
            .filter(|p| p.is_file())
        {
            return Some(sibling);
        }
        std::env::var_os("PATH").and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(DAEMON_BINARY))
                .find(|p| p.is_file())
        })
    }
}

impl Launcher for DaemonLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<Child, AxError> {
        let binary = Self::locate()
            .ok_or_else(|| AxError::action_failed(format!("{} not found", DAEMON_BINARY)))?;

        if let Some(dir) = request.log_file.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| AxError::action_failed(format!("failed to create {}: {}", dir.display(), e)))?;
        }
        // Not inherited: the suppressor outlives us and must not hold our stderr open
        let log = fs::File::create(&request.log_file).map_err(|e| {
            AxError::action_failed(format!("failed to open {}: {}", request.log_file.display(), e))
        })?;

        tracing::debug!(binary = %binary.display(), "launching suppressor");
        Command::new(&binary)
            .arg("--timeout")
            .arg(request.timeout_secs.to_string())
            .arg("--handoff")
            .arg(&request.handoff)
            .arg("--socket")
            .arg(&request.socket)
            .arg("--lock-file")
            .arg(&request.lock_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(log)
            .spawn()
            .map_err(|e| AxError::action_failed(format!("failed to launch {}: {}", binary.display(), e)))
    }
}

/// Result of a lock request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LockOutcome {
    Locked {
        pid: i32,
        timeout: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        window: Option<u64>,
    },
    AlreadyLocked {
        pid: i32,
    },
}

/// Result of an unlock request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnlockOutcome {
    Unlocked { pid: i32, forced: bool },
    NotLocked,
}

/// Current lock state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
}

/// Per-invocation file the suppressor writes its overlay handle to
///
/// Removed when dropped, whichever way `lock` returns.
struct Handoff {
    path: PathBuf,
}

/// What the suppressor did while we waited for its handoff
enum HandoffState {
    Written(String),
    Exited(ExitStatus),
    Missing,
}

impl Handoff {
    fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or_default();
        Self {
            path: std::env::temp_dir().join(format!("ax-lock-{}-{}.handoff", std::process::id(), nanos)),
        }
    }

    /// Poll for the handoff until it appears, the child exits or the attempts run out
    fn wait(&self, child: &mut Child) -> HandoffState {
        for attempt in 0..=HANDOFF_POLL_ATTEMPTS {
            if let Ok(Some(status)) = child.try_wait() {
                return HandoffState::Exited(status);
            }
            if let Ok(content) = fs::read_to_string(&self.path) {
                return HandoffState::Written(content);
            }
            if attempt < HANDOFF_POLL_ATTEMPTS {
                thread::sleep(Duration::from_millis(HANDOFF_POLL_INTERVAL_MS));
            }
        }
        HandoffState::Missing
    }
}

impl Drop for Handoff {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Requested timeout, defaulted and capped
pub fn effective_timeout(requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(DEFAULT_LOCK_TIMEOUT_SECS)
        .clamp(1, MAX_LOCK_TIMEOUT_SECS)
}

/// Whether `pid` names a running process
///
/// Our own exited children are reaped first so they do not linger as zombies.
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    let pid = Pid::from_raw(pid);
    if let Ok(status) = waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        if status != WaitStatus::StillAlive {
            return false;
        }
    }
    match signal::kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

pub struct LockCoordinator<L: Launcher = DaemonLauncher> {
    state_path: PathBuf,
    socket_path: PathBuf,
    launcher: L,
}

impl<L: Launcher> LockCoordinator<L> {
    pub fn new(state_path: PathBuf, socket_path: PathBuf, launcher: L) -> Self {
        Self {
            state_path,
            socket_path,
            launcher,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    fn log_path(&self) -> PathBuf {
        self.state_path.with_file_name("lockd.log")
    }

    fn remove_record(&self) {
        match fs::remove_file(&self.state_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to remove {}: {}", self.state_path.display(), e),
        }
    }

    /// Pid of the running suppressor; removes a stale record
    pub fn locked_pid(&self) -> Option<i32> {
        let content = fs::read_to_string(&self.state_path).ok()?;
        match content.trim().parse::<i32>() {
            Ok(pid) if is_alive(pid) => Some(pid),
            _ => {
                tracing::info!("removing stale lock record {}", self.state_path.display());
                self.remove_record();
                None
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked_pid().is_some()
    }

    pub fn status(&self) -> LockStatus {
        let pid = self.locked_pid();
        LockStatus {
            locked: pid.is_some(),
            pid,
        }
    }

    pub fn lock(&self, requested_timeout: Option<u64>) -> Result<LockOutcome, AxError> {
        if let Some(pid) = self.locked_pid() {
            return Ok(LockOutcome::AlreadyLocked { pid });
        }

        let timeout = effective_timeout(requested_timeout);
        let handoff = Handoff::new();

        let request = LaunchRequest {
            timeout_secs: timeout,
            handoff: handoff.path.clone(),
            socket: self.socket_path.clone(),
            lock_file: self.state_path.clone(),
            log_file: self.log_path(),
        };
        let mut child = self.launcher.launch(&request)?;
        let pid = child.id() as i32;

        thread::sleep(Duration::from_millis(LOCK_SETTLE_DELAY_MS));

        // An empty handoff means the suppressor runs without an overlay window
        let window = match handoff.wait(&mut child) {
            HandoffState::Written(content) => content.trim().parse::<u64>().ok(),
            HandoffState::Exited(status) => {
                return Err(AxError::action_failed(format!(
                    "{} exited immediately ({}); input monitoring permission may be missing, see {}",
                    DAEMON_BINARY,
                    status,
                    request.log_file.display()
                )));
            }
            HandoffState::Missing => {
                tracing::warn!("no overlay handle from {} at {}", DAEMON_BINARY, handoff.path.display());
                None
            }
        };

        if let Err(e) = self.persist(pid) {
            // Never leave an unregistered suppressor running
            let _ = child.kill();
            let _ = child.wait();
            return Err(AxError::action_failed(format!(
                "failed to record lock state in {}: {}",
                self.state_path.display(),
                e
            )));
        }

        tracing::info!(pid, timeout, "input locked");
        Ok(LockOutcome::Locked {
            pid,
            timeout,
            window,
        })
    }

    fn persist(&self, pid: i32) -> io::Result<()> {
        if let Some(dir) = self.state_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.state_path, pid.to_string())
    }

    pub fn unlock(&self) -> Result<UnlockOutcome, AxError> {
        let Some(pid) = self.locked_pid() else {
            return Ok(UnlockOutcome::NotLocked);
        };

        if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
            tracing::debug!(pid, "SIGTERM failed: {}", e);
        }

        let mut exited = false;
        for _ in 0..UNLOCK_POLL_ATTEMPTS {
            thread::sleep(Duration::from_millis(UNLOCK_POLL_INTERVAL_MS));
            if !is_alive(pid) {
                exited = true;
                break;
            }
        }

        if !exited {
            tracing::warn!(pid, "suppressor ignored SIGTERM, killing it");
            let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
            let _ = waitpid(Pid::from_raw(pid), Some(WaitPidFlag::WNOHANG));
        }

        self.remove_record();
        tracing::info!(pid, "input unlocked");
        Ok(UnlockOutcome::Unlocked {
            pid,
            forced: !exited,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptLauncher;
    use super::*;

    fn coordinator(dir: &Path, script: &str) -> LockCoordinator<ScriptLauncher> {
        LockCoordinator::new(
            dir.join(".ax").join("lockd.pid"),
            dir.join("axlockd.sock"),
            ScriptLauncher::new(script),
        )
    }

    #[test]
    fn test_timeout_cap() {
        assert_eq!(effective_timeout(Some(1000)), 300);
        assert_eq!(effective_timeout(None), 60);
        assert_eq!(effective_timeout(Some(10)), 10);
    }

    #[test]
    fn test_stale_record_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let lock = coordinator(dir.path(), "exec sleep 30");

        let mut exited = Command::new("true").spawn().unwrap();
        let dead_pid = exited.id() as i32;
        exited.wait().unwrap();

        fs::create_dir_all(lock.state_path().parent().unwrap()).unwrap();
        fs::write(lock.state_path(), dead_pid.to_string()).unwrap();

        assert!(!lock.is_locked());
        // 事後条件: 古いロック記録は削除される
        assert!(!lock.state_path().exists());
    }

    #[test]
    fn test_lock_then_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let lock = coordinator(dir.path(), "exec sleep 30");

        let outcome = lock.lock(Some(10)).unwrap();
        let LockOutcome::Locked { pid, timeout, window } = outcome else {
            panic!("expected a new lock, got {:?}", outcome);
        };
        assert_eq!(timeout, 10);
        assert_eq!(window, None);
        assert_eq!(lock.locked_pid(), Some(pid));
        assert_eq!(fs::read_to_string(lock.state_path()).unwrap(), pid.to_string());

        let unlocked = lock.unlock().unwrap();
        assert_eq!(unlocked, UnlockOutcome::Unlocked { pid, forced: false });
        assert_eq!(lock.locked_pid(), None);
        assert!(!lock.state_path().exists());
    }

    #[test]
    fn test_second_lock_reports_existing_holder() {
        let dir = tempfile::tempdir().unwrap();
        let lock = coordinator(dir.path(), "exec sleep 30");

        let self_pid = std::process::id() as i32;
        fs::create_dir_all(lock.state_path().parent().unwrap()).unwrap();
        fs::write(lock.state_path(), self_pid.to_string()).unwrap();

        let outcome = lock.lock(None).unwrap();
        assert_eq!(outcome, LockOutcome::AlreadyLocked { pid: self_pid });
        assert!(lock.launcher.launched.lock().is_empty());
    }

    #[test]
    fn test_handoff_is_read_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let lock = coordinator(dir.path(), "echo 4242 > \"$AX_HANDOFF\"; exec sleep 30");

        let outcome = lock.lock(None).unwrap();
        let LockOutcome::Locked { window, .. } = outcome else {
            panic!("expected a new lock");
        };
        assert_eq!(window, Some(4242));
        let launched = lock.launcher.launched.lock().clone();
        assert!(!launched[0].1.handoff.exists());

        lock.unlock().unwrap();
    }

    #[test]
    fn test_late_handoff_is_still_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let lock = coordinator(dir.path(), "sleep 1; echo 77 > \"$AX_HANDOFF\"; exec sleep 30");

        let outcome = lock.lock(None).unwrap();
        let LockOutcome::Locked { window, .. } = outcome else {
            panic!("expected a new lock");
        };
        assert_eq!(window, Some(77));
        let launched = lock.launcher.launched.lock().clone();
        assert!(!launched[0].1.handoff.exists());

        lock.unlock().unwrap();
    }

    #[test]
    fn test_empty_handoff_means_no_window() {
        let dir = tempfile::tempdir().unwrap();
        let lock = coordinator(dir.path(), ": > \"$AX_HANDOFF\"; exec sleep 30");

        let outcome = lock.lock(None).unwrap();
        let LockOutcome::Locked { window, .. } = outcome else {
            panic!("expected a new lock");
        };
        assert_eq!(window, None);

        lock.unlock().unwrap();
    }

    #[test]
    fn test_handoff_removed_when_suppressor_exits() {
        let dir = tempfile::tempdir().unwrap();
        let lock = coordinator(dir.path(), "echo 5 > \"$AX_HANDOFF\"; exit 1");

        let err = lock.lock(None).unwrap_err();
        assert!(matches!(err, AxError::ActionFailed(_)));
        // 事後条件: 失敗しても引き渡しファイルは残らない
        let launched = lock.launcher.launched.lock().clone();
        assert!(!launched[0].1.handoff.exists());
    }

    #[test]
    fn test_immediate_exit_is_failed_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock = coordinator(dir.path(), "exit 1");

        let err = lock.lock(None).unwrap_err();
        assert!(matches!(err, AxError::ActionFailed(_)));
        assert!(!lock.state_path().exists());
    }

    #[test]
    fn test_persist_failure_kills_suppressor() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let lock = LockCoordinator::new(
            blocker.join("lockd.pid"),
            dir.path().join("axlockd.sock"),
            ScriptLauncher::new("exec sleep 30"),
        );

        let err = lock.lock(None).unwrap_err();
        assert!(matches!(err, AxError::ActionFailed(_)));

        let launched = lock.launcher.launched.lock().clone();
        assert_eq!(launched.len(), 1);
        assert!(!is_alive(launched[0].0));
    }

    #[test]
    fn test_unlock_when_not_locked() {
        let dir = tempfile::tempdir().unwrap();
        let lock = coordinator(dir.path(), "exec sleep 30");
        assert_eq!(lock.unlock().unwrap(), UnlockOutcome::NotLocked);
        assert_eq!(
            lock.status(),
            LockStatus {
                locked: false,
                pid: None
            }
        );
    }

    #[test]
    fn test_outcome_wire_shape() {
        let value = serde_json::to_value(LockOutcome::AlreadyLocked { pid: 7 }).unwrap();
        assert_eq!(value, serde_json::json!({"status": "already_locked", "pid": 7}));
    }
}
