//! Suppressor lifecycle: Starting, Active, Terminating

use crate::constants::{IDLE_MESSAGE, MAX_TIMEOUT_SECS};
use crate::filter::EventFilter;
use crate::hook::{HookError, InputInterceptor};
use crate::overlay::{Overlay, SharedOverlay, shared};
use crate::server::NotificationServer;
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum LockdError {
    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Active,
    Terminating,
}

/// Why the lock ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Timeout,
    Escape,
    Signal,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub timeout: Duration,
    /// File that receives the overlay handle once active
    pub handoff: PathBuf,
    pub socket_path: PathBuf,
    /// Lock state record to clear on exit if it still names this process
    pub lock_file: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn new(timeout_secs: u64, handoff: PathBuf, socket_path: PathBuf, lock_file: Option<PathBuf>) -> Self {
        let capped = timeout_secs.min(MAX_TIMEOUT_SECS);
        if capped != timeout_secs {
            tracing::warn!("timeout {}s capped to {}s", timeout_secs, capped);
        }
        Self {
            timeout: Duration::from_secs(capped),
            handoff,
            socket_path,
            lock_file,
        }
    }
}

pub struct Daemon<I: InputInterceptor> {
    config: DaemonConfig,
    interceptor: I,
    overlay: SharedOverlay,
    escape: Arc<Notify>,
    phase: Phase,
}

impl<I: InputInterceptor> Daemon<I> {
    pub fn new(config: DaemonConfig, interceptor: I, overlay: Box<dyn Overlay>) -> Self {
        Self {
            config,
            interceptor,
            overlay: shared(overlay),
            escape: Arc::new(Notify::new()),
            phase: Phase::Starting,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Install the hook and show the overlay; nothing else happens if the hook fails
    fn activate(&mut self) -> Result<(), LockdError> {
        let filter = Arc::new(Mutex::new(EventFilter::new(self.escape.clone())));
        self.interceptor.install(filter)?;

        let handle = {
            let mut overlay = self.overlay.lock();
            overlay.show(IDLE_MESSAGE);
            overlay.handle()
        };
        if let Err(e) = write_handoff(&self.config.handoff, handle) {
            tracing::warn!("failed to write handoff {}: {}", self.config.handoff.display(), e);
        }

        self.phase = Phase::Active;
        tracing::info!(timeout = ?self.config.timeout, "input locked");
        Ok(())
    }

    /// Run until timeout, escape or `shutdown` resolves, then tear down
    pub async fn run<F: Future<Output = ()>>(mut self, shutdown: F) -> Result<ExitReason, LockdError> {
        self.activate()?;

        // The listener is cosmetic; suppression continues without it
        let server = match NotificationServer::bind(&self.config.socket_path) {
            Ok(listener) => Some(tokio::spawn(NotificationServer::run(listener, self.overlay.clone()))),
            Err(e) => {
                tracing::warn!("notification listener unavailable: {}", e);
                None
            }
        };

        let reason = tokio::select! {
            _ = tokio::time::sleep(self.config.timeout) => ExitReason::Timeout,
            _ = self.escape.notified() => ExitReason::Escape,
            _ = shutdown => ExitReason::Signal,
        };
        tracing::info!(?reason, "releasing input lock");

        self.terminate(server);
        Ok(reason)
    }

    fn terminate(&mut self, server: Option<JoinHandle<()>>) {
        self.phase = Phase::Terminating;
        self.interceptor.uninstall();
        self.overlay.lock().close();

        if let Some(task) = server {
            task.abort();
        }
        remove_quietly(&self.config.socket_path);
        remove_quietly(&self.config.handoff);

        if let Some(lock_file) = &self.config.lock_file {
            if names_this_process(lock_file) {
                remove_quietly(lock_file);
            }
        }
    }
}

/// Publish the overlay handle in one step; empty when there is no window
fn write_handoff(path: &Path, handle: Option<u64>) -> io::Result<()> {
    let staging = path.with_extension("partial");
    std::fs::write(&staging, handle.map(|h| h.to_string()).unwrap_or_default())?;
    std::fs::rename(&staging, path)
}

fn names_this_process(lock_file: &Path) -> bool {
    std::fs::read_to_string(lock_file)
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok())
        == Some(std::process::id())
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove {}: {}", path.display(), e),
    }
}
