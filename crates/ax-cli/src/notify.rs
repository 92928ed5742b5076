//! Best-effort command notifications to the running suppressor
//!
//! Sent only while locked, bounded by a short timeout, and never fails the
//! calling command.

use crate::constants::NOTIFY_TIMEOUT_MS;
use crate::lock::{Launcher, LockCoordinator};
use ax_protocol::{Notification, ProtocolError, write_notification};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

async fn send(socket_path: &Path, notification: &Notification) -> Result<(), ProtocolError> {
    let mut stream = UnixStream::connect(socket_path).await?;
    write_notification(&mut stream, notification).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Tell the suppressor what just happened, if there is one
pub async fn notify_if_locked<L: Launcher>(lock: &LockCoordinator<L>, command: &str, description: &str) {
    if !lock.is_locked() {
        return;
    }

    let notification = Notification::command(command, description);
    let timeout = Duration::from_millis(NOTIFY_TIMEOUT_MS);
    match tokio::time::timeout(timeout, send(lock.socket_path(), &notification)).await {
        Ok(Ok(())) => tracing::debug!(command, "sent command notification"),
        Ok(Err(e)) => tracing::warn!("command notification failed: {}", e),
        Err(_) => tracing::warn!("command notification timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::testing::ScriptLauncher;
    use ax_protocol::read_notification;
    use std::fs;
    use std::path::PathBuf;
    use tokio::net::UnixListener;

    fn locked_coordinator(dir: &Path) -> LockCoordinator<ScriptLauncher> {
        let state = dir.join("lockd.pid");
        fs::write(&state, std::process::id().to_string()).unwrap();
        LockCoordinator::new(state, dir.join("axlockd.sock"), ScriptLauncher::new("true"))
    }

    #[tokio::test]
    async fn test_notification_sent_when_locked() {
        let dir = tempfile::tempdir().unwrap();
        let lock = locked_coordinator(dir.path());
        let listener = UnixListener::bind(lock.socket_path()).unwrap();

        notify_if_locked(&lock, "click", "Clicked at (10, 20)").await;

        let (mut stream, _) = listener.accept().await.unwrap();
        let received = read_notification(&mut stream).await.unwrap();
        assert_eq!(received, Notification::command("click", "Clicked at (10, 20)"));
    }

    #[tokio::test]
    async fn test_nothing_sent_when_unlocked() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LockCoordinator::new(
            dir.path().join("lockd.pid"),
            dir.path().join("axlockd.sock"),
            ScriptLauncher::new("true"),
        );
        let listener = UnixListener::bind(lock.socket_path()).unwrap();

        notify_if_locked(&lock, "key", "Pressed return").await;

        let accepted = tokio::time::timeout(Duration::from_millis(50), listener.accept()).await;
        assert!(accepted.is_err());
    }

    #[tokio::test]
    async fn test_missing_listener_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let lock = locked_coordinator(dir.path());
        let missing: PathBuf = lock.socket_path().to_path_buf();
        assert!(!missing.exists());

        // 事後条件: 受信側が無くても呼び出し元は失敗しない
        notify_if_locked(&lock, "type", "Typed 5 characters").await;
    }
}
