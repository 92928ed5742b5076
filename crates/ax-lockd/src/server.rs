//! Command notification listener
//!
//! Accepts short-lived connections from `ax`, reads one notification per
//! connection and shows its description on the overlay. Nothing is sent
//! back, and bad input is dropped.

use crate::constants::RECEIVE_TIMEOUT_MS;
use crate::overlay::SharedOverlay;
use ax_protocol::{Notification, ProtocolError, read_notification};
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};

pub struct NotificationServer;

impl NotificationServer {
    /// Bind the rendezvous socket, replacing a leftover one
    pub fn bind(socket_path: &Path) -> Result<UnixListener, ProtocolError> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        tracing::info!("notification listener on {:?}", socket_path);
        Ok(listener)
    }

    /// Accept connections until the task is aborted
    pub async fn run(listener: UnixListener, overlay: SharedOverlay) {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let overlay = overlay.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, overlay).await {
                            match e {
                                ProtocolError::ConnectionClosed => {
                                    tracing::debug!("sender closed without a message");
                                }
                                _ => {
                                    tracing::debug!("dropped notification: {}", e);
                                }
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("accept error: {}", e);
                }
            }
        }
    }

    async fn handle_connection(mut stream: UnixStream, overlay: SharedOverlay) -> Result<(), ProtocolError> {
        let timeout = Duration::from_millis(RECEIVE_TIMEOUT_MS);
        let notification = tokio::time::timeout(timeout, read_notification(&mut stream))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "sender stalled"))??;

        match notification {
            Notification::Command {
                command,
                description,
            } => {
                tracing::debug!(%command, "command notification");
                overlay.lock().set_status(&description);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::shared;
    use crate::overlay::testing::RecordingOverlay;
    use ax_protocol::write_notification;
    use tokio::io::AsyncWriteExt;

    async fn wait_for_statuses(recording: &RecordingOverlay, count: usize) -> Vec<String> {
        for _ in 0..100 {
            let statuses = recording.statuses();
            if statuses.len() >= count {
                return statuses;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        recording.statuses()
    }

    fn start(dir: &Path) -> (std::path::PathBuf, RecordingOverlay, tokio::task::JoinHandle<()>) {
        let socket = dir.join("axlockd.sock");
        let recording = RecordingOverlay::default();
        let listener = NotificationServer::bind(&socket).unwrap();
        let task = tokio::spawn(NotificationServer::run(listener, shared(Box::new(recording.clone()))));
        (socket, recording, task)
    }

    #[tokio::test]
    async fn test_notification_updates_status() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, recording, task) = start(dir.path());

        let mut stream = UnixStream::connect(&socket).await.unwrap();
        write_notification(&mut stream, &Notification::command("click", "Clicked at (10, 20)"))
            .await
            .unwrap();
        drop(stream);

        let statuses = wait_for_statuses(&recording, 1).await;
        assert_eq!(statuses, vec!["Clicked at (10, 20)"]);
        task.abort();
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, recording, task) = start(dir.path());

        let mut bad = UnixStream::connect(&socket).await.unwrap();
        bad.write_all(b"not json\n").await.unwrap();
        drop(bad);

        let mut good = UnixStream::connect(&socket).await.unwrap();
        write_notification(&mut good, &Notification::command("key", "Pressed cmd+s"))
            .await
            .unwrap();
        drop(good);

        let statuses = wait_for_statuses(&recording, 1).await;
        // 事後条件: 不正なメッセージはステータスに現れない
        assert_eq!(statuses, vec!["Pressed cmd+s"]);
        task.abort();
    }

    #[tokio::test]
    async fn test_stalled_sender_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, recording, task) = start(dir.path());

        let _stalled = UnixStream::connect(&socket).await.unwrap();

        let mut stream = UnixStream::connect(&socket).await.unwrap();
        write_notification(&mut stream, &Notification::command("type", "Typed 3 characters"))
            .await
            .unwrap();
        drop(stream);

        let statuses = wait_for_statuses(&recording, 1).await;
        assert_eq!(statuses, vec!["Typed 3 characters"]);
        task.abort();
    }

    #[tokio::test]
    async fn test_bind_replaces_leftover_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("nested").join("axlockd.sock");
        std::fs::create_dir_all(socket.parent().unwrap()).unwrap();
        std::fs::write(&socket, b"stale").unwrap();

        let _listener = NotificationServer::bind(&socket).unwrap();
        assert!(UnixStream::connect(&socket).await.is_ok());
    }
}
