//! Bookkeeping file listing the clients that registered since startup.
//!
//! Each registration appends one `name ip` line. The file is truncated when
//! the server starts. Write failures are logged and otherwise ignored.

use log::{debug, warn};
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub const DEFAULT_CLIENT_LOG: &str = "clients.txt";

#[derive(Debug)]
pub struct ClientLog {
    file: Mutex<Option<File>>,
}

impl ClientLog {
    /// Creates or truncates the log at `path`.
    pub async fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await?;
        debug!("Client log truncated at {}", path.display());

        Ok(Self {
            file: Mutex::new(Some(file)),
        })
    }

    /// Opens the log at `path`, or a disabled one if there is no path or the
    /// file cannot be created. Bookkeeping never keeps the server from starting.
    pub async fn open_or_disabled(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::disabled();
        };
        match Self::create(path).await {
            Ok(log) => log,
            Err(e) => {
                warn!(
                    "Client log {} unavailable, continuing without it: {}",
                    path.display(),
                    e
                );
                Self::disabled()
            }
        }
    }

    /// A log that discards every record.
    pub fn disabled() -> Self {
        Self {
            file: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_enabled(&self) -> bool {
        self.file.try_lock().is_ok_and(|file| file.is_some())
    }

    pub async fn record(&self, name: &str, addr: SocketAddr) {
        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            return;
        };

        let line = format!("{} {}\n", name, addr.ip());
        let result = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to write client log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.txt", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_records_are_appended() {
        let path = temp_path("client-log-append");
        let log = ClientLog::create(&path).await.unwrap();
        let addr: SocketAddr = "10.0.0.7:4000".parse().unwrap();

        log.record("alice", addr).await;
        log.record("bob", addr).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "alice 10.0.0.7\nbob 10.0.0.7\n");
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_create_truncates() {
        let path = temp_path("client-log-truncate");
        tokio::fs::write(&path, "stale 1.2.3.4\n").await.unwrap();

        let log = ClientLog::create(&path).await.unwrap();
        assert!(log.is_enabled());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.is_empty());
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_disabled_log_is_silent() {
        let log = ClientLog::disabled();
        assert!(!log.is_enabled());
        log.record("nobody", "127.0.0.1:1".parse().unwrap()).await;
    }

    #[tokio::test]
    async fn test_unwritable_path_falls_back_to_disabled() {
        let path = Path::new("/nonexistent-dir/clients.txt");
        assert!(ClientLog::create(path).await.is_err());

        let log = ClientLog::open_or_disabled(Some(path)).await;
        assert!(!log.is_enabled());
        log.record("alice", "127.0.0.1:1".parse().unwrap()).await;
    }

    #[tokio::test]
    async fn test_no_path_is_disabled() {
        let log = ClientLog::open_or_disabled(None).await;
        assert!(!log.is_enabled());
    }
}
