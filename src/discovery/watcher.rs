//! Records file watcher for discovery reloads.
//!
//! The file's parent directory is watched, not the file itself, so that an
//! atomic replacement (write a sibling, then rename over the records file)
//! is picked up. Events for other entries in that directory are ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::discovery::record::{load_records_file, ServiceRecord};
use crate::discovery::registry::ServiceRegistry;

/// Watches the service records file and forwards every valid record set.
pub struct RecordsWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<Vec<ServiceRecord>>,
}

/// Result of one reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reload {
    Forwarded,
    Rejected,
    ReceiverGone,
}

impl RecordsWatcher {
    /// Create a watcher for `path`.
    ///
    /// Returns the watcher and a receiver for validated record sets.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<Vec<ServiceRecord>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Updates stop when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let dir = watch_dir(&path);
        tracing::info!(path = ?path, dir = ?dir, "Service records watcher started");

        let mut receiver_gone = false;
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if !receiver_gone && touches(&event, &path) => {
                if reload(&path, &update_tx) == Reload::ReceiverGone {
                    tracing::warn!(path = ?path, "Registry stopped listening; ignoring further records changes");
                    receiver_gone = true;
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, path = ?path, "Records watch error"),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(watcher)
    }
}

/// Apply reloaded record sets to `registry` until shutdown or the watcher goes away.
///
/// `on_applied` runs after every swap, e.g. to re-resolve the downstream.
pub async fn apply_updates(
    mut updates: mpsc::UnboundedReceiver<Vec<ServiceRecord>>,
    registry: Arc<ServiceRegistry>,
    mut shutdown: broadcast::Receiver<()>,
    on_applied: impl Fn(),
) {
    loop {
        tokio::select! {
            Some(records) = updates.recv() => {
                registry.replace(records);
                on_applied();
            }
            _ = shutdown.recv() => break,
            else => break,
        }
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether `event` creates or changes the records file.
fn touches(event: &Event, path: &Path) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return false;
    }
    let name = path.file_name();
    event.paths.iter().any(|p| p.file_name() == name)
}

fn reload(path: &Path, tx: &mpsc::UnboundedSender<Vec<ServiceRecord>>) -> Reload {
    let records = match load_records_file(path) {
        Ok(records) => records,
        Err(e) => {
            tracing::error!(error = %e, path = ?path, "Rejected service records reload; keeping current records");
            return Reload::Rejected;
        }
    };

    tracing::info!(path = ?path, records = records.len(), "Service records reloaded");
    match tx.send(records) {
        Ok(()) => Reload::Forwarded,
        Err(_) => Reload::ReceiverGone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use notify::event::{AccessKind, CreateKind, ModifyKind};

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("gateway-records-{}", uuid::Uuid::new_v4()));
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn records(port: u16) -> String {
        format!("[[services]]\nname = \"audit\"\nendpoint = \"http://127.0.0.1:{}/\"\n", port)
    }

    /// Write a sibling file, then rename it over `path`.
    fn replace_file(path: &Path, content: &str) {
        let staged = path.with_extension("staged");
        fs::write(&staged, content).unwrap();
        fs::rename(&staged, path).unwrap();
    }

    fn audit_port(registry: &ServiceRegistry) -> Option<u16> {
        registry.lookup("audit").and_then(|r| r.endpoint.port())
    }

    #[test]
    fn test_only_changes_to_the_records_file_count() {
        let path = Path::new("/etc/gateway/records.toml");
        let event = |kind, p: &str| Event::new(kind).add_path(PathBuf::from(p));

        assert!(touches(&event(EventKind::Modify(ModifyKind::Any), "/etc/gateway/records.toml"), path));
        assert!(touches(&event(EventKind::Create(CreateKind::File), "/etc/gateway/records.toml"), path));
        assert!(!touches(&event(EventKind::Modify(ModifyKind::Any), "/etc/gateway/records.staged"), path));
        assert!(!touches(&event(EventKind::Access(AccessKind::Any), "/etc/gateway/records.toml"), path));
    }

    #[test]
    fn test_watch_dir_for_bare_file_name() {
        assert_eq!(watch_dir(Path::new("records.toml")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("/srv/records.toml")), PathBuf::from("/srv"));
    }

    #[test]
    fn test_invalid_file_is_not_forwarded() {
        let dir = TempDir::new();
        let path = dir.0.join("records.toml");
        let (tx, mut rx) = mpsc::unbounded_channel();

        fs::write(&path, records(9001)).unwrap();
        assert_eq!(reload(&path, &tx), Reload::Forwarded);
        assert_eq!(rx.try_recv().unwrap()[0].endpoint.port(), Some(9001));

        fs::write(&path, "services = 3").unwrap();
        assert_eq!(reload(&path, &tx), Reload::Rejected);
        assert!(rx.try_recv().is_err());

        fs::write(&path, records(9002)).unwrap();
        drop(rx);
        assert_eq!(reload(&path, &tx), Reload::ReceiverGone);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_records() {
        let dir = TempDir::new();
        let path = dir.0.join("records.toml");
        fs::write(&path, records(9001)).unwrap();

        let registry = Arc::new(ServiceRegistry::new(Vec::new()));
        registry.replace(load_records_file(&path).unwrap());

        let (watcher, updates) = RecordsWatcher::new(&path);
        let _guard = watcher.run().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(apply_updates(updates, registry.clone(), shutdown_rx, || {}));

        replace_file(&path, &records(9002));
        let mut reloaded = false;
        for _ in 0..100 {
            if audit_port(&registry) == Some(9002) {
                reloaded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(reloaded, "valid change was not applied");

        replace_file(&path, "services = 3");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(audit_port(&registry), Some(9002));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
