//! Portable backend built on the `notify` crate.

use std::path::{Path, PathBuf};

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::WatchError;
use super::event::ChangeEvent;

/// Watch every entry of `dirs` (relative to `root`) non-recursively and bridge
/// the watcher's events into `tx`.
///
/// Returns the watcher, which must be kept alive, and the bridge task.
pub(super) fn start(
    root: &Path,
    dirs: &[PathBuf],
    tx: mpsc::Sender<ChangeEvent>,
) -> Result<(RecommendedWatcher, JoinHandle<()>), WatchError> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<notify::Result<Event>>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = std_tx.send(res);
    })?;
    for dir in dirs {
        let path = root.join(dir);
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Notify {
                path: path.clone(),
                source,
            })?;
    }

    // Some platforms report canonical paths (e.g. /private/var on macOS).
    let roots: Vec<PathBuf> = std::iter::once(root.to_path_buf())
        .chain(root.canonicalize().ok())
        .collect();

    // Bridge: spawn_blocking to receive from std channel, filter, forward to tokio
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            let event = match result {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "file watcher error");
                    continue;
                }
            };
            if !is_write_complete(&event.kind) {
                continue;
            }
            if event.paths.is_empty() {
                warn!(kind = ?event.kind, "event ignored: no path attached");
                continue;
            }
            for path in event.paths {
                if path.is_dir() {
                    continue;
                }
                let Some(relative) = relative_to(&roots, &path) else {
                    warn!(path = %path.display(), "event ignored: outside the watched directory");
                    continue;
                };
                if tx.blocking_send(ChangeEvent::new(relative)).is_err() {
                    return; // receiver dropped, shutdown
                }
            }
        }
    });

    Ok((watcher, bridge_task))
}

/// True for events that mean "a file was written and closed".
///
/// Only Linux reports close events; elsewhere a data modification is the
/// closest signal available.
fn is_write_complete(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            !cfg!(any(target_os = "linux", target_os = "android"))
        }
        _ => false,
    }
}

fn relative_to(roots: &[PathBuf], path: &Path) -> Option<PathBuf> {
    roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
