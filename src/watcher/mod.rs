pub mod event;
#[cfg(target_os = "linux")]
mod inotify;
mod portable;

use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use event::ChangeEvent;

/// Capacity of the channel between the event source and its consumer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Which OS facility produces change events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// inotify on Linux, the portable backend elsewhere.
    #[default]
    Auto,
    /// Raw inotify (Linux only).
    Inotify,
    /// The `notify` crate's recommended watcher for the platform.
    Portable,
}

impl Backend {
    /// Replace `Auto` with the concrete backend for this platform.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(target_os = "linux") => Self::Inotify,
            Self::Auto => Self::Portable,
            other => other,
        }
    }
}

/// Errors raised while setting up watches. All of them are fatal.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("cannot access {}: {source}", .path.display())]
    Access {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("failed to scan directory tree: {0}")]
    Walk(#[from] ignore::Error),
    #[cfg(target_os = "linux")]
    #[error("failed to initialise inotify: {0}")]
    Init(#[source] io::Error),
    #[cfg(target_os = "linux")]
    #[error("failed to watch {}: {source}", .path.display())]
    AddWatch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to watch {}: {source}", .path.display())]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("file watcher: {0}")]
    Backend(#[from] notify::Error),
    #[error("the {0:?} backend is not available on this platform")]
    Unsupported(Backend),
}

/// Handle to a running event source. Dropping it stops watching.
pub struct WatcherHandle {
    /// Keep alive: dropping the notify watcher stops the OS watcher.
    _watcher: Option<notify::RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start watching `root` for files closed after writing.
///
/// Returns a `WatcherHandle` (must be kept alive) and a receiver yielding one
/// `ChangeEvent` per close-after-write, with paths relative to `root`.
///
/// With `recursive`, every subdirectory present now is watched as well.
/// Directories created later are not picked up.
///
/// Must be called from within a tokio runtime.
pub fn start_watcher(
    root: &Path,
    recursive: bool,
    backend: Backend,
) -> Result<(WatcherHandle, mpsc::Receiver<ChangeEvent>), WatchError> {
    let metadata = std::fs::metadata(root).map_err(|source| WatchError::Access {
        path: root.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(WatchError::NotADirectory(root.to_path_buf()));
    }

    let dirs = watched_dirs(root, recursive)?;
    debug!(root = %root.display(), dirs = dirs.len(), ?backend, "registering watches");

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let handle = match backend.resolve() {
        Backend::Portable => {
            let (watcher, task) = portable::start(root, &dirs, tx)?;
            WatcherHandle {
                _watcher: Some(watcher),
                task,
            }
        }
        #[cfg(target_os = "linux")]
        Backend::Inotify => WatcherHandle {
            _watcher: None,
            task: inotify::start(root, dirs, tx)?,
        },
        other => return Err(WatchError::Unsupported(other)),
    };

    Ok((handle, rx))
}

/// Directories to watch, relative to `root`. The root itself is the empty path.
///
/// Symbolic links are not followed.
fn watched_dirs(root: &Path, recursive: bool) -> Result<Vec<PathBuf>, WatchError> {
    if !recursive {
        return Ok(vec![PathBuf::new()]);
    }

    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build();

    let mut dirs = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            dirs.push(relative.to_path_buf());
        }
    }
    Ok(dirs)
}
