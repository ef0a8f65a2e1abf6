//! Native Linux backend: reads close-after-write events straight from inotify.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use inotify::{EventMask, EventStream, Inotify, WatchDescriptor, WatchMask};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use super::WatchError;
use super::event::ChangeEvent;

/// Room for many events per read; a single event needs at most
/// `sizeof(inotify_event) + NAME_MAX + 1` bytes.
const READ_BUFFER_LEN: usize = 8192;

/// Register a watch on `root.join(dir)` for every entry of `dirs` and spawn the
/// reader task that feeds `tx`.
pub(super) fn start(
    root: &Path,
    dirs: Vec<PathBuf>,
    tx: mpsc::Sender<ChangeEvent>,
) -> Result<JoinHandle<()>, WatchError> {
    let inotify = Inotify::init().map_err(WatchError::Init)?;

    let mut watches = HashMap::with_capacity(dirs.len());
    for dir in dirs {
        let path = root.join(&dir);
        let wd = inotify
            .watches()
            .add(&path, WatchMask::CLOSE_WRITE | WatchMask::ONLYDIR)
            .map_err(|source| WatchError::AddWatch { path, source })?;
        watches.insert(wd, dir);
    }

    let stream = inotify
        .into_event_stream(vec![0u8; READ_BUFFER_LEN])
        .map_err(WatchError::Init)?;
    Ok(tokio::spawn(read_loop(stream, watches, tx)))
}

async fn read_loop(
    mut stream: EventStream<Vec<u8>>,
    mut watches: HashMap<WatchDescriptor, PathBuf>,
    tx: mpsc::Sender<ChangeEvent>,
) {
    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                error!(error = %err, "reading inotify events failed");
                return;
            }
        };
        trace!(mask = ?event.mask, cookie = event.cookie, "inotify event");

        if event.mask.contains(EventMask::Q_OVERFLOW) {
            warn!("inotify queue overflowed; some changes were lost");
            continue;
        }
        if event.mask.contains(EventMask::IGNORED) {
            watches.remove(&event.wd);
            continue;
        }
        if !event.mask.contains(EventMask::CLOSE_WRITE) || event.mask.contains(EventMask::ISDIR) {
            continue;
        }

        let Some(name) = event.name else {
            warn!("event ignored: no file name");
            continue;
        };
        let Some(dir) = watches.get(&event.wd) else {
            warn!("event ignored: unknown watch descriptor");
            continue;
        };

        if tx.send(ChangeEvent::new(dir.join(name))).await.is_err() {
            return; // receiver dropped, shutdown
        }
    }
    error!("inotify event stream ended");
}
