//! Follows the server log and forwards classified events.
//!
//! The tailer starts at the current end of the file and yields each new
//! line once it is complete. It follows the file by name: when the path is
//! replaced (log rotation) or truncated, the new content is read from the
//! start. A file that disappears is waited for.
//!
//! Nothing is read on a timer. The directory holding the log is watched and
//! only changes to the log's own name wake the tailer.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures::{pin_mut, Stream, StreamExt};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::common::error::{RelayError, RelayResult};
use crate::relay::classifier::Classifier;
use crate::relay::sink::ReplySink;

/// Identity of the file currently open, used to spot rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
}

impl FileId {
    #[cfg(unix)]
    fn of(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    fn of(_metadata: &std::fs::Metadata) -> Self {
        Self {}
    }
}

/// Whether a filesystem event can mean new content under `file_name`.
fn touches(event: &Event, file_name: &OsString) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        // Our own opens and reads.
        return false;
    }
    // An event without paths is a rescan request from the backend.
    event.paths.is_empty()
        || event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name.as_os_str()))
}

/// Watch the directory of `path` and signal `changes` for events on it.
fn watch_log(path: &Path, changes: mpsc::UnboundedSender<()>) -> notify::Result<RecommendedWatcher> {
    let file_name = path.file_name().map(OsString::from).unwrap_or_default();
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| match result {
            Ok(event) if touches(&event, &file_name) => {
                let _ = changes.send(());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Log watcher error: {}", e);
                let _ = changes.send(());
            }
        },
        notify::Config::default(),
    )?;
    watcher.watch(&directory, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Line-by-line follower of a growing text file.
pub struct LogTailer {
    path: PathBuf,
    /// Kept alive for as long as the tailer; dropping it stops the events.
    _watcher: RecommendedWatcher,
    changes: mpsc::UnboundedReceiver<()>,
    reader: Option<BufReader<File>>,
    file_id: Option<FileId>,
    position: u64,
    /// Bytes of a line whose newline has not been written yet.
    partial: Vec<u8>,
}

impl LogTailer {
    /// Open `path` positioned at its current end.
    ///
    /// Failing to open or to watch is an error; later disappearance of the
    /// file is not.
    pub async fn open(path: impl AsRef<Path>) -> RelayResult<Self> {
        let path = path.as_ref().to_path_buf();
        let log_source_error = |source| RelayError::LogSource {
            path: path.display().to_string(),
            source,
        };

        // Watch first so nothing written after the seek is missed.
        let (sender, changes) = mpsc::unbounded_channel();
        let watcher = watch_log(&path, sender).map_err(|source| RelayError::Watch {
            path: path.display().to_string(),
            source,
        })?;

        let mut file = File::open(&path).await.map_err(log_source_error)?;
        let metadata = file.metadata().await.map_err(log_source_error)?;
        let position = file.seek(SeekFrom::End(0)).await.map_err(log_source_error)?;

        info!("Following {} from byte {}", path.display(), position);

        Ok(Self {
            path,
            _watcher: watcher,
            changes,
            reader: Some(BufReader::new(file)),
            file_id: Some(FileId::of(&metadata)),
            position,
            partial: Vec::new(),
        })
    }

    /// Wait for the next complete line.
    ///
    /// `None` once the watcher has gone away and no more changes can be
    /// observed.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.read_available().await {
                return Some(line);
            }
            self.check_rotation().await;
            if let Some(line) = self.read_available().await {
                return Some(line);
            }

            if self.changes.recv().await.is_none() {
                warn!("Stopped watching {}", self.path.display());
                return None;
            }
            // One read pass covers every change queued so far.
            while self.changes.try_recv().is_ok() {}
        }
    }

    /// Turn the tailer into a stream of lines, ending with the watcher.
    pub fn into_lines(self) -> impl Stream<Item = String> {
        futures::stream::unfold(self, |mut tailer| async move {
            let line = tailer.next_line().await?;
            Some((line, tailer))
        })
    }

    /// Read one complete line if one is buffered or on disk.
    async fn read_available(&mut self) -> Option<String> {
        let reader = self.reader.as_mut()?;

        match reader.read_until(b'\n', &mut self.partial).await {
            Ok(0) => None,
            Ok(n) => {
                self.position += n as u64;
                if self.partial.last() != Some(&b'\n') {
                    // Writer is mid-line; keep the bytes and wait for the rest.
                    return None;
                }
                let line = String::from_utf8_lossy(&self.partial).trim_end().to_string();
                self.partial.clear();
                Some(line)
            }
            Err(e) => {
                warn!("Error reading {}: {}", self.path.display(), e);
                self.reader = None;
                None
            }
        }
    }

    /// Reopen the path if it now names a different or truncated file.
    async fn check_rotation(&mut self) {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(_) => {
                if self.file_id.take().is_some() {
                    warn!("{} has become inaccessible, waiting for it", self.path.display());
                }
                return;
            }
        };

        let replaced = self.file_id != Some(FileId::of(&metadata));
        let truncated = !replaced && metadata.len() < self.position;
        if !replaced && !truncated && self.reader.is_some() {
            return;
        }

        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) => {
                debug!("Cannot reopen {} yet: {}", self.path.display(), e);
                return;
            }
        };

        if replaced || truncated {
            if truncated {
                info!("{} was truncated, following from the start", self.path.display());
            } else {
                info!("{} was replaced, following the new file", self.path.display());
            }
            self.position = 0;
            self.partial.clear();
        } else if let Err(e) = file.seek(SeekFrom::Start(self.position)).await {
            // Same file after a read error: resume where we stopped.
            debug!("Cannot seek {}: {}", self.path.display(), e);
            return;
        }

        self.reader = Some(BufReader::new(file));
        self.file_id = Some(FileId::of(&metadata));
    }
}

/// Forward every classified event from the log to `sink`.
///
/// Runs for as long as the log can be watched. A failed send is logged and
/// dropped; the next event is still attempted.
pub async fn forward_events(tailer: LogTailer, classifier: &Classifier, sink: &dyn ReplySink) {
    let lines = tailer.into_lines();
    pin_mut!(lines);

    while let Some(line) = lines.next().await {
        for event in classifier.classify(&line) {
            let message = event.render();
            match sink.send(&message).await {
                Ok(()) => info!(label = event.label, "Log -> Discord: {}", event.text),
                Err(e) => warn!("Dropping log event '{}': {}", message, e),
            }
        }
    }
}
