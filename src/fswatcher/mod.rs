//! Filesystem watcher
//!
//! Composes the directory walker with the kernel event queue:
//! - `init` registers watches on every directory below the configured roots,
//!   stopping a root as soon as the kernel watch ceiling is reached
//! - `run` starts an observer thread blocked on the queue and a decode task,
//!   producing a trigger stream, an event stream and an error stream
//!
//! The watch table is written only while initializing. Afterwards it is
//! shared read-only between the observer and the decoder.

pub mod inotify;
pub mod walker;

use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::FsEvent;
use inotify::event::READ_BUFFER_SIZE;
use inotify::sys::InotifySys;
use inotify::{DecodeError, EventSource, EventSourceError};
use walker::WalkError;

/// Opaque signal pacing the process scanner
pub type Trigger = ();

const EVENT_CHANNEL_CAPACITY: usize = 16;
const ERROR_CHANNEL_CAPACITY: usize = 16;

/// Lifecycle of a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Uninitialized,
    Initializing,
    Watching,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("setting up inotify: {0}")]
    Setup(#[source] EventSourceError),
    #[error("adding inotify watchers: {0}")]
    Walk(#[from] WalkError),
    #[error("Can't create watcher: {0}")]
    Watch(#[source] EventSourceError),
    #[error("reading inotify buffer: {0}")]
    Read(#[source] EventSourceError),
    #[error("parsing events: {0}")]
    Decode(#[from] DecodeError),
    #[error("closing inotify: {0}")]
    Close(#[source] EventSourceError),
    #[error("spawning inotify observer: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("operation not allowed while watcher is {0:?}")]
    InvalidState(WatcherState),
}

impl WatcherError {
    /// Whether the pipeline cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WatcherError::Setup(_) | WatcherError::Read(EventSourceError::Unrecoverable { .. })
        )
    }
}

/// Convert the kernel's raw limit into a ceiling; zero or negative means unlimited
pub fn watch_ceiling(raw: i64) -> Option<usize> {
    usize::try_from(raw).ok().filter(|&limit| limit > 0)
}

/// In-flight initialization
pub struct InitHandle {
    /// Walk and watch failures, reported while initialization continues
    pub errors: mpsc::Receiver<WatcherError>,
    /// Resolves with the initialized watcher, or the setup error
    pub done: JoinHandle<Result<FsWatcher, WatcherError>>,
}

/// Streams produced by a running watcher
pub struct WatchStreams {
    /// One value per completed or failed read of the queue
    pub triggers: mpsc::Receiver<Trigger>,
    /// Feeds additional triggers into `triggers`
    pub trigger_injector: mpsc::Sender<Trigger>,
    pub events: mpsc::Receiver<FsEvent>,
    pub errors: mpsc::Receiver<WatcherError>,
}

pub struct FsWatcher {
    source: Arc<EventSource>,
    max_watches: Option<usize>,
    state: WatcherState,
    running: bool,
}

impl FsWatcher {
    /// Watcher over `sys`, registering at most `max_watches` watches
    pub fn new(sys: Box<dyn InotifySys>, max_watches: Option<usize>) -> Self {
        Self {
            source: Arc::new(EventSource::new(sys)),
            max_watches,
            state: WatcherState::Uninitialized,
            running: false,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn source(&self) -> &EventSource {
        &self.source
    }

    pub fn num_watches(&self) -> usize {
        self.source.num_watches()
    }

    /// Human readable description of the watch set
    pub fn summary(&self) -> String {
        let count = self.num_watches();
        if count < 20 {
            let mut dirs: Vec<String> = self
                .source
                .watched_dirs()
                .map(|dir| dir.display().to_string())
                .collect();
            dirs.sort();
            format!("Watching: {:?}", dirs)
        } else {
            format!("Watching {} directories", count)
        }
    }

    /// Open the queue and register watches, reporting non-fatal errors through `report`
    ///
    /// Recursive roots are walked without a depth limit, the others only
    /// contribute themselves. Only a failure to open the queue is returned.
    pub fn init_blocking(
        &mut self,
        recursive_dirs: &[PathBuf],
        dirs: &[PathBuf],
        report: &mut dyn FnMut(WatcherError),
    ) -> Result<(), WatcherError> {
        if self.state != WatcherState::Uninitialized {
            return Err(WatcherError::InvalidState(self.state));
        }
        let source =
            Arc::get_mut(&mut self.source).ok_or(WatcherError::InvalidState(self.state))?;

        self.state = WatcherState::Initializing;
        if let Err(err) = source.init() {
            self.state = WatcherState::Closed;
            return Err(WatcherError::Setup(err));
        }

        for dir in recursive_dirs {
            add_watches(source, dir, -1, self.max_watches, report);
        }
        for dir in dirs {
            add_watches(source, dir, 0, self.max_watches, report);
        }

        self.state = WatcherState::Watching;
        Ok(())
    }

    /// Initialize on a blocking thread so the caller can keep handling signals
    pub fn init(mut self, recursive_dirs: Vec<PathBuf>, dirs: Vec<PathBuf>) -> InitHandle {
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        let done = tokio::task::spawn_blocking(move || {
            let mut report = |err: WatcherError| {
                // Nobody listening means we are shutting down
                let _ = error_tx.blocking_send(err);
            };
            let result = self.init_blocking(&recursive_dirs, &dirs, &mut report);
            result.map(|()| self)
        });

        InitHandle {
            errors: error_rx,
            done,
        }
    }

    /// Start observing the queue
    pub fn run(&mut self) -> Result<WatchStreams, WatcherError> {
        if self.state != WatcherState::Watching || self.running {
            return Err(WatcherError::InvalidState(self.state));
        }

        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (data_tx, data_rx) = mpsc::channel(1);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        let source = Arc::clone(&self.source);
        let observer_triggers = trigger_tx.clone();
        let observer_errors = error_tx.clone();
        std::thread::Builder::new()
            .name("pspy-inotify-observer".to_string())
            .spawn(move || observe(&source, observer_triggers, data_tx, observer_errors))
            .map_err(WatcherError::Spawn)?;

        tokio::spawn(decode(Arc::clone(&self.source), data_rx, event_tx, error_tx));
        self.running = true;

        Ok(WatchStreams {
            triggers: trigger_rx,
            trigger_injector: trigger_tx,
            events: event_rx,
            errors: error_rx,
        })
    }

    /// Release the event queue
    pub fn close(&mut self) -> Result<(), WatcherError> {
        self.source.close().map_err(WatcherError::Close)?;
        self.state = WatcherState::Closed;
        Ok(())
    }
}

fn ceiling_reached(num_watches: usize, max_watches: Option<usize>) -> bool {
    max_watches.is_some_and(|max| num_watches >= max)
}

/// Watch every directory `walker::walk` yields below `root` until the ceiling is hit
fn add_watches(
    source: &mut EventSource,
    root: &Path,
    depth: i64,
    max_watches: Option<usize>,
    report: &mut dyn FnMut(WatcherError),
) {
    let mut dirs = walker::walk(root, depth);

    loop {
        if ceiling_reached(source.num_watches(), max_watches) {
            dirs.cancel();
            debug!(
                "Watch limit of {} reached, not descending further into {}",
                source.num_watches(),
                root.display()
            );
            return;
        }

        match dirs.next() {
            None => return,
            Some(Err(err)) => report(WatcherError::Walk(err)),
            Some(Ok(dir)) => {
                if let Err(err) = source.watch(&dir) {
                    report(WatcherError::Watch(err));
                }
            }
        }
    }
}

/// Blocking read loop; every read, successful or not, emits a trigger
fn observe(
    source: &EventSource,
    triggers: mpsc::Sender<Trigger>,
    data: mpsc::Sender<Vec<u8>>,
    errors: mpsc::Sender<WatcherError>,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let result = source.read(&mut buf);
        if source.is_closed() {
            return;
        }

        if triggers.blocking_send(()).is_err() {
            debug!("Trigger receiver dropped, stopping inotify observer");
            return;
        }

        match result {
            Ok(n) => {
                if data.blocking_send(buf[..n].to_vec()).is_err() {
                    return;
                }
            }
            Err(err) => {
                let fatal = matches!(err, EventSourceError::Unrecoverable { .. });
                let _ = errors.blocking_send(WatcherError::Read(err));
                if fatal {
                    return;
                }
            }
        }
    }
}

/// Split each buffer into records, forwarding events and decode errors
async fn decode(
    source: Arc<EventSource>,
    mut data: mpsc::Receiver<Vec<u8>>,
    events: mpsc::Sender<FsEvent>,
    errors: mpsc::Sender<WatcherError>,
) {
    while let Some(buf) = data.recv().await {
        for result in decode_buffer(&source, &buf) {
            match result {
                Ok(event) => {
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = errors.send(WatcherError::Decode(err)).await;
                }
            }
        }
    }
}

/// Decode every record in `buf`, in order
pub fn decode_buffer(source: &EventSource, buf: &[u8]) -> Vec<Result<FsEvent, DecodeError>> {
    let mut results = Vec::new();
    let mut rest = buf;

    while !rest.is_empty() {
        let (result, consumed) = source.parse_next(rest);
        rest = &rest[consumed.min(rest.len())..];
        results.push(result);
    }
    results
}
