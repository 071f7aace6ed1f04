//! Kernel filesystem event queue
//!
//! Handles:
//! - Opening and closing the inotify queue
//! - Registering watches and remembering which directory each belongs to
//! - Blocking reads with escalation of the EINVAL watch descriptor bug
//! - Decoding one binary record at a time into an [`FsEvent`]

pub mod event;
pub mod sys;

use nix::errno::Errno;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::constants::{EINVAL_RETRY_LIMIT, MAX_USER_WATCHES_PATH};
use crate::models::FsEvent;
use event::{op_name, trim_name, RawHeader, HEADER_SIZE, OVERFLOW_WD};
use sys::InotifySys;

/// Errors raised by the event queue itself
#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    #[error("initializing inotify: {0}")]
    Setup(#[source] Errno),
    #[error("inotify is not initialized")]
    NotInitialized,
    #[error("adding watch to {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: Errno,
    },
    #[error("reading from inotify fd {fd}: {source}")]
    Read {
        fd: RawFd,
        #[source]
        source: Errno,
    },
    #[error("unrecoverable inotify error ({source}) after {count} consecutive failed reads")]
    Unrecoverable {
        count: usize,
        #[source]
        source: Errno,
    },
    #[error("closing inotify fd {fd}: {source}")]
    Close {
        fd: RawFd,
        #[source]
        source: Errno,
    },
    #[error("reading watch limit from {path}: {reason}")]
    Limit { path: PathBuf, reason: String },
}

/// Errors for a single record; the caller skips it and keeps scanning
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("incomplete read: n={0}")]
    IncompleteRecord(usize),
    #[error("record name of {len} bytes exceeds the {available} bytes left in the buffer")]
    TruncatedName { len: usize, available: usize },
    #[error("possible inotify event overflow")]
    PossibleOverflow,
    #[error("unknown watcher ID: {0}")]
    UnknownWatch(i32),
}

/// A registered directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub wd: i32,
    pub path: PathBuf,
}

/// Event queue plus the watch table needed to turn records into paths
pub struct EventSource {
    sys: Box<dyn InotifySys>,
    fd: Option<RawFd>,
    watches: HashMap<i32, PathBuf>,
    einval_reads: AtomicUsize,
    closed: AtomicBool,
}

impl EventSource {
    pub fn new(sys: Box<dyn InotifySys>) -> Self {
        Self {
            sys,
            fd: None,
            watches: HashMap::new(),
            einval_reads: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Open the kernel queue
    pub fn init(&mut self) -> Result<(), EventSourceError> {
        let fd = self.sys.init().map_err(EventSourceError::Setup)?;
        self.fd = Some(fd);
        Ok(())
    }

    /// Register interest in all events of `path`; existing watches are untouched on failure
    pub fn watch(&mut self, path: &Path) -> Result<Watch, EventSourceError> {
        let fd = self.fd.ok_or(EventSourceError::NotInitialized)?;
        let wd = self
            .sys
            .add_watch(fd, path)
            .map_err(|source| EventSourceError::Watch {
                path: path.to_path_buf(),
                source,
            })?;

        self.watches.insert(wd, path.to_path_buf());
        Ok(Watch {
            wd,
            path: path.to_path_buf(),
        })
    }

    pub fn num_watches(&self) -> usize {
        self.watches.len()
    }

    /// Watched directories in no particular order
    pub fn watched_dirs(&self) -> impl Iterator<Item = &Path> {
        self.watches.values().map(PathBuf::as_path)
    }

    /// Block until the kernel delivers records into `buf`
    ///
    /// A run of EINVAL failures longer than the retry limit means the queue
    /// is stuck on the watch descriptor overflow bug and will never recover.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, EventSourceError> {
        let fd = self.fd.ok_or(EventSourceError::NotInitialized)?;

        match self.sys.read(fd, buf) {
            Ok(n) => {
                self.einval_reads.store(0, Ordering::Relaxed);
                Ok(n)
            }
            Err(Errno::EINVAL) => {
                let count = self.einval_reads.fetch_add(1, Ordering::Relaxed) + 1;
                if count > EINVAL_RETRY_LIMIT {
                    return Err(EventSourceError::Unrecoverable {
                        count,
                        source: Errno::EINVAL,
                    });
                }
                Err(EventSourceError::Read {
                    fd,
                    source: Errno::EINVAL,
                })
            }
            Err(source) => {
                self.einval_reads.store(0, Ordering::Relaxed);
                Err(EventSourceError::Read { fd, source })
            }
        }
    }

    /// Decode the record at the front of `buf`
    ///
    /// Always returns how many bytes the caller should skip, including on
    /// error, so a buffer can be scanned to its end.
    pub fn parse_next(&self, buf: &[u8]) -> (Result<FsEvent, DecodeError>, usize) {
        let Some(header) = RawHeader::parse(buf) else {
            return (Err(DecodeError::IncompleteRecord(buf.len())), buf.len());
        };

        let record_len = header.record_len();
        if record_len > buf.len() {
            let err = DecodeError::TruncatedName {
                len: header.len as usize,
                available: buf.len() - HEADER_SIZE,
            };
            return (Err(err), HEADER_SIZE);
        }

        if header.wd == OVERFLOW_WD {
            return (Err(DecodeError::PossibleOverflow), record_len);
        }

        let Some(dir) = self.watches.get(&header.wd) else {
            return (Err(DecodeError::UnknownWatch(header.wd)), record_len);
        };

        let name = trim_name(&buf[HEADER_SIZE..record_len]);
        let path = if name.is_empty() {
            dir.clone()
        } else {
            dir.join(name)
        };

        let event = FsEvent {
            op: op_name(header.mask),
            path,
        };
        (Ok(event), record_len)
    }

    /// Release the kernel queue; later calls are no-ops
    pub fn close(&self) -> Result<(), EventSourceError> {
        let Some(fd) = self.fd else {
            return Ok(());
        };
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.sys
            .close(fd)
            .map_err(|source| EventSourceError::Close { fd, source })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Kernel ceiling on concurrent watches
pub fn max_user_watches() -> Result<i64, EventSourceError> {
    read_watch_limit(Path::new(MAX_USER_WATCHES_PATH))
}

/// Parse a watch limit file holding a single integer
pub fn read_watch_limit(path: &Path) -> Result<i64, EventSourceError> {
    let content = std::fs::read_to_string(path).map_err(|e| EventSourceError::Limit {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    content
        .trim()
        .parse::<i64>()
        .map_err(|e| EventSourceError::Limit {
            path: path.to_path_buf(),
            reason: format!("converting {:?} to integer: {}", content.trim(), e),
        })
}
