//! Data models module
//!
//! Defines core data structures:
//! - Config: Effective runtime configuration
//! - FsEvent: Decoded filesystem change on a watched directory
//! - ProcessEvent: Newly discovered process
//! - ConfigError: Validation failures for user supplied settings

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_DRAIN_DURATION, DEFAULT_MAX_CMD_LENGTH, DEFAULT_RECURSIVE_DIRS, DEFAULT_SCAN_INTERVAL,
    UNKNOWN_FIELD,
};

/// Effective configuration for a monitoring run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directories watched with all their subdirectories
    pub recursive_dirs: Vec<PathBuf>,
    /// Directories watched without descending
    pub dirs: Vec<PathBuf>,
    /// Print filesystem events
    pub log_fs: bool,
    /// Print process events
    pub log_ps: bool,
    /// Startup window during which events and triggers are discarded
    pub drain_duration: Duration,
    /// Floor frequency of process scans
    pub scan_interval: Duration,
    /// Colorize process events by owner
    pub colored: bool,
    /// Resolve parent pids
    pub track_ppid: bool,
    /// Command lines are truncated to this many bytes
    pub max_cmd_length: usize,
    /// Print transient errors
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recursive_dirs: DEFAULT_RECURSIVE_DIRS.iter().map(PathBuf::from).collect(),
            dirs: Vec::new(),
            log_fs: false,
            log_ps: true,
            drain_duration: DEFAULT_DRAIN_DURATION,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            colored: true,
            track_ppid: false,
            max_cmd_length: DEFAULT_MAX_CMD_LENGTH,
            debug: false,
        }
    }
}

impl Config {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(self.scan_interval.as_millis() as u64));
        }
        if self.max_cmd_length == 0 {
            return Err(ConfigError::InvalidTruncation(self.max_cmd_length));
        }
        Ok(())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Printing events (colored={}): processes={} | file-system-events={} ||| \
             Scanning for processes every {}ms and on inotify events ||| \
             Watching directories: {:?} (recursive) | {:?} (non-recursive)",
            self.colored,
            self.log_ps,
            self.log_fs,
            self.scan_interval.as_millis(),
            self.recursive_dirs,
            self.dirs,
        )
    }
}

/// A filesystem change reported by the kernel event queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    /// Symbolic operation name, e.g. `CREATE` or `OPEN DIR`
    pub op: String,
    /// Watched directory joined with the entry name, if any
    pub path: PathBuf,
}

impl fmt::Display for FsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<20} | {}", self.op, self.path.display())
    }
}

/// Parent pid of a discovered process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentPid {
    /// Parent tracking is disabled
    Untracked,
    /// Tracking is enabled but the stat record could not be read or parsed
    Unresolved,
    Known(u32),
}

/// A process seen for the first time during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEvent {
    /// Owner uid, `None` when /proc/<pid> could not be stat'ed
    pub uid: Option<u32>,
    pub pid: u32,
    pub ppid: ParentPid,
    /// Command line with NUL separators replaced by spaces
    pub cmd: String,
}

impl fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uid = self
            .uid
            .map_or_else(|| UNKNOWN_FIELD.to_string(), |uid| uid.to_string());

        match self.ppid {
            ParentPid::Untracked => {
                write!(f, "UID={:<5} PID={:<6} | {}", uid, self.pid, self.cmd)
            }
            ParentPid::Unresolved => write!(
                f,
                "UID={:<5} PID={:<6} PPID={:<6} | {}",
                uid, self.pid, UNKNOWN_FIELD, self.cmd
            ),
            ParentPid::Known(ppid) => write!(
                f,
                "UID={:<5} PID={:<6} PPID={:<6} | {}",
                uid, self.pid, ppid, self.cmd
            ),
        }
    }
}

/// Custom error types for configuration handling
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid scan interval: {0}ms. Must be greater than 0")]
    InvalidInterval(u64),
    #[error("Invalid command line truncation length: {0}. Must be greater than 0")]
    InvalidTruncation(usize),
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
