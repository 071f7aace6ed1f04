//! Process scanner
//!
//! Re-lists the process table on every trigger and reports each pid it has
//! not seen before, together with its owner, command line and optionally its
//! parent. Pids are never forgotten, so a recycled pid is not reported again.

pub mod procfs;

use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::io;
use std::sync::OnceLock;
use tokio::sync::mpsc;

use crate::constants::{STAT_READ_LENGTH, UNKNOWN_FIELD};
use crate::fswatcher::Trigger;
use crate::models::{ParentPid, ProcessEvent};
use procfs::ProcSource;

const EVENT_CHANNEL_CAPACITY: usize = 100;
const ERROR_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("opening proc dir: {0}")]
    List(#[source] io::Error),
    #[error("spawning process scanner: {0}")]
    Spawn(#[source] io::Error),
}

/// Scanner tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    pub track_ppid: bool,
    pub max_cmd_length: usize,
}

/// Streams produced by a running scanner
pub struct ScanStreams {
    pub events: mpsc::Receiver<ProcessEvent>,
    pub errors: mpsc::Receiver<ScanError>,
}

pub struct ProcessScanner {
    source: Box<dyn ProcSource>,
    known: HashSet<u32>,
    config: ScannerConfig,
}

impl ProcessScanner {
    pub fn new(source: Box<dyn ProcSource>, config: ScannerConfig) -> Self {
        Self {
            source,
            known: HashSet::new(),
            config,
        }
    }

    /// Pids reported so far
    pub fn known_pids(&self) -> &HashSet<u32> {
        &self.known
    }

    /// One scan cycle: emit an event for every pid not reported before
    ///
    /// Candidates are handled newest-listed first. A listing failure abandons
    /// the cycle without touching the known set; per-process failures only
    /// degrade the fields of that event.
    pub fn refresh(&mut self, emit: &mut dyn FnMut(ProcessEvent)) -> Result<usize, ScanError> {
        let names = self.source.list().map_err(ScanError::List)?;
        let mut emitted = 0;

        for pid in names.iter().rev().filter_map(|name| parse_pid(name)) {
            if self.known.contains(&pid) {
                continue;
            }
            emit(self.describe(pid));
            self.known.insert(pid);
            emitted += 1;
        }

        Ok(emitted)
    }

    /// Scan once per trigger on a dedicated thread
    pub fn run(mut self, mut triggers: mpsc::Receiver<Trigger>) -> Result<ScanStreams, ScanError> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        std::thread::Builder::new()
            .name("pspy-process-scanner".to_string())
            .spawn(move || {
                while triggers.blocking_recv().is_some() {
                    let mut send = |event: ProcessEvent| {
                        let _ = event_tx.blocking_send(event);
                    };
                    if let Err(err) = self.refresh(&mut send) {
                        let _ = error_tx.blocking_send(err);
                    }
                }
                debug!("Trigger stream closed, stopping process scanner");
            })
            .map_err(ScanError::Spawn)?;

        Ok(ScanStreams {
            events: event_rx,
            errors: error_rx,
        })
    }

    fn describe(&self, pid: u32) -> ProcessEvent {
        ProcessEvent {
            uid: self.source.owner(pid).ok(),
            pid,
            ppid: self.parent_pid(pid),
            cmd: self.command_line(pid),
        }
    }

    fn command_line(&self, pid: u32) -> String {
        match self.source.read(pid, "cmdline", self.config.max_cmd_length) {
            Ok(raw) => {
                let cmd: Vec<u8> = raw.into_iter().map(|b| if b == 0 { b' ' } else { b }).collect();
                String::from_utf8_lossy(&cmd).into_owned()
            }
            // Process probably terminated
            Err(_) => UNKNOWN_FIELD.to_string(),
        }
    }

    fn parent_pid(&self, pid: u32) -> ParentPid {
        if !self.config.track_ppid {
            return ParentPid::Untracked;
        }

        self.source
            .read(pid, "stat", STAT_READ_LENGTH)
            .ok()
            .and_then(|stat| parse_ppid(&String::from_utf8_lossy(&stat)))
            .map_or(ParentPid::Unresolved, ParentPid::Known)
    }
}

/// Positive integer directory names are pids
pub fn parse_pid(name: &str) -> Option<u32> {
    name.parse::<u32>().ok().filter(|&pid| pid > 0)
}

/// Parent pid from a `/proc/<pid>/stat` record
pub fn parse_ppid(stat: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"\d+ \(.*\) [[:alpha:]] (\d+)").expect("ppid pattern is valid")
    });

    pattern.captures(stat)?.get(1)?.as_str().parse().ok()
}
