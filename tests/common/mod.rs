#![allow(dead_code)]

use nix::errno::Errno;
use std::collections::BTreeMap;
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pspy::fswatcher::inotify::sys::InotifySys;
use pspy::models::{FsEvent, ProcessEvent};
use pspy::output::EventSink;
use pspy::psscanner::procfs::ProcSource;

/// Inotify stand-in whose reads are fed by the test
pub struct ScriptedInotify {
    fail_init: bool,
    watch_delay: Duration,
    reads: Mutex<mpsc::Receiver<nix::Result<Vec<u8>>>>,
    watched: Arc<Mutex<Vec<PathBuf>>>,
}

/// Test side of a [`ScriptedInotify`]
#[derive(Clone)]
pub struct InotifyScript {
    reads: mpsc::Sender<nix::Result<Vec<u8>>>,
    watched: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedInotify {
    pub fn new() -> (Self, InotifyScript) {
        let (tx, rx) = mpsc::channel();
        let watched = Arc::new(Mutex::new(Vec::new()));
        let sys = Self {
            fail_init: false,
            watch_delay: Duration::ZERO,
            reads: Mutex::new(rx),
            watched: Arc::clone(&watched),
        };
        (sys, InotifyScript { reads: tx, watched })
    }

    pub fn failing() -> Self {
        let (mut sys, _) = Self::new();
        sys.fail_init = true;
        sys
    }

    /// Every watch registration takes `delay`
    pub fn slow(delay: Duration) -> (Self, InotifyScript) {
        let (mut sys, script) = Self::new();
        sys.watch_delay = delay;
        (sys, script)
    }
}

impl InotifySys for ScriptedInotify {
    fn init(&self) -> nix::Result<RawFd> {
        if self.fail_init {
            Err(Errno::EMFILE)
        } else {
            Ok(7)
        }
    }

    /// Watch descriptors are 1-based registration order
    fn add_watch(&self, _fd: RawFd, path: &Path) -> nix::Result<i32> {
        std::thread::sleep(self.watch_delay);
        let mut watched = self.watched.lock().unwrap();
        watched.push(path.to_path_buf());
        Ok(watched.len() as i32)
    }

    fn read(&self, _fd: RawFd, buf: &mut [u8]) -> nix::Result<usize> {
        let next = self.reads.lock().unwrap().recv();
        match next {
            Ok(Ok(bytes)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Ok(Err(errno)) => Err(errno),
            // Script dropped: behave like a quiet queue forever
            Err(_) => loop {
                std::thread::park();
            },
        }
    }

    fn close(&self, _fd: RawFd) -> nix::Result<()> {
        Ok(())
    }
}

impl InotifyScript {
    pub fn deliver(&self, bytes: Vec<u8>) {
        self.reads.send(Ok(bytes)).unwrap();
    }

    pub fn fail(&self, errno: Errno) {
        self.reads.send(Err(errno)).unwrap();
    }

    /// Watch descriptor assigned to `path`
    pub fn wd_of(&self, path: &Path) -> i32 {
        let watched = self.watched.lock().unwrap();
        let index = watched.iter().position(|p| p == path).expect("path is watched");
        index as i32 + 1
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        self.watched.lock().unwrap().clone()
    }
}

/// In-memory process table: pid -> (uid, cmdline)
#[derive(Clone, Default)]
pub struct FakeProc {
    processes: Arc<Mutex<BTreeMap<u32, (u32, String)>>>,
}

impl FakeProc {
    pub fn spawn(&self, pid: u32, uid: u32, cmd: &str) {
        self.processes.lock().unwrap().insert(pid, (uid, cmd.to_string()));
    }
}

impl ProcSource for FakeProc {
    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.processes.lock().unwrap().keys().map(u32::to_string).collect())
    }

    fn read(&self, pid: u32, file: &str, max_len: usize) -> io::Result<Vec<u8>> {
        let processes = self.processes.lock().unwrap();
        let (_, cmd) = processes.get(&pid).ok_or(io::ErrorKind::NotFound)?;
        match file {
            "cmdline" => Ok(cmd.bytes().take(max_len).collect()),
            _ => Err(io::ErrorKind::NotFound.into()),
        }
    }

    fn owner(&self, pid: u32) -> io::Result<u32> {
        let processes = self.processes.lock().unwrap();
        processes
            .get(&pid)
            .map(|(uid, _)| *uid)
            .ok_or_else(|| io::ErrorKind::NotFound.into())
    }
}

/// Records every printed line without timestamps
#[derive(Clone, Default)]
pub struct CollectingSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CollectingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// Poll until a line satisfies `pred`, giving up after `timeout`
    pub async fn wait_for(&self, timeout: Duration, pred: impl Fn(&str) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.lines().iter().any(|line| pred(line)) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl EventSink for CollectingSink {
    fn fs_event(&mut self, event: &FsEvent) {
        self.lines.lock().unwrap().push(format!("FS: {}", event));
    }

    fn process_event(&mut self, event: &ProcessEvent) {
        self.lines.lock().unwrap().push(format!("CMD: {}", event));
    }
}
