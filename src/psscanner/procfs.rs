//! Access to the process filesystem behind a capability trait

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;

use crate::constants::PROC_ROOT;

/// The procfs reads a scanner needs
pub trait ProcSource: Send {
    /// Names of the directories in the process table, in listing order
    fn list(&self) -> io::Result<Vec<String>>;

    /// At most `max_len` bytes of `/proc/<pid>/<file>`
    fn read(&self, pid: u32, file: &str, max_len: usize) -> io::Result<Vec<u8>>;

    /// Uid owning `/proc/<pid>`
    fn owner(&self, pid: u32) -> io::Result<u32>;
}

/// procfs mounted at a configurable root
#[derive(Debug, Clone)]
pub struct Procfs {
    root: PathBuf,
}

impl Procfs {
    pub fn new() -> Self {
        Self::with_root(PROC_ROOT)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }
}

impl Default for Procfs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcSource for Procfs {
    /// Directory names ordered by numeric value, so the newest pids come last
    fn list(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();

        names.sort_by_key(|name| (name.parse::<u64>().ok(), name.clone()));
        Ok(names)
    }

    fn read(&self, pid: u32, file: &str, max_len: usize) -> io::Result<Vec<u8>> {
        let file = File::open(self.pid_dir(pid).join(file))?;
        let mut buf = Vec::with_capacity(max_len.min(4096));
        file.take(max_len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn owner(&self, pid: u32) -> io::Result<u32> {
        let stat = nix::sys::stat::lstat(&self.pid_dir(pid))?;
        Ok(stat.st_uid)
    }
}
