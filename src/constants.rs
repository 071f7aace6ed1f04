//! Global constants for pspy
//!
//! Centralized location for procfs paths, defaults and exit codes

use std::time::Duration;

/// Root of the process filesystem
pub const PROC_ROOT: &str = "/proc";

/// Kernel-exposed ceiling on concurrent inotify watches per user
pub const MAX_USER_WATCHES_PATH: &str = "/proc/sys/fs/inotify/max_user_watches";

/// Directories watched recursively when none are given
pub const DEFAULT_RECURSIVE_DIRS: &[&str] = &["/usr", "/tmp", "/etc", "/home", "/var", "/opt"];

/// Steady-state trigger interval
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(100);

/// Startup window during which watch-registration noise is discarded
pub const DEFAULT_DRAIN_DURATION: Duration = Duration::from_millis(1000);

/// Command lines longer than this are cut
pub const DEFAULT_MAX_CMD_LENGTH: usize = 2048;

/// Only the head of /proc/<pid>/stat is needed to find the parent pid
pub const STAT_READ_LENGTH: usize = 512;

/// Placeholder for unreadable command lines and owners
pub const UNKNOWN_FIELD: &str = "???";

/// Consecutive EINVAL reads tolerated before the event queue is considered broken
pub const EINVAL_RETRY_LIMIT: usize = 20;

/// Exit code when the event queue cannot be opened
pub const EXIT_SETUP_FAILURE: u8 = 1;

/// Exit code when the event queue keeps failing with EINVAL
pub const EXIT_UNRECOVERABLE_READ: u8 = 22;
