//! Configuration file support
//!
//! Handles TOML configuration parsing. Every field is optional; values found
//! in the file replace the built-in defaults and are in turn overridden by
//! flags given explicitly on the command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{Config, ConfigError};

/// Top-level layout of a config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub watch: WatchSettings,
    pub output: OutputSettings,
    pub scan: ScanSettings,
}

/// Which directories get inotify watches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchSettings {
    pub recursive_dirs: Option<Vec<PathBuf>>,
    pub dirs: Option<Vec<PathBuf>>,
    /// Startup drain window in milliseconds
    pub drain_ms: Option<u64>,
}

/// What gets printed and how
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    pub process_events: Option<bool>,
    pub fs_events: Option<bool>,
    pub color: Option<bool>,
    pub debug: Option<bool>,
}

/// Process scanner tuning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSettings {
    /// Steady-state trigger interval in milliseconds
    pub interval_ms: Option<u64>,
    pub ppid: Option<bool>,
    pub truncate: Option<usize>,
}

impl ConfigFile {
    /// Load and parse a config file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overlay the values present in the file onto `config`
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(dirs) = &self.watch.recursive_dirs {
            config.recursive_dirs = dirs.clone();
        }
        if let Some(dirs) = &self.watch.dirs {
            config.dirs = dirs.clone();
        }
        if let Some(ms) = self.watch.drain_ms {
            config.drain_duration = Duration::from_millis(ms);
        }

        if let Some(value) = self.output.process_events {
            config.log_ps = value;
        }
        if let Some(value) = self.output.fs_events {
            config.log_fs = value;
        }
        if let Some(value) = self.output.color {
            config.colored = value;
        }
        if let Some(value) = self.output.debug {
            config.debug = value;
        }

        if let Some(ms) = self.scan.interval_ms {
            config.scan_interval = Duration::from_millis(ms);
        }
        if let Some(value) = self.scan.ppid {
            config.track_ppid = value;
        }
        if let Some(value) = self.scan.truncate {
            config.max_cmd_length = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_keeps_defaults() {
        let file = ConfigFile::parse("").unwrap();
        let mut config = Config::default();
        file.apply_to(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_full_file_overrides_defaults() {
        let file = ConfigFile::parse(
            r#"
[watch]
recursive_dirs = ["/srv"]
dirs = ["/root"]
drain_ms = 250

[output]
process_events = false
fs_events = true
color = false

[scan]
interval_ms = 500
ppid = true
truncate = 64
"#,
        )
        .unwrap();

        let mut config = Config::default();
        file.apply_to(&mut config);

        assert_eq!(config.recursive_dirs, vec![PathBuf::from("/srv")]);
        assert_eq!(config.dirs, vec![PathBuf::from("/root")]);
        assert_eq!(config.drain_duration, Duration::from_millis(250));
        assert!(!config.log_ps);
        assert!(config.log_fs);
        assert!(!config.colored);
        assert_eq!(config.scan_interval, Duration::from_millis(500));
        assert!(config.track_ppid);
        assert_eq!(config.max_cmd_length, 64);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(ConfigFile::parse("[scan]\nspeed = 3\n").is_err());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = ConfigFile::load_from_file(Path::new("/nonexistent/pspy.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pspy.toml"));
    }
}
