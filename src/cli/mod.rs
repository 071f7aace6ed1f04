//! CLI argument parsing and validation module
//!
//! Handles command-line interface using clap, including:
//! - Which event kinds are printed and whether they are colored
//! - Recursive and flat watch directories
//! - Scan interval, drain window and command line truncation
//! - An optional TOML config file that explicit flags override

use anyhow::Result;
use clap::parser::ValueSource;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigFile;
use crate::constants::{
    DEFAULT_DRAIN_DURATION, DEFAULT_MAX_CMD_LENGTH, DEFAULT_RECURSIVE_DIRS, DEFAULT_SCAN_INTERVAL,
};
use crate::models::Config;

/// Build the command definition
pub fn build_command() -> Command {
    Command::new("pspy")
        .version(env!("PSPY_VERSION"))
        .long_version(concat!(env!("PSPY_VERSION"), " (", env!("GIT_HASH"), ")"))
        .about("Monitor Linux processes without root permissions")
        .long_about(
            "pspy monitors the system for file system events and new processes. \
             It prints these events to the console. File system events are monitored \
             with inotify. Processes are monitored by scanning /proc, using file system \
             events as triggers.",
        )
        .arg(bool_flag("procevents", 'p', "true", "Print new processes to stdout"))
        .arg(bool_flag("fsevents", 'f', "false", "Print file system events to stdout"))
        .arg(
            Arg::new("recursive_dirs")
                .short('r')
                .long("recursive_dirs")
                .value_name("DIR")
                .help("Directories to watch recursively")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .default_values(DEFAULT_RECURSIVE_DIRS.iter().copied()),
        )
        .arg(
            Arg::new("dirs")
                .short('d')
                .long("dirs")
                .value_name("DIR")
                .help("Directories to watch, without their subdirectories")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(bool_flag("color", 'c', "true", "Color the printed process events by owner"))
        .arg(
            Arg::new("ppid")
                .long("ppid")
                .help("Record the parent pid of each new process")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Print detailed error messages")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("MS")
                .help(format!(
                    "Scan the process table at least every MS milliseconds [default: {}]",
                    DEFAULT_SCAN_INTERVAL.as_millis()
                ))
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("drain")
                .long("drain")
                .value_name("MS")
                .help(format!(
                    "Discard file system events for MS milliseconds after startup [default: {}]",
                    DEFAULT_DRAIN_DURATION.as_millis()
                ))
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("truncate")
                .short('t')
                .long("truncate")
                .value_name("N")
                .help(format!(
                    "Truncate process command lines to N bytes [default: {}]",
                    DEFAULT_MAX_CMD_LENGTH
                ))
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Read settings from a TOML file; explicit flags take precedence")
                .value_parser(value_parser!(PathBuf)),
        )
}

/// `--name`, `--name=false` or `-x false`
fn bool_flag(name: &'static str, short: char, default: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .short(short)
        .long(name)
        .value_name("BOOL")
        .help(help)
        .num_args(0..=1)
        .default_value(default)
        .default_missing_value("true")
        .value_parser(value_parser!(bool))
        .action(ArgAction::Set)
}

/// Parse command line arguments and return configuration
pub fn parse_args() -> Result<Config> {
    config_from_matches(&build_command().get_matches())
}

/// Parse an explicit argument list, used by tests
pub fn parse_from<I, T>(args: I) -> Result<Config>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    config_from_matches(&build_command().try_get_matches_from(args)?)
}

/// Merge defaults, the optional config file and explicit flags, then validate
pub fn config_from_matches(matches: &ArgMatches) -> Result<Config> {
    let mut config = Config::default();

    if let Some(path) = matches.get_one::<PathBuf>("config") {
        ConfigFile::load_from_file(path)?.apply_to(&mut config);
    }

    if let Some(value) = explicit::<bool>(matches, "procevents") {
        config.log_ps = value;
    }
    if let Some(value) = explicit::<bool>(matches, "fsevents") {
        config.log_fs = value;
    }
    if let Some(value) = explicit::<bool>(matches, "color") {
        config.colored = value;
    }
    if let Some(dirs) = explicit_paths(matches, "recursive_dirs") {
        config.recursive_dirs = dirs;
    }
    if let Some(dirs) = explicit_paths(matches, "dirs") {
        config.dirs = dirs;
    }
    if matches.get_flag("ppid") {
        config.track_ppid = true;
    }
    if matches.get_flag("debug") {
        config.debug = true;
    }
    if let Some(ms) = explicit::<u64>(matches, "interval") {
        config.scan_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = explicit::<u64>(matches, "drain") {
        config.drain_duration = Duration::from_millis(ms);
    }
    if let Some(n) = explicit::<usize>(matches, "truncate") {
        config.max_cmd_length = n;
    }

    config.validate()?;
    Ok(config)
}

/// A value the user typed, as opposed to a clap default
fn explicit<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Option<T> {
    match matches.value_source(id) {
        Some(ValueSource::CommandLine) => matches.get_one::<T>(id).cloned(),
        _ => None,
    }
}

fn explicit_paths(matches: &ArgMatches, id: &str) -> Option<Vec<PathBuf>> {
    match matches.value_source(id) {
        Some(ValueSource::CommandLine) => {
            matches.get_many::<PathBuf>(id).map(|dirs| dirs.cloned().collect())
        }
        _ => None,
    }
}
