//! Console backend for the `log` facade
//!
//! Informational lines go to stdout unadorned, everything else to stderr.
//! Debug records carry the transient errors of the pipeline and are only
//! printed when requested.

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy)]
pub struct ConsoleLogger {
    max_level: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(debug: bool) -> Self {
        let max_level = if debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };
        Self { max_level }
    }

    pub fn max_level(&self) -> LevelFilter {
        self.max_level
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let _ = match record.level() {
            Level::Info => writeln!(io::stdout().lock(), "{}", record.args()),
            _ => writeln!(io::stderr().lock(), "{}", format_stderr(record)),
        };
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
    }
}

fn format_stderr(record: &Record) -> String {
    match record.level() {
        Level::Error => format!("ERROR: {}", record.args()),
        Level::Warn => format!("WARNING: {}", record.args()),
        _ => format!("{}", record.args()),
    }
}

/// Install the console logger as the global `log` backend
pub fn init(debug: bool) -> Result<(), SetLoggerError> {
    let logger = ConsoleLogger::new(debug);
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(logger.max_level());
    Ok(())
}
