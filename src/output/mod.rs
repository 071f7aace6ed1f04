//! Output formatting module
//!
//! Handles:
//! - Timestamped `CMD:` and `FS:` event lines
//! - Per-owner coloring of process lines

use chrono::{DateTime, Local};
use owo_colors::{AnsiColors, OwoColorize};
use std::io::{self, Write};

use crate::models::{FsEvent, ProcessEvent};

/// Timestamp layout prefixed to every event line
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Number of distinct colors process lines are spread over
const COLOR_COUNT: u32 = 6;

/// Destination for the events the orchestrator prints
pub trait EventSink: Send {
    fn fs_event(&mut self, event: &FsEvent);
    fn process_event(&mut self, event: &ProcessEvent);
}

/// Writes event lines to stdout
#[derive(Debug, Clone, Copy)]
pub struct ConsolePrinter {
    colored: bool,
}

impl ConsolePrinter {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    fn emit(&self, line: &str) {
        let mut stdout = io::stdout().lock();
        // A closed stdout leaves nothing useful to report to
        let _ = writeln!(stdout, "{}", line);
    }
}

impl EventSink for ConsolePrinter {
    fn fs_event(&mut self, event: &FsEvent) {
        self.emit(&format_fs_line(&Local::now(), event));
    }

    fn process_event(&mut self, event: &ProcessEvent) {
        self.emit(&format_process_line(&Local::now(), event, self.colored));
    }
}

/// `2024/01/31 12:00:00 FS: CREATE               | /tmp/x`
pub fn format_fs_line(at: &DateTime<Local>, event: &FsEvent) -> String {
    format!("{} FS: {}", at.format(TIMESTAMP_FORMAT), event)
}

/// `2024/01/31 12:00:00 CMD: UID=0     PID=1      | /sbin/init`, wrapped in
/// the owner's color when `colored` is set
pub fn format_process_line(at: &DateTime<Local>, event: &ProcessEvent, colored: bool) -> String {
    let body = format!("CMD: {}", event);
    let body = if colored {
        colorize(&body, color_for_uid(event.uid))
    } else {
        body
    };
    format!("{} {}", at.format(TIMESTAMP_FORMAT), body)
}

/// Stable color index in `1..=6` derived from the uid's decimal text.
/// Unknown owners hash as `-1`.
pub fn color_for_uid(uid: Option<u32>) -> u8 {
    let text = uid.map_or_else(|| "-1".to_string(), |uid| uid.to_string());
    (fnv1a(text.as_bytes()) % COLOR_COUNT + 1) as u8
}

/// Terminal color for an index from [`color_for_uid`]
pub fn ansi_color(index: u8) -> AnsiColors {
    match index {
        1 => AnsiColors::Red,
        2 => AnsiColors::Green,
        3 => AnsiColors::Yellow,
        4 => AnsiColors::Blue,
        5 => AnsiColors::Magenta,
        6 => AnsiColors::Cyan,
        _ => AnsiColors::Default,
    }
}

/// Bold foreground color
pub fn colorize(text: &str, color: u8) -> String {
    text.color(ansi_color(color)).bold().to_string()
}

fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 2_166_136_261;
    const PRIME: u32 = 16_777_619;

    bytes
        .iter()
        .fold(OFFSET_BASIS, |hash, &b| (hash ^ u32::from(b)).wrapping_mul(PRIME))
}
