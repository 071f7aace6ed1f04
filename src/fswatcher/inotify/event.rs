//! Binary layout of kernel inotify records
//!
//! Each record is a fixed 16 byte header in native byte order followed by
//! `len` bytes of NUL-padded name:
//!
//! | offset | width | field  |
//! |--------|-------|--------|
//! | 0      | 4     | wd     |
//! | 4      | 4     | mask   |
//! | 8      | 4     | cookie |
//! | 12     | 4     | len    |

/// Size of the fixed record header
pub const HEADER_SIZE: usize = 16;

/// Longest file name the kernel reports
pub const MAX_NAME_LEN: usize = 255;

/// Largest possible single record
pub const MAX_RECORD_SIZE: usize = HEADER_SIZE + MAX_NAME_LEN + 1;

/// One read fetches up to five maximal records
pub const READ_BUFFER_SIZE: usize = 5 * MAX_RECORD_SIZE;

/// Watch descriptor the kernel reports when its queue overflowed
pub const OVERFLOW_WD: i32 = -1;

const OP_NAMES: &[(u32, &str)] = &[
    (libc::IN_ACCESS, "ACCESS"),
    (libc::IN_ATTRIB, "ATTRIB"),
    (libc::IN_CLOSE_NOWRITE, "CLOSE_NOWRITE"),
    (libc::IN_CLOSE_WRITE, "CLOSE_WRITE"),
    (libc::IN_CREATE, "CREATE"),
    (libc::IN_DELETE, "DELETE"),
    (libc::IN_DELETE_SELF, "DELETE_SELF"),
    (libc::IN_MODIFY, "MODIFY"),
    (libc::IN_MOVED_FROM, "MOVED_FROM"),
    (libc::IN_MOVED_TO, "MOVED_TO"),
    (libc::IN_MOVE_SELF, "MOVE_SELF"),
    (libc::IN_OPEN, "OPEN"),
];

/// Fixed header of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub wd: i32,
    pub mask: u32,
    pub cookie: u32,
    pub len: u32,
}

impl RawHeader {
    /// Decode the header at the front of `buf`, `None` if it is too short
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let header = buf.get(..HEADER_SIZE)?;
        let field = |at: usize| -> [u8; 4] {
            [header[at], header[at + 1], header[at + 2], header[at + 3]]
        };

        Some(Self {
            wd: i32::from_ne_bytes(field(0)),
            mask: u32::from_ne_bytes(field(4)),
            cookie: u32::from_ne_bytes(field(8)),
            len: u32::from_ne_bytes(field(12)),
        })
    }

    /// Header plus name bytes
    pub fn record_len(&self) -> usize {
        HEADER_SIZE + self.len as usize
    }
}

/// Build a record the way the kernel lays it out, name padded with NULs to
/// a multiple of the header size
pub fn encode_record(wd: i32, mask: u32, cookie: u32, name: &str) -> Vec<u8> {
    let padded_len = if name.is_empty() {
        0
    } else {
        (name.len() + 1).div_ceil(HEADER_SIZE) * HEADER_SIZE
    };

    let mut record = Vec::with_capacity(HEADER_SIZE + padded_len);
    record.extend_from_slice(&wd.to_ne_bytes());
    record.extend_from_slice(&mask.to_ne_bytes());
    record.extend_from_slice(&cookie.to_ne_bytes());
    record.extend_from_slice(&(padded_len as u32).to_ne_bytes());
    record.extend_from_slice(name.as_bytes());
    record.resize(HEADER_SIZE + padded_len, 0);
    record
}

/// Symbolic name for an event mask; unknown combinations are rendered in binary
pub fn op_name(mask: u32) -> String {
    for &(bit, name) in OP_NAMES {
        if mask == bit {
            return name.to_string();
        }
        if mask == bit | libc::IN_ISDIR {
            return format!("{} DIR", name);
        }
    }
    format!("{:b}", mask)
}

/// Entry name with its NUL padding removed
pub fn trim_name(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
