use std::fs;
use std::os::unix::fs::MetadataExt;
use tempfile::TempDir;

use pspy::models::{ParentPid, ProcessEvent};
use pspy::psscanner::procfs::Procfs;
use pspy::psscanner::{ProcessScanner, ScannerConfig};

/// Lay out a procfs-shaped tree: one directory per pid with cmdline and stat
fn fake_proc(processes: &[(u32, &[u8], &str)]) -> TempDir {
    let root = TempDir::new().unwrap();
    for (pid, cmdline, stat) in processes {
        let dir = root.path().join(pid.to_string());
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("cmdline"), cmdline).unwrap();
        fs::write(dir.join("stat"), stat).unwrap();
    }
    fs::create_dir(root.path().join("self")).unwrap();
    fs::write(root.path().join("uptime"), "1.0 1.0").unwrap();
    root
}

fn scan(scanner: &mut ProcessScanner) -> Vec<ProcessEvent> {
    let mut events = Vec::new();
    scanner.refresh(&mut |e| events.push(e)).unwrap();
    events
}

#[test]
fn test_scan_of_procfs_tree() {
    let root = fake_proc(&[
        (1, &b"/sbin/init\0splash\0"[..], "1 (init) S 0 1 1"),
        (10, &b""[..], "10 (kthreadd) S 2 0 0"),
        (9, &b"sleep\x0030\0"[..], "9 (sleep) S 1 9 9"),
    ]);
    let uid = fs::metadata(root.path().join("1")).unwrap().uid();
    let mut scanner = ProcessScanner::new(
        Box::new(Procfs::with_root(root.path())),
        ScannerConfig {
            track_ppid: true,
            max_cmd_length: 2048,
        },
    );

    let events = scan(&mut scanner);

    let pids: Vec<u32> = events.iter().map(|e| e.pid).collect();
    assert_eq!(pids, vec![10, 9, 1]);
    assert_eq!(
        events[2],
        ProcessEvent {
            uid: Some(uid),
            pid: 1,
            ppid: ParentPid::Known(0),
            cmd: "/sbin/init splash ".to_string(),
        }
    );
    assert_eq!(events[0].cmd, "");
    assert_eq!(events[1].ppid, ParentPid::Known(1));
}

#[test]
fn test_only_new_directories_reported() {
    let root = fake_proc(&[(1, &b"init\0"[..], "1 (init) S 0")]);
    let mut scanner = ProcessScanner::new(
        Box::new(Procfs::with_root(root.path())),
        ScannerConfig {
            track_ppid: false,
            max_cmd_length: 2048,
        },
    );
    assert_eq!(scan(&mut scanner).len(), 1);

    let dir = root.path().join("300");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("cmdline"), b"bash\0-c\0id\0").unwrap();

    let events = scan(&mut scanner);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].pid, 300);
    assert_eq!(events[0].cmd, "bash -c id ");
}

#[test]
fn test_vanished_process_reported_with_placeholders() {
    let root = fake_proc(&[]);
    fs::create_dir(root.path().join("55")).unwrap();
    let mut scanner = ProcessScanner::new(
        Box::new(Procfs::with_root(root.path())),
        ScannerConfig {
            track_ppid: true,
            max_cmd_length: 2048,
        },
    );

    let events = scan(&mut scanner);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].cmd, "???");
    assert_eq!(events[0].ppid, ParentPid::Unresolved);
}
