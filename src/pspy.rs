//! Orchestrator
//!
//! Wires the filesystem watcher to the process scanner and prints what both
//! report until shutdown:
//! 1. initialize watches while still honoring shutdown
//! 2. start the watcher and discard its startup noise for the drain window
//! 3. start the scanner on the watcher's trigger stream plus a periodic tick
//! 4. forward events to the sink until shutdown or a fatal queue error

use anyhow::{Context, Result};
use log::{debug, info};
use std::future::Future;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::constants::{EXIT_SETUP_FAILURE, EXIT_UNRECOVERABLE_READ};
use crate::fswatcher::inotify::EventSourceError;
use crate::fswatcher::{FsWatcher, InitHandle, Trigger, WatchStreams, WatcherError};
use crate::models::Config;
use crate::output::EventSink;
use crate::psscanner::procfs::ProcSource;
use crate::psscanner::{ProcessScanner, ScanError, ScanStreams, ScannerConfig};

/// Run the pipeline until `shutdown` resolves with the name of its cause
///
/// Returns an error when the event queue cannot be set up or becomes
/// unreadable; [`exit_code`] maps it to the process exit status.
pub async fn run<F, S>(
    config: &Config,
    watcher: FsWatcher,
    procs: Box<dyn ProcSource>,
    sink: &mut S,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = &'static str>,
    S: EventSink,
{
    info!("Config: {}", config);
    tokio::pin!(shutdown);

    let InitHandle {
        errors: mut init_errors,
        mut done,
    } = watcher.init(config.recursive_dirs.clone(), config.dirs.clone());

    let mut watcher = loop {
        tokio::select! {
            signal = &mut shutdown => {
                info!("Exiting program... ({})", signal);
                return Ok(());
            }
            Some(err) = init_errors.recv() => debug!("{}", err),
            joined = &mut done => {
                break joined
                    .context("inotify initialization task failed")?
                    .context("Can't set up inotify watchers")?;
            }
        }
    };
    while let Ok(err) = init_errors.try_recv() {
        debug!("{}", err);
    }
    info!("{}", watcher.summary());

    let WatchStreams {
        mut triggers,
        trigger_injector,
        events: mut fs_events,
        errors: fs_errors,
    } = watcher.run().context("Can't start inotify watcher")?;

    let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
    let fs_error_logger = tokio::spawn(log_watcher_errors(fs_errors, fatal_tx));

    // Watch registration itself generates events; none of them are interesting
    info!("Draining file system events due to startup...");
    let drain = time::sleep(config.drain_duration);
    tokio::pin!(drain);

    loop {
        tokio::select! {
            _ = &mut drain => break,
            signal = &mut shutdown => {
                info!("Exiting program... ({})", signal);
                fs_error_logger.abort();
                close_watcher(&mut watcher);
                return Ok(());
            }
            Some(err) = fatal_rx.recv() => {
                return Err(err).context("inotify event queue failed");
            }
            Some(_) = fs_events.recv() => {}
            Some(_) = triggers.recv() => {}
        }
    }
    info!("done");

    let scanner = ProcessScanner::new(
        procs,
        ScannerConfig {
            track_ppid: config.track_ppid,
            max_cmd_length: config.max_cmd_length,
        },
    );
    let ScanStreams {
        events: mut ps_events,
        errors: ps_errors,
    } = scanner.run(triggers).context("Can't set up procfs scanner")?;
    let ps_error_logger = tokio::spawn(log_scan_errors(ps_errors));
    let ticker = spawn_ticker(trigger_injector, config.scan_interval);

    let result = loop {
        tokio::select! {
            signal = &mut shutdown => {
                info!("Exiting program... ({})", signal);
                break Ok(());
            }
            Some(err) = fatal_rx.recv() => {
                break Err(err).context("inotify event queue failed");
            }
            Some(event) = fs_events.recv() => {
                if config.log_fs {
                    sink.fs_event(&event);
                }
            }
            Some(event) = ps_events.recv() => {
                if config.log_ps {
                    sink.process_event(&event);
                }
            }
        }
    };

    ticker.abort();
    fs_error_logger.abort();
    ps_error_logger.abort();
    close_watcher(&mut watcher);
    result
}

/// Exit status for an error returned by [`run`]
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<WatcherError>() {
        Some(WatcherError::Read(EventSourceError::Unrecoverable { .. })) => EXIT_UNRECOVERABLE_READ,
        _ => EXIT_SETUP_FAILURE,
    }
}

/// Inject a trigger every `interval` so scans happen even on a quiet filesystem
fn spawn_ticker(injector: mpsc::Sender<Trigger>, interval: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match injector.try_send(()) {
                // A pending trigger already covers this tick
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => return,
            }
        }
    })
}

async fn log_watcher_errors(
    mut errors: mpsc::Receiver<WatcherError>,
    fatal: mpsc::Sender<WatcherError>,
) {
    while let Some(err) = errors.recv().await {
        if err.is_fatal() {
            let _ = fatal.send(err).await;
            return;
        }
        debug!("{}", err);
    }
}

async fn log_scan_errors(mut errors: mpsc::Receiver<ScanError>) {
    while let Some(err) = errors.recv().await {
        debug!("ERROR refreshing process list: {}", err);
    }
}

fn close_watcher(watcher: &mut FsWatcher) {
    if let Err(err) = watcher.close() {
        debug!("{}", err);
    }
}
