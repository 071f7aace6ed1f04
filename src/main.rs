use anyhow::{Context, Result};
use log::{error, warn};
use std::process::ExitCode;
use tokio::signal::unix::{signal, SignalKind};

use pspy::constants::EXIT_SETUP_FAILURE;
use pspy::fswatcher::inotify::max_user_watches;
use pspy::fswatcher::inotify::sys::LinuxInotify;
use pspy::fswatcher::{watch_ceiling, FsWatcher};
use pspy::output::ConsolePrinter;
use pspy::psscanner::procfs::Procfs;
use pspy::{cli, logging};

fn main() -> ExitCode {
    let config = match cli::parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            return ExitCode::from(EXIT_SETUP_FAILURE);
        }
    };

    if let Err(err) = logging::init(config.debug) {
        eprintln!("Error: installing logger: {}", err);
        return ExitCode::from(EXIT_SETUP_FAILURE);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Can't start async runtime: {}", err);
            return ExitCode::from(EXIT_SETUP_FAILURE);
        }
    };

    let result = runtime.block_on(async {
        let shutdown = shutdown_signal().context("Can't install signal handlers")?;

        let max_watches = match max_user_watches() {
            Ok(raw) => watch_ceiling(raw),
            Err(err) => {
                warn!("Can't get inotify watcher limit: {}", err);
                None
            }
        };

        let watcher = FsWatcher::new(Box::new(LinuxInotify), max_watches);
        let mut printer = ConsolePrinter::new(config.colored);
        pspy::pspy::run(&config, watcher, Box::new(Procfs::new()), &mut printer, shutdown).await
    });

    // A directory walk still running on a blocking thread must not delay exit
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(pspy::pspy::exit_code(&err))
        }
    }
}

/// Resolves with the name of the first termination signal received
fn shutdown_signal() -> Result<impl std::future::Future<Output = &'static str>> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(async move {
        tokio::select! {
            _ = hangup.recv() => "hangup",
            _ = interrupt.recv() => "interrupt",
            _ = terminate.recv() => "terminated",
            _ = quit.recv() => "quit",
        }
    })
}
