//! pspy - Unprivileged Linux process and filesystem monitor
//!
//! This library exposes the watcher, scanner and orchestrator behind the
//! `pspy` binary.

pub mod cli;
pub mod config;
pub mod constants;
pub mod fswatcher;
pub mod logging;
pub mod models;
pub mod output;
pub mod psscanner;
pub mod pspy;
