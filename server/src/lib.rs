//! Pre-forking master/worker supervisor on top of [feather_http]'s HTTP/1.1 pipeline.
//!
//! One master process owns the listening socket and forks a fixed number of worker
//! processes, each running its own single-threaded cooperative runtime. Workers accept
//! connections directly off the shared socket; the master's job is limited to lifecycle:
//! forking, signal fan-out, heartbeat-based liveness checking, and zero-downtime binary
//! upgrade.

#![feature(type_alias_impl_trait)]

mod acceptor;
mod conn;
mod config;
mod control;
mod signals;
mod supervisor;
mod worker;

pub use config::{SupervisorConfig, WorkerConfig};
pub use supervisor::Supervisor;
pub use worker::worker_main;

#[cfg(unix)]
pub(crate) const LISTEN_FD_VAR: &str = "FEATHER_LISTEN_FD";
#[cfg(unix)]
pub(crate) const DEPTH_VAR: &str = "FEATHER_DEPTH";
#[cfg(unix)]
pub(crate) const DAEMON_VAR: &str = "DAEMON";
