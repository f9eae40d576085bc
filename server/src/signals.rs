//! signal handling for the master and worker processes.
//!
//! `tokio::signal::unix` already implements the async-signal-safe self-pipe trick internally
//! (each [tokio::signal::unix::Signal] is backed by a dedicated pipe registered with
//! `signal-hook-registry`); each process here simply registers one against its own
//! freshly-built runtime after fork, which is exactly the "cooperative dispatch, no direct
//! scheduler-sensitive work in the handler" requirement this crate is built against.

use tokio::signal::unix::{SignalKind, signal};

/// the subset of process signals the master reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MasterSignal {
    /// graceful shutdown: stop accepting, let workers drain, then exit.
    Quit,
    /// hard shutdown: kill workers immediately.
    IntOrTerm,
    /// graceful worker bounce, master itself keeps running.
    Winch,
    /// bounce every worker (reload).
    Hup,
    /// scale up by one worker.
    Ttin,
    /// scale down by one worker.
    Ttou,
    /// reopen log files.
    Usr1,
    /// binary upgrade: fork+exec a replacement master inheriting the listen socket.
    Usr2,
    /// a child exited; reap it.
    Chld,
}

pub(crate) struct MasterSignals {
    quit: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
    term: tokio::signal::unix::Signal,
    winch: tokio::signal::unix::Signal,
    hup: tokio::signal::unix::Signal,
    ttin: tokio::signal::unix::Signal,
    ttou: tokio::signal::unix::Signal,
    usr1: tokio::signal::unix::Signal,
    usr2: tokio::signal::unix::Signal,
    chld: tokio::signal::unix::Signal,
}

impl MasterSignals {
    pub(crate) fn start() -> std::io::Result<Self> {
        Ok(Self {
            quit: signal(SignalKind::quit())?,
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
            winch: signal(SignalKind::window_change())?,
            hup: signal(SignalKind::hangup())?,
            ttin: signal(SignalKind::from_raw(libc::SIGTTIN))?,
            ttou: signal(SignalKind::from_raw(libc::SIGTTOU))?,
            usr1: signal(SignalKind::user_defined1())?,
            usr2: signal(SignalKind::user_defined2())?,
            chld: signal(SignalKind::from_raw(libc::SIGCHLD))?,
        })
    }

    pub(crate) async fn recv(&mut self) -> MasterSignal {
        tokio::select! {
            _ = self.quit.recv() => MasterSignal::Quit,
            _ = self.int.recv() => MasterSignal::IntOrTerm,
            _ = self.term.recv() => MasterSignal::IntOrTerm,
            _ = self.winch.recv() => MasterSignal::Winch,
            _ = self.hup.recv() => MasterSignal::Hup,
            _ = self.ttin.recv() => MasterSignal::Ttin,
            _ = self.ttou.recv() => MasterSignal::Ttou,
            _ = self.usr1.recv() => MasterSignal::Usr1,
            _ = self.usr2.recv() => MasterSignal::Usr2,
            _ = self.chld.recv() => MasterSignal::Chld,
        }
    }
}

/// the subset of process signals a worker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerSignal {
    /// graceful: stop accepting, drain in-flight connections, exit.
    Quit,
    /// immediate exit.
    IntOrTerm,
    /// reopen log files.
    Usr1,
}

pub(crate) struct WorkerSignals {
    quit: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
    term: tokio::signal::unix::Signal,
    usr1: tokio::signal::unix::Signal,
}

impl WorkerSignals {
    pub(crate) fn start() -> std::io::Result<Self> {
        Ok(Self {
            quit: signal(SignalKind::quit())?,
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
            usr1: signal(SignalKind::user_defined1())?,
        })
    }

    pub(crate) async fn recv(&mut self) -> WorkerSignal {
        tokio::select! {
            _ = self.quit.recv() => WorkerSignal::Quit,
            _ = self.int.recv() => WorkerSignal::IntOrTerm,
            _ = self.term.recv() => WorkerSignal::IntOrTerm,
            _ = self.usr1.recv() => WorkerSignal::Usr1,
        }
    }
}
