//! a worker process: owns one [Acceptor](crate::acceptor::Acceptor), touches its heartbeat
//! file on an interval, and reacts to the worker signal table.

use std::{net::TcpListener as StdTcpListener, os::fd::RawFd, path::PathBuf, rc::Rc, time::Duration};

use feather_http::{
    RequestBody, Response,
    bytes::Bytes,
    http::{Request, RequestExt},
};
use feather_io::net::Listener;
use feather_service::Service;
use futures_core::Stream;
use tracing::{info, warn};

use crate::{
    acceptor::Acceptor,
    config::WorkerConfig,
    control::{ControlDir, heartbeat_touch, report_ready, write_pid_file},
    signals::{WorkerSignal, WorkerSignals},
};

/// runs in the freshly-forked child process. never returns under normal operation; the process
/// exits once shutdown completes. `ready_fd` is `Some` only for the original startup batch —
/// a worker spawned later by a scale-up or crash-revival has no readiness pipe to report to,
/// the master having already moved past that one-time handshake.
pub fn worker_main<S, ResB, BE>(
    wid: usize,
    listener: StdTcpListener,
    app: Rc<S>,
    config: WorkerConfig,
    heartbeat_interval: Duration,
    ready_fd: Option<RawFd>,
    control: &ControlDir,
) where
    S: Service<Request<RequestExt<RequestBody>>, Response = Response<ResB>> + 'static,
    ResB: Stream<Item = Result<Bytes, BE>> + 'static,
    BE: 'static,
{
    let pid = std::process::id() as i32;
    write_pid_file(&control.worker_pid_path(wid), pid).ok();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build worker runtime");

    let local = tokio::task::LocalSet::new();
    let heartbeat_path = control.heartbeat_path(wid);
    let lock_path = control.lock_path();

    local.block_on(&rt, async move {
        listener.set_nonblocking(true).expect("failed to set listener non-blocking");
        let listener = Listener::Tcp(
            tokio::net::TcpListener::from_std(listener).expect("failed to adopt inherited listener"),
        );

        let acceptor = Acceptor::new(listener, app, config.max_connections, config.http);

        if let Some(fd) = ready_fd {
            if let Err(e) = report_ready(&lock_path, fd, pid) {
                warn!(worker = wid, error = %e, "failed to report readiness to master");
            }
        }

        run_worker(wid, acceptor, heartbeat_path, heartbeat_interval).await;
    });
}

async fn run_worker<S, ResB, BE, const H: usize, const R: usize, const W: usize>(
    wid: usize,
    acceptor: Rc<Acceptor<S, ResB, BE, H, R, W>>,
    heartbeat_path: PathBuf,
    heartbeat_interval: Duration,
) where
    S: Service<Request<RequestExt<RequestBody>>, Response = Response<ResB>> + 'static,
    ResB: Stream<Item = Result<Bytes, BE>> + 'static,
    BE: 'static,
{
    let accept_task = tokio::task::spawn_local(acceptor.clone().run());

    let heartbeat_task = tokio::task::spawn_local({
        let heartbeat_path = heartbeat_path.clone();
        async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            loop {
                interval.tick().await;
                if let Err(e) = heartbeat_touch(&heartbeat_path) {
                    warn!(worker = wid, error = %e, "failed to touch heartbeat file");
                }
            }
        }
    });

    let mut signals = match WorkerSignals::start() {
        Ok(s) => s,
        Err(e) => {
            warn!(worker = wid, error = %e, "failed to install signal handlers");
            accept_task.await.ok();
            return;
        }
    };

    loop {
        match signals.recv().await {
            WorkerSignal::Quit => {
                info!(worker = wid, "received SIGQUIT, draining connections");
                acceptor.shutdown().await;
                break;
            }
            WorkerSignal::IntOrTerm => {
                info!(worker = wid, "received SIGINT/SIGTERM, exiting immediately");
                std::process::exit(1);
            }
            WorkerSignal::Usr1 => {
                info!(worker = wid, "received SIGUSR1, reopen-log hook fired");
                // application-defined log-rotation hook would be invoked here; this platform
                // has no log files of its own to reopen beyond what `tracing_subscriber` owns.
            }
        }
    }

    heartbeat_task.abort();
    accept_task.abort();
    info!(worker = wid, "worker exiting");
}
