//! the master process: owns the listening socket, forks [WorkerConfig::max_connections]-bounded
//! worker processes, and reacts to the signal table operators use to drive the cluster (scale,
//! reload, graceful shutdown, binary upgrade).
//!
//! the master does no request handling of its own; see [crate::acceptor::Acceptor] and
//! [crate::worker::worker_main] for the per-worker accept loop this hands sockets off to.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    io,
    marker::PhantomData,
    net::TcpListener as StdTcpListener,
    os::fd::{AsRawFd, FromRawFd, IntoRawFd, RawFd},
    os::unix::process::CommandExt,
    rc::Rc,
};

use feather_http::{
    RequestBody, Response,
    bytes::Bytes,
    http::{Request, RequestExt},
};
use feather_service::Service;
use futures_core::Stream;
use nix::{
    fcntl::{FcntlArg, FdFlag, fcntl},
    sys::signal::{Signal, kill},
    sys::wait::{WaitPidFlag, WaitStatus, waitpid},
    unistd::{ForkResult, Pid, fork},
};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{error, info, warn};

use crate::{
    config::SupervisorConfig,
    control::{ControlDir, create_notify_fifo, heartbeat_is_stale, heartbeat_touch, signal_ready, write_pid_file},
    signals::{MasterSignal, MasterSignals},
    worker,
};

/// double-forks into a new session, detached from the controlling terminal, unless
/// `DAEMON=yes` is already set — the marker a re-exec'd binary upgrade child inherits to avoid
/// daemonizing a second time.
fn daemonize_if_requested() -> io::Result<()> {
    if std::env::var(crate::DAEMON_VAR).as_deref() == Ok("yes") {
        return Ok(());
    }

    // SAFETY: called before any worker is forked and before the tokio runtime is built, so
    // there is exactly one thread alive to duplicate.
    unsafe {
        if let ForkResult::Parent { .. } = fork().map_err(|e| io::Error::from_raw_os_error(e as i32))? {
            std::process::exit(0);
        }
    }
    nix::unistd::setsid().map_err(|e| io::Error::from_raw_os_error(e as i32))?;
    unsafe {
        if let ForkResult::Parent { .. } = fork().map_err(|e| io::Error::from_raw_os_error(e as i32))? {
            std::process::exit(0);
        }
    }

    std::env::set_current_dir("/")?;
    redirect_std_fds_to_dev_null()?;
    // SAFETY: single-threaded at this point, same as the forks above.
    unsafe { std::env::set_var(crate::DAEMON_VAR, "yes") };
    Ok(())
}

fn redirect_std_fds_to_dev_null() -> io::Result<()> {
    let dev_null = fs_open_dev_null()?;
    let fd = dev_null.as_raw_fd();
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(fd, target) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn fs_open_dev_null() -> io::Result<std::fs::File> {
    std::fs::OpenOptions::new().read(true).write(true).open("/dev/null")
}

pub struct Supervisor<S, ResB, BE> {
    listener: StdTcpListener,
    app: Rc<S>,
    config: SupervisorConfig,
    control: ControlDir,
    depth: u32,
    workers: RefCell<HashMap<usize, Pid>>,
    do_not_revive: RefCell<HashSet<Pid>>,
    die_with_last_worker: Cell<bool>,
    _marker: PhantomData<(ResB, BE)>,
}

impl<S, ResB, BE> Supervisor<S, ResB, BE>
where
    S: Service<Request<RequestExt<RequestBody>>, Response = Response<ResB>> + 'static,
    ResB: Stream<Item = Result<Bytes, BE>> + 'static,
    BE: 'static,
{
    /// binds `addr`, unless `FEATHER_LISTEN_FD` is set in the environment — in which case the
    /// listener is reconstructed from the inherited descriptor, the continuation of a binary
    /// upgrade started by a previous master via [Self::exec_upgrade].
    pub fn bind(cluster: impl Into<String>, addr: std::net::SocketAddr, app: S, config: SupervisorConfig) -> io::Result<Self> {
        let listener = match std::env::var(crate::LISTEN_FD_VAR).ok().and_then(|v| v.parse::<i32>().ok()) {
            // SAFETY: the fd named by FEATHER_LISTEN_FD was handed to us by a parent master that
            // cleared its close-on-exec flag specifically so we could adopt it here.
            Some(fd) => unsafe { StdTcpListener::from_raw_fd(fd) },
            None => Self::bind_reuseable(addr, config.backlog)?,
        };
        listener.set_nonblocking(true)?;

        let depth = std::env::var(crate::DEPTH_VAR).ok().and_then(|v| v.parse().ok()).unwrap_or(0);
        let control = ControlDir::new(&cluster.into(), depth);
        control.create()?;

        Ok(Self {
            listener,
            app: Rc::new(app),
            die_with_last_worker: Cell::new(config.die_with_last_worker),
            config,
            control,
            depth,
            workers: RefCell::new(HashMap::new()),
            do_not_revive: RefCell::new(HashSet::new()),
            _marker: PhantomData,
        })
    }

    /// forks the initial worker pool and runs the master signal loop until a shutdown signal
    /// (or a fatal error) ends it. never returns under normal graceful-reload operation.
    pub fn run(self) -> io::Result<()> {
        daemonize_if_requested()?;

        write_pid_file(&self.control.master_pid_path(), std::process::id() as i32)?;
        create_notify_fifo(&self.control.notify_path())?;

        let (ready_read, ready_write) = nix::unistd::pipe().map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        let ready_write_fd = ready_write.into_raw_fd();

        for wid in 0..self.config.worker_count {
            self.spawn_worker(wid, Some(ready_write_fd))?;
        }
        // our copy of the write end; every worker inherited its own across `fork`.
        drop(unsafe { std::fs::File::from_raw_fd(ready_write_fd) });

        let mut reported = vec![0u8; self.config.worker_count * 4];
        {
            use std::io::Read;
            let mut f = std::fs::File::from(ready_read);
            f.read_exact(&mut reported)?;
        }
        signal_ready(&self.control.notify_path());

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let local = tokio::task::LocalSet::new();
        local.block_on(&rt, self.event_loop());
        Ok(())
    }

    async fn event_loop(&self) {
        let mut signals = match MasterSignals::start() {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install master signal handlers");
                return;
            }
        };
        let mut zombie_sweep = tokio::time::interval(self.config.zombie_sweep_interval);
        let mut health_check = tokio::time::interval(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                sig = signals.recv() => self.handle_signal(sig),
                _ = zombie_sweep.tick() => self.reap_exited(),
                _ = health_check.tick() => self.check_heartbeats(),
            }
        }
    }

    fn handle_signal(&self, sig: MasterSignal) {
        match sig {
            MasterSignal::Quit => {
                info!("received SIGQUIT, shutting down cluster");
                self.mark_all_do_not_revive();
                self.die_with_last_worker.set(true);
                self.signal_all(Signal::SIGQUIT);
                self.exit_if_drained();
            }
            MasterSignal::IntOrTerm => {
                info!("received SIGINT/SIGTERM, killing cluster");
                self.mark_all_do_not_revive();
                self.die_with_last_worker.set(true);
                self.signal_all(Signal::SIGKILL);
                self.exit_if_drained();
            }
            MasterSignal::Winch => {
                info!("received SIGWINCH, stopping workers (master stays up)");
                self.mark_all_do_not_revive();
                self.die_with_last_worker.set(false);
                self.signal_all(Signal::SIGQUIT);
            }
            MasterSignal::Hup => {
                info!("received SIGHUP, bouncing all workers");
                // a graceful SIGQUIT to each worker drains it, and the normal SIGCHLD path
                // below respawns every wid that isn't in `do_not_revive` — which none are here.
                self.signal_all(Signal::SIGQUIT);
            }
            MasterSignal::Ttin => {
                let next = self.workers.borrow().keys().copied().max().map_or(0, |m| m + 1);
                info!(wid = next, "received SIGTTIN, scaling up");
                if let Err(e) = self.spawn_worker(next, None) {
                    warn!(error = %e, "failed to spawn additional worker");
                }
            }
            MasterSignal::Ttou => {
                let highest = self.workers.borrow().iter().max_by_key(|(&wid, _)| wid).map(|(&wid, &pid)| (wid, pid));
                if let Some((wid, pid)) = highest {
                    info!(wid, "received SIGTTOU, scaling down");
                    self.do_not_revive.borrow_mut().insert(pid);
                    let _ = kill(pid, Signal::SIGQUIT);
                }
            }
            MasterSignal::Usr1 => {
                info!("received SIGUSR1, forwarding reopen-log signal to workers");
                self.signal_all(Signal::SIGUSR1);
            }
            MasterSignal::Usr2 => {
                info!("received SIGUSR2, starting binary upgrade");
                if let Err(e) = self.exec_upgrade() {
                    error!(error = %e, "binary upgrade failed");
                }
            }
            MasterSignal::Chld => self.reap_exited(),
        }
    }

    fn mark_all_do_not_revive(&self) {
        let mut dead = self.do_not_revive.borrow_mut();
        for pid in self.workers.borrow().values() {
            dead.insert(*pid);
        }
    }

    fn signal_all(&self, sig: Signal) {
        for pid in self.workers.borrow().values() {
            let _ = kill(*pid, sig);
        }
    }

    /// covers the case where every worker had already exited by the time a shutdown signal
    /// arrived — [Self::worker_exited] would otherwise never fire again to notice.
    fn exit_if_drained(&self) {
        if self.die_with_last_worker.get() && self.workers.borrow().is_empty() {
            info!("no workers remain, master exiting");
            std::process::exit(0);
        }
    }

    fn reap_exited(&self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, _)) | Ok(WaitStatus::Signaled(pid, _, _)) => self.worker_exited(pid),
                Ok(WaitStatus::StillAlive) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }

    fn worker_exited(&self, pid: Pid) {
        let wid = {
            let mut workers = self.workers.borrow_mut();
            let wid = workers.iter().find_map(|(&wid, &p)| (p == pid).then_some(wid));
            if let Some(wid) = wid {
                workers.remove(&wid);
            }
            wid
        };
        let Some(wid) = wid else { return };
        self.control.remove_worker_files(wid);

        if self.do_not_revive.borrow_mut().remove(&pid) {
            info!(wid, "worker exited (not revived)");
        } else {
            warn!(wid, "worker exited unexpectedly, respawning");
            if let Err(e) = self.spawn_worker(wid, None) {
                error!(error = %e, wid, "failed to respawn worker");
            }
        }

        self.exit_if_drained();
    }

    fn check_heartbeats(&self) {
        let snapshot: Vec<(usize, Pid)> = self.workers.borrow().iter().map(|(&w, &p)| (w, p)).collect();
        for (wid, pid) in snapshot {
            let path = self.control.heartbeat_path(wid);
            if heartbeat_is_stale(&path, self.config.worker_timeout) {
                warn!(wid, "worker heartbeat stale, killing");
                let _ = kill(pid, Signal::SIGKILL);
            }
        }
    }

    fn spawn_worker(&self, wid: usize, ready_fd: Option<RawFd>) -> io::Result<()> {
        let listener = self.listener.try_clone()?;

        // touch the heartbeat file before forking, not after: the worker's own heartbeat task
        // only runs once its runtime gets around to scheduling it, and `check_heartbeats` treats
        // a missing file the same as a stale one. creating it here with a fresh mtime closes the
        // window where a worker killed before its first heartbeat tick would otherwise look dead
        // on arrival.
        if let Err(e) = heartbeat_touch(&self.control.heartbeat_path(wid)) {
            warn!(wid, error = %e, "failed to pre-create heartbeat file");
        }

        // SAFETY: the child calls straight into `worker_main`, which builds its own tokio
        // runtime rather than touching anything the parent's runtime had registered.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                self.workers.borrow_mut().insert(wid, child);
                Ok(())
            }
            Ok(ForkResult::Child) => {
                worker::worker_main(
                    wid,
                    listener,
                    self.app.clone(),
                    self.config.worker,
                    self.config.heartbeat_interval,
                    ready_fd,
                    &self.control,
                );
                std::process::exit(0);
            }
            Err(e) => Err(io::Error::from_raw_os_error(e as i32)),
        }
    }

    fn bind_reuseable(addr: std::net::SocketAddr, backlog: u32) -> io::Result<StdTcpListener> {
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(backlog as i32)?;
        Ok(socket.into())
    }

    /// forks a replacement master that execs the same binary with `FEATHER_LISTEN_FD` pointing
    /// at our listening socket. the old master (this process) keeps running its existing workers;
    /// an operator takes it down once the replacement has announced readiness on its own control
    /// dir's notify FIFO. this process makes no attempt to wait for that itself.
    fn exec_upgrade(&self) -> io::Result<()> {
        let fd = self.listener.as_raw_fd();
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty())).map_err(|e| io::Error::from_raw_os_error(e as i32))?;

        match unsafe { fork() }.map_err(|e| io::Error::from_raw_os_error(e as i32))? {
            ForkResult::Parent { child } => {
                info!(pid = child.as_raw(), "spawned replacement master for binary upgrade");
                Ok(())
            }
            ForkResult::Child => {
                let exe = std::env::current_exe()?;
                let args: Vec<_> = std::env::args_os().skip(1).collect();
                let err = std::process::Command::new(exe)
                    .args(args)
                    .env(crate::LISTEN_FD_VAR, fd.to_string())
                    .env(crate::DEPTH_VAR, (self.depth + 1).to_string())
                    .exec();
                error!(error = %err, "failed to exec replacement master");
                std::process::exit(1);
            }
        }
    }
}
