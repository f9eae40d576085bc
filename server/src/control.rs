//! control directory layout: `<tmp>/feather-<cluster>-<depth>/...`, holding the master and
//! worker pid files, the heartbeat files the master polls for liveness, and the readiness
//! handshake primitives (a lock file and a notify FIFO).

use std::{
    fs, io,
    os::fd::{FromRawFd, RawFd},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

#[derive(Clone)]
pub(crate) struct ControlDir {
    root: PathBuf,
}

impl ControlDir {
    /// `cluster` names the application (used only to make the directory recognizable to an
    /// operator poking around `/tmp`); `depth` disambiguates nested supervisors, e.g. a binary
    /// upgrade's child master incrementing the value it inherited via `FEATHER_DEPTH`.
    pub(crate) fn new(cluster: &str, depth: u32) -> Self {
        let root = std::env::temp_dir().join(format!("feather-{cluster}-{depth}"));
        Self { root }
    }

    pub(crate) fn create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub(crate) fn master_pid_path(&self) -> PathBuf {
        self.root.join("master.pid")
    }

    pub(crate) fn worker_pid_path(&self, wid: usize) -> PathBuf {
        self.root.join(format!("worker{wid}.pid"))
    }

    pub(crate) fn heartbeat_path(&self, wid: usize) -> PathBuf {
        self.root.join(format!(".worker{wid}"))
    }

    pub(crate) fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub(crate) fn notify_path(&self) -> PathBuf {
        self.root.join("notify")
    }

    pub(crate) fn remove_worker_files(&self, wid: usize) {
        let _ = fs::remove_file(self.worker_pid_path(wid));
        let _ = fs::remove_file(self.heartbeat_path(wid));
    }
}

pub(crate) fn write_pid_file(path: &Path, pid: i32) -> io::Result<()> {
    fs::write(path, pid.to_string())
}

/// touch a heartbeat file's mtime. reopening with `truncate` is simpler than seeking and is
/// only called every `heartbeat_interval`, far below anything that would make the extra open
/// syscall matter.
pub(crate) fn heartbeat_touch(path: &Path) -> io::Result<()> {
    use std::io::Write;
    let mut f = fs::OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    write!(f, "{}", std::process::id())
}

/// `true` if the heartbeat file's mtime is older than `timeout`, or it is missing entirely
/// (a worker that died before writing its first heartbeat).
pub(crate) fn heartbeat_is_stale(path: &Path, timeout: Duration) -> bool {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return true,
    };
    SystemTime::now().duration_since(modified).map(|age| age > timeout).unwrap_or(false)
}

/// create the readiness FIFO. safe to call if it already exists from a previous run in the
/// same control dir (stale FIFOs are harmless, just unlinked and recreated).
pub(crate) fn create_notify_fifo(path: &Path) -> io::Result<()> {
    let _ = fs::remove_file(path);
    nix::unistd::mkfifo(path, nix::sys::stat::Mode::from_bits_truncate(0o600))
        .map_err(|e| io::Error::from_raw_os_error(e as i32))
}

/// open the notify FIFO write side non-blocking and write one byte. `ENXIO` (no reader yet
/// attached) is not fatal — an operator who isn't watching the FIFO should not crash the
/// supervisor.
pub(crate) fn signal_ready(path: &Path) {
    use std::os::unix::fs::OpenOptionsExt;
    match fs::OpenOptions::new().write(true).custom_flags(libc::O_NONBLOCK).open(path) {
        Ok(mut f) => {
            use std::io::Write;
            if let Err(e) = f.write_all(&[0u8]) {
                tracing::warn!(error = %e, "failed to signal readiness FIFO");
            }
        }
        Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
            tracing::warn!("readiness FIFO has no reader; continuing without announcing readiness");
        }
        Err(e) => tracing::warn!(error = %e, "failed to open readiness FIFO"),
    }
}

/// called by a freshly-started original worker once its acceptor is live. takes the readiness
/// lock, writes this worker's pid as 4 little-endian bytes onto the anonymous pipe the master
/// is blocked reading `worker_count * 4` bytes from, then drops its copy of the write end —
/// every worker holds its own fd after `fork`, so this does not affect its siblings.
pub(crate) fn report_ready(lock_path: &Path, ready_fd: RawFd, pid: i32) -> io::Result<()> {
    with_flock(lock_path, || -> io::Result<()> {
        use std::io::Write;
        // SAFETY: `ready_fd` is this process's own copy of the write end, inherited across
        // `fork` and not otherwise used; `File` taking ownership and closing it on drop is fine.
        let mut f = unsafe { fs::File::from_raw_fd(ready_fd) };
        f.write_all(&pid.to_le_bytes())
    })?
}

/// advisory-lock a small file for the duration of `f`, serializing the 4-byte pid writes
/// several worker processes perform concurrently onto the shared readiness pipe.
pub(crate) fn with_flock<T>(path: &Path, f: impl FnOnce() -> T) -> io::Result<T> {
    use std::os::fd::AsRawFd;
    let file = fs::OpenOptions::new().create(true).write(true).open(path)?;
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is owned by `file`, which outlives both calls below.
    let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let out = f();
    unsafe {
        libc::flock(fd, libc::LOCK_UN);
    }
    Ok(out)
}
