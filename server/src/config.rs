use std::time::Duration;

use feather_http::config::HttpServiceConfig;

/// top level configuration for one supervised cluster.
#[derive(Clone)]
pub struct SupervisorConfig {
    /// number of worker processes to keep alive.
    pub worker_count: usize,
    /// how long the master waits between heartbeat-file staleness checks.
    pub worker_timeout: Duration,
    /// interval between a worker's own heartbeat-file touches. spec calls for
    /// `worker_timeout / 2`; kept as an explicit field so callers can widen the margin.
    pub heartbeat_interval: Duration,
    /// interval of the secondary non-blocking `waitpid` zombie sweep.
    pub zombie_sweep_interval: Duration,
    /// if true, the master exits once its last worker has exited instead of reviving it.
    pub die_with_last_worker: bool,
    /// `listen(2)` backlog for the bound socket.
    pub backlog: u32,
    pub worker: WorkerConfig,
}

impl SupervisorConfig {
    pub fn new(worker_count: usize) -> Self {
        let worker_timeout = Duration::from_secs(60);
        Self {
            worker_count,
            worker_timeout,
            heartbeat_interval: worker_timeout / 2,
            zombie_sweep_interval: Duration::from_secs(2),
            die_with_last_worker: false,
            backlog: 2048,
            worker: WorkerConfig::default(),
        }
    }

    pub fn worker_timeout(mut self, dur: Duration) -> Self {
        self.heartbeat_interval = dur / 2;
        self.worker_timeout = dur;
        self
    }
}

/// per-worker accept-loop and connection configuration.
#[derive(Clone, Copy)]
pub struct WorkerConfig {
    /// upper bound on descriptors a single worker holds open at once. the acceptor's
    /// `descriptor_semaphore` is sized from this.
    pub max_connections: usize,
    /// the wire-level keep-alive/head-timeout/header-limit knobs, handed to
    /// [HttpServiceConfig] unchanged.
    pub http: HttpServiceConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_connections: 25_000,
            http: HttpServiceConfig::new().keep_alive_timeout(Duration::from_secs(75)),
        }
    }
}
