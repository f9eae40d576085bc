//! per-worker accept loop: pulls connections off the shared listening socket, bounds how many
//! descriptors this worker holds at once, and evicts idle keep-alive connections under
//! descriptor-exhaustion pressure.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    convert::Infallible,
    rc::{Rc, Weak},
    sync::Arc,
    time::Duration,
};

use feather_http::{
    HttpServiceBuilder, RequestBody, Response,
    bytes::Bytes,
    config::HttpServiceConfig,
    http::{Request, RequestExt},
};
use feather_io::net::{Listener, Stream as ServerStream};
use feather_service::Service;
use futures_core::Stream;
use tokio::sync::{Notify, Semaphore};
use tracing::{error, trace, warn};

use crate::conn::{ConnState, TrackIdle, wait_evicted};

pub(crate) struct Acceptor<S, ResB, BE, const H: usize, const R: usize, const W: usize> {
    listener: Listener,
    app: Rc<S>,
    builder: HttpServiceBuilder<ServerStream, H, R, W>,
    semaphore: Arc<Semaphore>,
    killable: RefCell<HashMap<u64, Weak<ConnState>>>,
    next_slot: Cell<u64>,
    open_count: Cell<usize>,
    shutting_down: Cell<bool>,
    done: Notify,
    _marker: std::marker::PhantomData<(ResB, BE)>,
}

impl<S, ResB, BE, const H: usize, const R: usize, const W: usize> Acceptor<S, ResB, BE, H, R, W>
where
    S: Service<Request<RequestExt<RequestBody>>, Response = Response<ResB>> + 'static,
    ResB: Stream<Item = Result<Bytes, BE>> + 'static,
    BE: 'static,
{
    pub(crate) fn new(listener: Listener, app: Rc<S>, max_connections: usize, http: HttpServiceConfig<H, R, W>) -> Rc<Self> {
        Rc::new(Self {
            listener,
            app,
            builder: HttpServiceBuilder::with_config(http),
            semaphore: Arc::new(Semaphore::new(max_connections)),
            killable: RefCell::new(HashMap::new()),
            next_slot: Cell::new(0),
            open_count: Cell::new(0),
            shutting_down: Cell::new(false),
            done: Notify::new(),
            _marker: std::marker::PhantomData,
        })
    }

    /// runs the accept loop until a shutdown is requested or the listener hits a fatal error.
    pub(crate) async fn run(self: Rc<Self>) {
        loop {
            if self.shutting_down.get() {
                break;
            }

            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            match self.listener.accept().await {
                Ok(stream) => {
                    self.open_count.set(self.open_count.get() + 1);
                    let this = self.clone();
                    tokio::task::spawn_local(async move {
                        this.serve(stream, permit).await;
                        this.open_count.set(this.open_count.get() - 1);
                    });
                }
                Err(e) => {
                    drop(permit);
                    match e.raw_os_error() {
                        Some(code) if code == libc::EMFILE => {
                            trace!("accept hit EMFILE, evicting idle keep-alive connections");
                            self.evict_idle();
                        }
                        Some(code) if code == libc::ENFILE => {
                            warn!("accept hit ENFILE, backing off");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                        Some(code) if code == libc::EINVAL || code == libc::EBADF => {
                            trace!("listening socket closed, exiting accept loop");
                            self.shutting_down.set(true);
                        }
                        _ => {
                            error!(error = %e, "fatal error accepting connection");
                            self.shutting_down.set(true);
                        }
                    }
                }
            }
        }

        self.wait_drain().await;
        self.done.notify_waiters();
    }

    /// ask the accept loop to stop and every idle connection to close; waits for in-flight
    /// connections to drain before returning.
    pub(crate) async fn shutdown(self: &Rc<Self>) {
        self.shutting_down.set(true);
        for weak in self.killable.borrow().values() {
            if let Some(state) = weak.upgrade() {
                state.try_evict();
            }
        }
        self.done.notified().await;
    }

    async fn wait_drain(&self) {
        while self.open_count.get() > 0 {
            tokio::task::yield_now().await;
        }
    }

    fn evict_idle(&self) {
        let mut killable = self.killable.borrow_mut();
        killable.retain(|_, weak| match weak.upgrade() {
            Some(state) => {
                state.try_evict();
                true
            }
            None => false,
        });
    }

    fn register(&self, state: &Rc<ConnState>) -> u64 {
        let slot = self.next_slot.get();
        self.next_slot.set(slot + 1);
        self.killable.borrow_mut().insert(slot, Rc::downgrade(state));
        slot
    }

    fn unregister(&self, slot: u64) {
        self.killable.borrow_mut().remove(&slot);
    }

    async fn serve(&self, stream: ServerStream, permit: tokio::sync::OwnedSemaphorePermit) {
        let conn_state = ConnState::new();
        let slot = self.register(&conn_state);

        let svc = TrackIdle::new(self.app.clone(), conn_state.clone());
        let http_service = match self.builder.call(Ok::<_, Infallible>(svc)).await {
            Ok(svc) => svc,
            Err(e) => {
                error!(?e, "failed to build connection service");
                self.unregister(slot);
                return;
            }
        };

        tokio::select! {
            res = http_service.call(stream) => {
                if let Err(e) = res {
                    trace!(error = ?e, "connection closed with error");
                }
            }
            _ = wait_evicted(&conn_state) => {
                trace!("idle connection evicted under descriptor pressure");
            }
        }

        self.unregister(slot);
        drop(permit);
    }
}
