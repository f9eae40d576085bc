//! per-connection keep-alive bookkeeping layered on top of [feather_http]'s dispatcher.
//!
//! [feather_http::HttpService] owns the entire per-connection request loop (parse, dispatch,
//! encode, repeat until closed); it has no notion of a worker-wide descriptor budget. This
//! module adds exactly that on top, by wrapping the application [Service] with a flag that
//! tracks whether a request is currently in flight, and giving the [Acceptor](crate::acceptor::Acceptor)
//! a way to ask an *idle* connection to close early when descriptors run short.

#![allow(clippy::type_complexity)]

use std::{
    cell::Cell,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context as TaskContext, Poll},
};

use feather_http::Response;
use feather_service::Service;
use futures_core::Stream;
use pin_project_lite::pin_project;
use tokio::sync::Notify;

/// shared between a connection's [TrackIdle] wrapper and its [`Acceptor`](crate::acceptor::Acceptor)
/// killable-set entry.
pub(crate) struct ConnState {
    active: Cell<bool>,
    evict: Notify,
}

impl ConnState {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            active: Cell::new(false),
            evict: Notify::new(),
        })
    }

    /// called by the acceptor under descriptor pressure. only has an effect while the
    /// connection is idle between requests; a connection mid-request is left alone.
    pub(crate) fn try_evict(&self) -> bool {
        if self.active.get() {
            false
        } else {
            self.evict.notify_one();
            true
        }
    }
}

/// wraps an application [Service] so the surrounding connection can observe when a request is
/// in flight. constructed fresh per accepted connection: the `active` flag must not be shared
/// across connections, since eviction decisions are per-connection.
///
/// `active` spans from the moment the request is handed to the application until its response
/// body has been fully streamed (or has errored out) — not just until the application returns a
/// `Response` handle. [feather_http::h1::dispatcher] resolves `Service::call` as soon as a
/// `Response<ResB>` exists, before it drains `ResB` onto the wire, so stopping the tracking there
/// would mark a connection idle while its body is still being written, letting the acceptor evict
/// it out from under an in-flight send. [TrackedBody] closes that gap by holding the flag open
/// until the wrapped body stream itself reports completion.
pub(crate) struct TrackIdle<S> {
    inner: S,
    state: Rc<ConnState>,
}

impl<S> TrackIdle<S> {
    pub(crate) fn new(inner: S, state: Rc<ConnState>) -> Self {
        Self { inner, state }
    }
}

impl<S, Req, ResB> Service<Req> for TrackIdle<S>
where
    S: Service<Req, Response = Response<ResB>>,
{
    type Response = Response<TrackedBody<ResB>>;
    type Error = S::Error;
    type Future<'f>
        = impl Future<Output = Result<Self::Response, Self::Error>> + 'f
    where
        Self: 'f,
        Req: 'f;

    fn call<'s>(&'s self, req: Req) -> Self::Future<'s>
    where
        Req: 's,
    {
        self.state.active.set(true);
        async move {
            match self.inner.call(req).await {
                Ok(res) => Ok(res.map(|body| TrackedBody::new(body, self.state.clone()))),
                Err(e) => Err(e),
            }
        }
    }
}

pin_project! {
    /// a response body that keeps its connection's [ConnState] marked active until the stream
    /// itself yields its last item (`None`) or an error — see [TrackIdle]'s doc comment.
    pub(crate) struct TrackedBody<B> {
        #[pin]
        inner: B,
        state: Rc<ConnState>,
    }
}

impl<B> TrackedBody<B> {
    fn new(inner: B, state: Rc<ConnState>) -> Self {
        Self { inner, state }
    }
}

impl<B, T, E> Stream for TrackedBody<B>
where
    B: Stream<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let poll = this.inner.poll_next(cx);
        if matches!(poll, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            this.state.active.set(false);
        }
        poll
    }
}

/// waits until the acceptor asks this (idle) connection to close, or forever if it never does.
/// raced against the dispatcher future in [crate::acceptor::Acceptor::accept_loop].
pub(crate) async fn wait_evicted(state: &ConnState) {
    state.evict.notified().await;
}
