//! `feather`: a pre-forking, coroutine-style HTTP/1.1 server with a WSGI application bridge.
//!
//! grounded on `original_source/feather/` (the Python package this crate's name and shape come
//! from) and built on the `feather-http`/`feather-server` crates: `feather-http` speaks HTTP/1.1,
//! `feather-server` owns the master/worker process model, and this crate is the layer in between
//! — request dispatch, error translation, access logging, and the WSGI boundary.

use std::{convert::Infallible, rc::Rc};

use feather_http::{
    RequestBody, ResponseBody,
    http::{Request, RequestExt, Response},
};
use feather_service::{Service, fn_build};

pub mod access_log;
pub mod error;
pub mod handler;
pub mod wsgi;

pub use error::HTTPError;
pub use handler::{MethodHandler, RequestHandler};
pub use wsgi::{BodyIter, ExcInfo, StartResponse, WsgiApp, WsgiEnviron, WsgiHandler};

/// adapts a [RequestHandler] into the `Service` [feather_server::Supervisor::bind] expects. the
/// handler never fails its own dispatch (panics and [HTTPError]s are both translated to a
/// response inside [RequestHandler::handle]), so `Error` is [Infallible] — matching
/// `feather-http`'s requirement that a service's error type implement `Debug` for its panic-log
/// path, which `Infallible` trivially satisfies by never existing.
pub fn app(handler: Rc<RequestHandler>) -> impl Service<Request<RequestExt<RequestBody>>, Response = Response<ResponseBody>, Error = Infallible> + 'static {
    fn_build(move |req: Request<RequestExt<RequestBody>>| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler.handle(req).await) }
    })
}
