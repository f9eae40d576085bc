//! the WSGI application boundary — grounded on `original_source/feather/wsgi.py`'s
//! `WSGIHTTPRequestHandler.do_everything`, restated as a typed trait instead of a duck-typed
//! `environ` dict.
//!
//! `feather` only owns the boundary (`WsgiEnviron`, `StartResponse`, `WsgiApp`); the application
//! itself is an external collaborator, same as in the Python original.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use feather_http::{
    ResponseBody,
    bytes::Bytes,
    http::{
        HeaderMap, Method, Request, Response, StatusCode, Version,
        header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING},
    },
};
use futures_core::Stream;

use crate::{error::HTTPError, handler::MethodHandler};

/// the subset of the WSGI `environ` dict `feather` can express statically. `extra` carries every
/// other request header, swept in as `HTTP_<NAME>` the same way the Python original iterates
/// `request.headers.items()`.
pub struct WsgiEnviron {
    pub version: (u32, u32),
    pub url_scheme: &'static str,
    pub input: Bytes,
    pub multithread: bool,
    pub multiprocess: bool,
    pub run_once: bool,
    pub request_method: Method,
    pub path_info: String,
    pub query_string: String,
    pub server_name: String,
    pub server_port: u16,
    pub server_protocol: &'static str,
    pub content_length: Option<usize>,
    pub content_type: Option<String>,
    pub extra: HashMap<String, String>,
}

impl fmt::Debug for WsgiEnviron {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsgiEnviron").field("path_info", &self.path_info).field("request_method", &self.request_method).finish_non_exhaustive()
    }
}

/// the object `exc_info` would carry in Python: `(type, value, traceback)`, collapsed to the one
/// thing `feather` can usefully re-raise — a display string, propagated by panicking (caught by
/// [crate::handler::RequestHandler::dispatch] the same as any other application panic).
pub struct ExcInfo(pub String);

/// `write(data)` from `start_response`'s return value: buffers bytes to be prepended to the first
/// body chunk, mirroring the Python original's `collector[0].write`.
#[derive(Default)]
pub struct Writer(RefCell<Vec<u8>>);

impl Writer {
    pub fn write(&self, data: &[u8]) {
        self.0.borrow_mut().extend_from_slice(data);
    }
}

struct StartResponseState {
    status: StatusCode,
    headers: Vec<(String, String)>,
    flushed: bool,
}

impl Default for StartResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            flushed: false,
        }
    }
}

/// `start_response(status, headers, exc_info=None)`. Takes `&self` rather than `&mut self`
/// because [WsgiApp::call] is handed a shared reference the same way the Python closure captures
/// its enclosing scope by value; the mutable state lives behind the `RefCell`s.
#[derive(Default)]
pub struct StartResponse {
    state: RefCell<StartResponseState>,
    writer: Writer,
}

impl StartResponse {
    /// parses `status`'s leading decimal status code, records `headers`, and returns the `write`
    /// callable. panics (to be caught and re-raised the same as any other handler panic) if
    /// `exc_info` is given after a response has already been flushed — the one case the WSGI spec
    /// requires the server to refuse to silently swallow.
    pub fn call(&self, status: &str, headers: Vec<(String, String)>, exc_info: Option<ExcInfo>) -> &Writer {
        let mut state = self.state.borrow_mut();
        if let Some(exc) = exc_info {
            if state.flushed {
                drop(state);
                panic!("{}", exc.0);
            }
        }
        let code = status
            .split_whitespace()
            .next()
            .and_then(|c| c.parse::<u16>().ok())
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        state.status = code;
        state.headers = headers;
        state.flushed = true;
        &self.writer
    }
}

/// an iterator of response body chunks, exactly as a WSGI application returns.
pub type BodyIter = Box<dyn Iterator<Item = Bytes>>;

/// the boundary trait an embedding application implements. `feather` ships no built-in app beyond
/// the demo in `demos/hello_wsgi.rs` — this is the same "external collaborator" role spec.md
/// assigns to the WSGI application itself.
pub trait WsgiApp {
    fn call(&self, environ: WsgiEnviron, start_response: &StartResponse) -> BodyIter;
}

/// turns a plain [BodyIter] into a lazily-pulled `Stream`, per the generator-based-response-bodies
/// design note: a long-running app can start writing before it has produced its whole body,
/// rather than `feather` draining the iterator up front. Every item is immediately `Ready` since
/// the iterator itself never actually awaits anything — the laziness is about *when* `next()` is
/// called, not about yielding to the executor mid-chunk.
struct WsgiBodyStream(BodyIter);

impl Stream for WsgiBodyStream {
    type Item = Result<Bytes, std::convert::Infallible>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().0.next().map(Ok))
    }
}

/// adapts a [WsgiApp] into a [MethodHandler], registered under every method the server should
/// treat as WSGI-handled (`do_GET = do_POST = ... = do_everything` in the original).
pub struct WsgiHandler<A> {
    app: A,
    server_name: String,
    server_port: u16,
    multiprocess: bool,
}

impl<A: WsgiApp> WsgiHandler<A> {
    pub fn new(app: A, server_name: impl Into<String>, server_port: u16, worker_count: usize) -> Self {
        Self {
            app,
            server_name: server_name.into(),
            server_port,
            multiprocess: worker_count > 1,
        }
    }

    fn build_environ(&self, req: &Request<Bytes>) -> WsgiEnviron {
        let headers = req.headers();
        let uri = req.uri();

        let mut extra = HashMap::new();
        for (name, value) in headers.iter() {
            if let Ok(value) = value.to_str() {
                extra.insert(format!("HTTP_{}", name.as_str().to_ascii_uppercase().replace('-', "_")), value.to_string());
            }
        }

        WsgiEnviron {
            version: version_tuple(req.version()),
            url_scheme: "http",
            input: req.body().clone(),
            multithread: false,
            multiprocess: self.multiprocess,
            run_once: false,
            request_method: req.method().clone(),
            path_info: percent_decode(uri.path()),
            query_string: uri.query().unwrap_or("").to_string(),
            server_name: self.server_name.clone(),
            server_port: self.server_port,
            server_protocol: "HTTP/1.1",
            content_length: content_length(headers),
            content_type: headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string),
            extra,
        }
    }
}

impl<A: WsgiApp> MethodHandler for WsgiHandler<A> {
    fn handle(&self, req: &Request<Bytes>) -> Result<Response<ResponseBody>, HTTPError> {
        let environ = self.build_environ(req);
        let start_response = StartResponse::default();

        let mut chunks = self.app.call(environ, &start_response);
        let prefix = start_response.writer.0.into_inner();
        let state = start_response.state.into_inner();

        let body = if prefix.is_empty() {
            ResponseBody::box_stream(WsgiBodyStream(chunks))
        } else {
            let first = chunks.next().unwrap_or_default();
            let mut merged = Vec::with_capacity(prefix.len() + first.len());
            merged.extend_from_slice(&prefix);
            merged.extend_from_slice(&first);
            let head: BodyIter = Box::new(std::iter::once(Bytes::from(merged)).chain(chunks));
            ResponseBody::box_stream(WsgiBodyStream(head))
        };

        let mut response = Response::new(body);
        *response.status_mut() = state.status;
        if !state.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("content-type")) {
            response.headers_mut().insert(CONTENT_TYPE, feather_http::http::const_header_value::TEXT);
        }
        for (name, value) in &state.headers {
            if let (Ok(name), Ok(value)) = (name.parse::<feather_http::http::HeaderName>(), value.parse::<feather_http::http::HeaderValue>()) {
                response.headers_mut().insert(name, value);
            }
        }
        // a WSGI app that streams without announcing its length leaves the response body
        // unbounded from the encoder's point of view; per the WSGI bridge contract, fall back to
        // closing the connection after this response rather than keep-alive with no framing.
        let headers = response.headers();
        if !headers.contains_key(CONTENT_LENGTH) && !headers.contains_key(TRANSFER_ENCODING) {
            response.headers_mut().insert(CONNECTION, feather_http::http::HeaderValue::from_static("close"));
        }
        Ok(response)
    }
}

fn version_tuple(v: Version) -> (u32, u32) {
    match v {
        Version::HTTP_10 => (1, 0),
        _ => (1, 1),
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers.get(feather_http::http::header::CONTENT_LENGTH).and_then(|v| v.to_str().ok()).and_then(|v| v.parse().ok())
}

/// minimal `%XX` percent-decoder for `PATH_INFO` — the WSGI spec requires the decoded path, and
/// nothing upstream in this crate already performs that decoding. Works on raw bytes throughout
/// (never slices `s` as a `&str`) since a `%XX` escape's hex digits aren't guaranteed to fall on
/// UTF-8 char boundaries once arbitrary non-ASCII input is in play.
fn percent_decode(s: &str) -> String {
    fn hex_val(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn percent_decode_handles_plain_and_escaped_paths() {
        assert_eq!(percent_decode("/plain/path"), "/plain/path");
        assert_eq!(percent_decode("/a%20b"), "/a b");
        assert_eq!(percent_decode("/not%zzdecoded"), "/not%zzdecoded");
    }

    #[test]
    fn version_tuple_maps_http10_and_defaults_to_http11() {
        assert_eq!(version_tuple(Version::HTTP_10), (1, 0));
        assert_eq!(version_tuple(Version::HTTP_11), (1, 1));
    }

    struct Echo;

    impl WsgiApp for Echo {
        fn call(&self, environ: WsgiEnviron, start_response: &StartResponse) -> BodyIter {
            start_response.call("200 OK", vec![("Content-Type".to_string(), "text/plain".to_string())], None);
            Box::new(std::iter::once(Bytes::from(environ.path_info)))
        }
    }

    #[test]
    fn wsgi_handler_runs_app_and_reports_its_status() {
        let handler = WsgiHandler::new(Echo, "localhost", 8080, 1);
        let req = Request::builder().method(Method::GET).uri("/hi").body(Bytes::new()).unwrap();
        let res = handler.handle(&req).unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    struct Raiser;

    impl WsgiApp for Raiser {
        fn call(&self, _environ: WsgiEnviron, start_response: &StartResponse) -> BodyIter {
            let writer = start_response.call("200 OK", vec![], None);
            writer.write(b"partial");
            start_response.call("500 Internal Server Error", vec![], Some(ExcInfo("boom".to_string())));
            Box::new(std::iter::empty())
        }
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn exc_info_after_flush_panics_for_dispatch_to_catch() {
        let handler = WsgiHandler::new(Raiser, "localhost", 8080, 1);
        let req = Request::builder().method(Method::GET).uri("/").body(Bytes::new()).unwrap();
        let _ = handler.handle(&req);
    }
}
