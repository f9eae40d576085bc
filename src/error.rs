//! the error type a method hook raises to short-circuit a response.
//!
//! modeled as a plain `Result<Response<ResponseBody>, HTTPError>` rather than Python's
//! `raise HTTPError(...)`, since Rust has no implicit exception unwinding to catch — see
//! [crate::handler::RequestHandler::dispatch].

use feather_http::{
    ResponseBody,
    http::{HeaderName, HeaderValue, Response, StatusCode, const_header_value},
};
use thiserror::Error;

/// an application-raised error that translates directly to an HTTP response: a status code, a
/// plain-text body, and any extra headers the handler wants set (e.g. `WWW-Authenticate` on a
/// 401). distinct from a panic, which [crate::handler::RequestHandler::dispatch] also catches
/// but treats as an unhandled exception (500, optionally with a traceback body).
#[derive(Debug, Error)]
#[error("http error {code}: {body}")]
pub struct HTTPError {
    pub code: StatusCode,
    pub body: String,
    pub extra_headers: Vec<(HeaderName, HeaderValue)>,
}

impl HTTPError {
    pub fn new(code: StatusCode, body: impl Into<String>) -> Self {
        Self {
            code,
            body: body.into(),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.extra_headers.push((name, value));
        self
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, body)
    }

    /// render into the `(code, Content-Type: text/plain, body)` shape §4.4 specifies for both
    /// application-raised [HTTPError]s and the 500 path a caught panic takes.
    pub fn into_response(self) -> Response<ResponseBody> {
        let mut res = Response::new(ResponseBody::bytes(self.body));
        *res.status_mut() = self.code;
        res.headers_mut().insert(feather_http::http::header::CONTENT_TYPE, const_header_value::TEXT);
        for (name, value) in self.extra_headers {
            res.headers_mut().insert(name, value);
        }
        res
    }
}
