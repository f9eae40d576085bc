//! literal request/response round-trips driven over a real loopback socket, in the style of
//! `feather-http`'s own dispatcher-level tests but exercised end to end through [feather::app].
//!
//! covers the S1-S4 scenarios from the connection state machine: keep-alive reuse, the HTTP/1.0
//! default-close rule, a lazily-streamed body with no announced length, and a malformed request
//! line. S5 (descriptor-limit eviction) and S6 (graceful `SIGQUIT`) are multi-process/signal
//! scenarios exercised by hand against a running cluster rather than here — there is no
//! descriptor-limit or process tree to drive from a single-process test.

use std::rc::Rc;

use feather::{BodyIter, MethodHandler, RequestHandler, StartResponse, WsgiApp, WsgiEnviron, WsgiHandler};
use feather_http::{
    HttpServiceBuilder,
    bytes::Bytes,
    http::{Method, Request, Response},
};
use feather_io::net::Stream as ServerStream;
use feather_service::Service;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

struct HelloWorld;

impl WsgiApp for HelloWorld {
    fn call(&self, _environ: WsgiEnviron, start_response: &StartResponse) -> BodyIter {
        start_response.call("200 OK", vec![("Content-Length".to_string(), "13".to_string())], None);
        Box::new(std::iter::once(Bytes::from_static(b"Hello, World!")))
    }
}

struct Streaming;

impl WsgiApp for Streaming {
    fn call(&self, _environ: WsgiEnviron, start_response: &StartResponse) -> BodyIter {
        start_response.call("200 OK", vec![], None);
        Box::new([Bytes::from_static(b"abc"), Bytes::from_static(b"def")].into_iter())
    }
}

struct Empty;

impl MethodHandler for Empty {
    fn handle(&self, _req: &Request<Bytes>) -> Result<Response<feather_http::ResponseBody>, feather::HTTPError> {
        Ok(Response::new(feather_http::ResponseBody::None))
    }
}

/// drives one accepted connection through [feather::app] and returns once the dispatcher itself
/// ends the connection (client EOF, parse error, or a close-on-completion response).
async fn serve_one(listener: &TcpListener, handler: Rc<RequestHandler>) {
    let (tcp, addr) = listener.accept().await.unwrap();
    let builder = HttpServiceBuilder::new();
    let service = builder.call(Ok::<_, std::convert::Infallible>(feather::app(handler))).await.unwrap();
    let result = service.call(ServerStream::Tcp(tcp, addr)).await;
    assert!(result.is_ok(), "connection did not end cleanly");
}

/// reads one response off `stream` by parsing the header block, then the exact `Content-Length`
/// worth of body bytes (0 if the header is absent) — mirrors what a real client that honors
/// keep-alive must do, rather than reading until EOF.
async fn read_one_response(stream: &mut TcpStream) -> (String, String) {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.unwrap();
        assert_ne!(n, 0, "connection closed before a full response head arrived");
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") {
            break;
        }
    }
    let head = String::from_utf8(head).unwrap();
    let content_length: usize = head
        .lines()
        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        stream.read_exact(&mut body).await.unwrap();
    }
    (head, String::from_utf8(body).unwrap())
}

#[tokio::test]
async fn s1_minimal_keep_alive_get() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Rc::new(RequestHandler::new().with_methods([Method::GET], WsgiHandler::new(HelloWorld, "localhost", addr.port(), 1)));

    let server = serve_one(&listener, handler);
    let client = async {
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
        let (head, body) = read_one_response(&mut stream).await;
        assert!(head.starts_with("HTTP/1.1 200"));
        assert_eq!(body, "Hello, World!");

        stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
        let (head, body) = read_one_response(&mut stream).await;
        assert!(head.starts_with("HTTP/1.1 200"));
        assert_eq!(body, "Hello, World!");

        drop(stream);
    };

    tokio::join!(server, client);
}

#[tokio::test]
async fn s2_http10_defaults_to_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Rc::new(RequestHandler::new().with_methods([Method::GET], WsgiHandler::new(HelloWorld, "localhost", addr.port(), 1)));

    let server = serve_one(&listener, handler);
    let client = async {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.0\r\nHost: localhost\r\n\r\n").await.unwrap();

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.starts_with("HTTP/1.1 200") || text.starts_with("HTTP/1.0 200"));
        assert!(text.to_ascii_lowercase().contains("connection: close"));
        assert!(text.ends_with("Hello, World!"));
    };

    tokio::join!(server, client);
}

#[tokio::test]
async fn s3_streaming_body_without_content_length_closes_after() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Rc::new(RequestHandler::new().with_methods([Method::GET], WsgiHandler::new(Streaming, "localhost", addr.port(), 1)));

    let server = serve_one(&listener, handler);
    let client = async {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.to_ascii_lowercase().contains("connection: close"));
        assert!(text.ends_with("abcdef"));
    };

    tokio::join!(server, client);
}

#[tokio::test]
async fn s4_malformed_request_line_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let handler = Rc::new(RequestHandler::new().with_methods([Method::GET], Empty));

    let server = serve_one(&listener, handler);
    let client = async {
        let mut stream = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        stream.write_all(b"get / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.starts_with("HTTP/1.1 400") || text.starts_with("HTTP/1.0 400"), "expected 400, got: {text}");
    };

    tokio::join!(server, client);
}
