//! a minimal WSGI-shaped "hello world", playing the same role as
//! `original_source/examples/helloworld.py`. no CLI flags: host and port are literals, matching
//! the original's own zero-configuration style.

use std::rc::Rc;

use feather::{BodyIter, RequestHandler, StartResponse, WsgiApp, WsgiEnviron, WsgiHandler};
use feather_http::bytes::Bytes;
use feather_server::{Supervisor, SupervisorConfig};

const HOST: &str = "127.0.0.1";
const PORT: u16 = 9000;
const WORKER_COUNT: usize = 4;

struct HelloWorld;

impl WsgiApp for HelloWorld {
    fn call(&self, _environ: WsgiEnviron, start_response: &StartResponse) -> BodyIter {
        let body = b"Hello, World!";
        start_response.call(
            "200 OK",
            vec![("Content-Type".to_string(), "text/plain".to_string()), ("Content-Length".to_string(), body.len().to_string())],
            None,
        );
        Box::new(std::iter::once(Bytes::from_static(body)))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let handler = Rc::new(RequestHandler::new().with_methods(
        [
            feather_http::http::Method::GET,
            feather_http::http::Method::POST,
            feather_http::http::Method::PUT,
            feather_http::http::Method::DELETE,
            feather_http::http::Method::HEAD,
        ],
        WsgiHandler::new(HelloWorld, HOST, PORT, WORKER_COUNT),
    ));

    let addr = format!("{HOST}:{PORT}").parse()?;
    let config = SupervisorConfig::new(WORKER_COUNT);

    Supervisor::bind("hello_wsgi", addr, feather::app(handler), config)?.run()?;
    Ok(())
}
