//! http/1.1 request and response pipeline built on [feather_service::Service].
//!
//! this crate deliberately speaks one protocol: keep-alive aware HTTP/1.1 over a plain TCP or
//! unix socket. there is no TLS termination and no URL router baked in; application dispatch is
//! left to whatever [Service](feather_service::Service) the caller plugs in.

#![feature(type_alias_impl_trait)]
#![forbid(unsafe_code)]

mod builder;
mod service;

pub mod body;
pub mod config;
pub mod date;
pub mod error;
pub mod h1;
pub mod http;
pub(crate) mod util;

/// re-export of the [bytes] crate.
pub use feather_io::bytes;

pub use self::body::{RequestBody, ResponseBody};
pub use self::builder::HttpServiceBuilder;
pub use self::error::{BodyError, HttpServiceError};
pub use self::http::{Request, RequestExt, Response};
pub use self::service::HttpService;

pub(crate) fn unspecified_socket_addr() -> std::net::SocketAddr {
    std::net::SocketAddr::V4(std::net::SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0))
}
