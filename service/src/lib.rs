#![no_std]
#![forbid(unsafe_code)]

mod service;

pub use self::service::{fn_build, fn_service, FnService, Service};

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
pub mod object;

#[cfg(feature = "alloc")]
pub type BoxFuture<'a, Res, Err> =
    core::pin::Pin<alloc::boxed::Box<dyn core::future::Future<Output = Result<Res, Err>> + 'a>>;

#[cfg(feature = "std")]
extern crate std;
