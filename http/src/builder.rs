use core::fmt;

use feather_io::net;
use feather_service::Service;

use super::{
    body::RequestBody,
    config::{DEFAULT_HEADER_LIMIT, DEFAULT_READ_BUF_LIMIT, DEFAULT_WRITE_BUF_LIMIT, HttpServiceConfig},
    service::HttpService,
};

/// builder for [HttpService]. bridges a plain TCP or unix socket accept loop to the http/1.1
/// request/response pipeline for a given application [Service].
pub struct HttpServiceBuilder<St, const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
{
    pub(crate) config: HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>,
    pub(crate) _body: core::marker::PhantomData<fn(St)>,
}

impl HttpServiceBuilder<net::Stream, DEFAULT_HEADER_LIMIT, DEFAULT_READ_BUF_LIMIT, DEFAULT_WRITE_BUF_LIMIT> {
    /// construct a new service builder with default [HttpServiceConfig].
    pub const fn new() -> Self {
        Self::with_config(HttpServiceConfig::new())
    }

    /// construct a new service builder with given [HttpServiceConfig].
    pub const fn with_config<const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>(
        config: HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>,
    ) -> HttpServiceBuilder<net::Stream, HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT> {
        HttpServiceBuilder {
            config,
            _body: core::marker::PhantomData,
        }
    }
}

impl<St, const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
    HttpServiceBuilder<St, HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
{
    /// replace the builder's configuration.
    pub fn config<const HEADER_LIMIT_2: usize, const READ_BUF_LIMIT_2: usize, const WRITE_BUF_LIMIT_2: usize>(
        self,
        config: HttpServiceConfig<HEADER_LIMIT_2, READ_BUF_LIMIT_2, WRITE_BUF_LIMIT_2>,
    ) -> HttpServiceBuilder<St, HEADER_LIMIT_2, READ_BUF_LIMIT_2, WRITE_BUF_LIMIT_2> {
        HttpServiceBuilder {
            config,
            _body: core::marker::PhantomData,
        }
    }
}

type Error = Box<dyn fmt::Debug>;

impl<S, E, const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
    Service<Result<S, E>> for HttpServiceBuilder<net::Stream, HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
where
    E: fmt::Debug + 'static,
{
    type Response = HttpService<net::Stream, S, RequestBody, HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>;
    type Error = Error;
    type Future<'f>
        = impl core::future::Future<Output = Result<Self::Response, Self::Error>> + 'f
    where
        Self: 'f,
        Result<S, E>: 'f;

    fn call<'s>(&'s self, res: Result<S, E>) -> Self::Future<'s>
    where
        Result<S, E>: 's,
    {
        async move {
            let service = res.map_err(|e| Box::new(e) as Error)?;
            Ok(HttpService::new(self.config, service))
        }
    }
}
