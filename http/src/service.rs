use core::{fmt, marker::PhantomData, pin::pin};

use feather_io::{
    io::AsyncIo,
    net::{Stream as ServerStream, TcpStream},
};
use feather_service::Service;
use futures_core::Stream;

use super::{
    body::RequestBody,
    bytes::Bytes,
    config::HttpServiceConfig,
    date::{DateTime, DateTimeService},
    error::HttpServiceError,
    http::{Request, RequestExt, Response},
    util::timer::KeepAlive,
};

pub struct HttpService<
    St,
    S,
    ReqB,
    const HEADER_LIMIT: usize,
    const READ_BUF_LIMIT: usize,
    const WRITE_BUF_LIMIT: usize,
> {
    pub(crate) config: HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>,
    pub(crate) date: DateTimeService,
    pub(crate) service: S,
    _body: PhantomData<(St, ReqB)>,
}

impl<St, S, ReqB, const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
    HttpService<St, S, ReqB, HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
{
    pub(crate) fn new(config: HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>, service: S) -> Self {
        Self {
            config,
            date: DateTimeService::new(),
            service,
            _body: PhantomData,
        }
    }

    // keep-alive timer starts out armed with `HttpServiceConfig.first_request_timeout`. it is
    // re-used for the lifetime of the connection, which saves a heap allocation per accepted
    // socket.
    pub(crate) fn keep_alive(&self) -> KeepAlive {
        let dur = self.config.first_request_timeout;
        let deadline = self.date.get().now() + dur;
        KeepAlive::new(deadline)
    }
}

impl<S, ResB, BE, const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
    Service<ServerStream> for HttpService<ServerStream, S, RequestBody, HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
where
    S: Service<Request<RequestExt<RequestBody>>, Response = Response<ResB>>,
    ResB: Stream<Item = Result<Bytes, BE>>,
    S::Error: fmt::Debug,
    BE: fmt::Debug,
{
    type Response = ();
    type Error = HttpServiceError<S::Error, BE>;
    type Future<'f>
        = impl core::future::Future<Output = Result<Self::Response, Self::Error>> + 'f
    where
        Self: 'f;

    fn call<'s>(&'s self, io: ServerStream) -> Self::Future<'s>
    where
        ServerStream: 's,
    {
        async move {
            let timer = self.keep_alive();
            let mut timer = pin!(timer);

            match io {
                ServerStream::Tcp(io, addr) => {
                    super::h1::dispatcher::run(io, addr, timer.as_mut(), self.config, &self.service, self.date.get())
                        .await
                        .map_err(From::from)
                }
                #[cfg(unix)]
                ServerStream::Unix(io, _addr) => super::h1::dispatcher::run(
                    io,
                    crate::unspecified_socket_addr(),
                    timer.as_mut(),
                    self.config,
                    &self.service,
                    self.date.get(),
                )
                .await
                .map_err(From::from),
            }
        }
    }
}

#[allow(unused)]
fn _assert_tcp_stream_is_async_io<T: AsyncIo>() {}
