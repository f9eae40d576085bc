use core::{net::SocketAddr, pin::pin};

use feather_io::io::AsyncIo;
use feather_service::Service;
use futures_core::stream::Stream;

use crate::{
    bytes::Bytes,
    error::HttpServiceError,
    http::{Request, RequestExt, Response},
    service::HttpService,
};

use super::body::RequestBody;

pub type H1Service<St, S, const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize> =
    HttpService<St, S, RequestBody, HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>;

impl<St, S, B, BE, const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
    Service<(St, SocketAddr)> for H1Service<St, S, HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
where
    S: Service<Request<RequestExt<RequestBody>>, Response = Response<B>>,
    St: AsyncIo + 'static,
    for<'i> &'i St: AsyncIo,
    B: Stream<Item = Result<Bytes, BE>>,
{
    type Response = ();
    type Error = HttpServiceError<S::Error, BE>;
    type Future<'f>
        = impl core::future::Future<Output = Result<Self::Response, Self::Error>> + 'f
    where
        Self: 'f,
        (St, SocketAddr): 'f;

    fn call<'s>(&'s self, (io, addr): (St, SocketAddr)) -> Self::Future<'s>
    where
        (St, SocketAddr): 's,
    {
        async move {
            let timer = self.keep_alive();
            let timer = pin!(timer);
            super::dispatcher::run(io, addr, timer, self.config, &self.service, self.date.get()).await?;
            Ok(())
        }
    }
}
