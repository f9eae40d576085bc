//! runtime configuration for the http/1.1 pipeline.

use core::time::Duration;

/// default limit of header count a single request head can carry.
pub const DEFAULT_HEADER_LIMIT: usize = 64;
/// default byte size of the read buffer used to accumulate a request.
pub const DEFAULT_READ_BUF_LIMIT: usize = 1024 * 1024;
/// default byte size a single write pass tries to fill before flushing.
pub const DEFAULT_WRITE_BUF_LIMIT: usize = 1024 * 1024;

/// Configuration for [HttpService](crate::service::HttpService).
///
/// const generics bound the header count and the read/write buffer size at compile time so the
/// hot path of the dispatcher never has to check a runtime value before indexing into them.
#[derive(Copy, Clone, Debug)]
pub struct HttpServiceConfig<
    const HEADER_LIMIT: usize = DEFAULT_HEADER_LIMIT,
    const READ_BUF_LIMIT: usize = DEFAULT_READ_BUF_LIMIT,
    const WRITE_BUF_LIMIT: usize = DEFAULT_WRITE_BUF_LIMIT,
> {
    pub(crate) keep_alive_timeout: Duration,
    pub(crate) request_head_timeout: Duration,
    pub(crate) first_request_timeout: Duration,
}

impl HttpServiceConfig {
    /// construct default config. 5 second keep-alive timeout, 5 second request head timeout and
    /// no separate first-request grace period.
    pub const fn new() -> Self {
        Self {
            keep_alive_timeout: Duration::from_secs(5),
            request_head_timeout: Duration::from_secs(5),
            first_request_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for HttpServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl<const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
    HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
{
    /// re-map the const generics this config carries. values are preserved, limits are not.
    pub const fn with_const<const HEADER_LIMIT_2: usize, const READ_BUF_LIMIT_2: usize, const WRITE_BUF_LIMIT_2: usize>(
        self,
    ) -> HttpServiceConfig<HEADER_LIMIT_2, READ_BUF_LIMIT_2, WRITE_BUF_LIMIT_2> {
        HttpServiceConfig {
            keep_alive_timeout: self.keep_alive_timeout,
            request_head_timeout: self.request_head_timeout,
            first_request_timeout: self.first_request_timeout,
        }
    }

    /// how long an idle keep-alive connection is allowed to sit between requests before the
    /// dispatcher closes it.
    pub const fn keep_alive_timeout(mut self, dur: Duration) -> Self {
        self.keep_alive_timeout = dur;
        self
    }

    /// how long the dispatcher waits for a complete request head once bytes start arriving.
    pub const fn request_head_timeout(mut self, dur: Duration) -> Self {
        self.request_head_timeout = dur;
        self
    }

    /// grace period granted to the very first request head on a freshly accepted connection.
    pub const fn first_request_timeout(mut self, dur: Duration) -> Self {
        self.first_request_timeout = dur;
        self
    }
}
