use core::convert::Infallible;

use std::io::Write;

use crate::bytes::{BufMut, BufMutWriter, Bytes, BytesMut};

/// trait for writing http/1 head and body data to a write buffer.
pub trait H1BufWrite {
    /// write http response head(status code and reason line, header lines) to buffer with fallible
    /// closure. on error path the buffer is reverted back to state before method was called.
    fn write_buf_head<F, T, E>(&mut self, func: F) -> Result<T, E>
    where
        F: FnOnce(&mut BytesMut) -> Result<T, E>;

    /// write `&'static [u8]` to buffer.
    fn write_buf_static(&mut self, bytes: &'static [u8]);

    /// write bytes to buffer as is.
    fn write_buf_bytes(&mut self, bytes: Bytes);

    /// write bytes to buffer as `transfer-encoding: chunked` encoded.
    fn write_buf_bytes_chunked(&mut self, bytes: Bytes);
}

impl H1BufWrite for BytesMut {
    #[inline]
    fn write_buf_head<F, T, E>(&mut self, func: F) -> Result<T, E>
    where
        F: FnOnce(&mut BytesMut) -> Result<T, E>,
    {
        let len = self.len();
        func(self).inspect_err(|_| self.truncate(len))
    }

    #[inline]
    fn write_buf_static(&mut self, bytes: &'static [u8]) {
        self.put_slice(bytes);
    }

    #[inline]
    fn write_buf_bytes(&mut self, bytes: Bytes) {
        self.put_slice(bytes.as_ref());
    }

    #[inline]
    fn write_buf_bytes_chunked(&mut self, bytes: Bytes) {
        let _ = write!(BufMutWriter(self), "{:X}\r\n", bytes.len());
        self.reserve(bytes.len() + 2);
        self.put_slice(bytes.as_ref());
        self.put_slice(b"\r\n");
    }
}
