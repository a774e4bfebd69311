//! The response sink handlers write into.
//!
//! Every handler, including the ones produced by middleware, receives a
//! `&mut dyn ResponseWriter`. Middleware that wants to observe the response
//! wraps the writer it was given and passes the wrapper down the chain.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::debug;

/// A destination for one HTTP response.
///
/// Call order follows HTTP: set headers, then [`write_header`], then
/// [`write`] as many times as needed. Writing body bytes before any status
/// was set implies `200 OK`.
///
/// [`write_header`]: ResponseWriter::write_header
/// [`write`]: ResponseWriter::write
pub trait ResponseWriter: Send {
    /// Response headers. Changes after the first body write have no effect
    /// on sinks that stream.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sets the response status.
    fn write_header(&mut self, status: StatusCode);

    /// Appends body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        (**self).write_header(status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
}

/// The server's real sink: collects the response so hyper can send it as a
/// single `Full` body once the handler returns.
#[derive(Debug, Default)]
pub(crate) struct BufferedWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    #[cfg(test)]
    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn into_response(self) -> http::Response<Full<Bytes>> {
        let status = self.status();
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseWriter for BufferedWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        // First status wins, the same as on the wire.
        if let Some(current) = self.status {
            debug!(%current, ignored = %status, "superfluous write_header call");
            return;
        }
        self.status = Some(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}
