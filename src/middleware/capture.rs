//! Status capture for middleware that needs to know what a handler answered.

use std::io;

use http::{HeaderMap, StatusCode};

use crate::writer::ResponseWriter;

/// A pass-through [`ResponseWriter`] that remembers the last status written.
///
/// Every call is forwarded to the wrapped writer immediately and unchanged;
/// nothing is buffered. If the handler never sets a status the recorded value
/// stays `200 OK`, which is what the client receives in that case.
#[derive(Debug)]
pub struct StatusRecorder<W> {
    inner: W,
    status: StatusCode,
}

impl<W: ResponseWriter> StatusRecorder<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, status: StatusCode::OK }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for StatusRecorder<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status = status;
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }
}
