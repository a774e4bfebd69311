//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. A middleware takes the next handler in the chain
//! and returns a handler of the same shape; [`Router::layer`](crate::Router::layer)
//! composes them.
//!
//! Built-in middleware:
//! - [`LoggingMiddleware`] — one structured entry per request with request id,
//!   client address, status and latency

pub mod capture;
pub mod clock;
pub mod logger;

pub use capture::StatusRecorder;
pub use clock::{Clock, SystemClock};
pub use logger::{real_ip, Formatter, JsonFormatter, LogOptions, LoggingMiddleware, TextFormatter};

use crate::handler::BoxedHandler;

/// Wraps a handler with another handler.
///
/// Implemented for any `Fn(BoxedHandler) -> BoxedHandler`, so a closure can
/// be registered directly:
///
/// ```rust,no_run
/// # use muxlog::{BoxedHandler, Request, Router};
/// # use muxlog::middleware::LoggingMiddleware;
/// # async fn index(_: Request) -> &'static str { "hello!" }
/// let logger = LoggingMiddleware::default();
/// Router::new()
///     .get("/hello", index)
///     .layer(move |next: BoxedHandler| logger.middleware(next));
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}
