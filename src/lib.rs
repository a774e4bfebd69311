//! # muxlog
//!
//! Structured request logging for a minimal HTTP router.
//!
//! Every request that reaches a route is written up once it completes: who
//! asked (request id, client address), what came back (status) and how long
//! it took. The entries go to their own `tracing` subscriber, plain text by
//! default, so access logs never mix with application diagnostics.
//!
//! The rest of the crate is the smallest host that middleware needs:
//!
//! - Radix-tree routing via [`matchit`], with a middleware chain
//! - hyper on tokio, HTTP/1.1 and HTTP/2
//! - Graceful shutdown — SIGTERM / Ctrl-C, drains in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use muxlog::middleware::{LogOptions, LoggingMiddleware};
//! use muxlog::{Request, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .get("/hello", index)
//!         .layer(LoggingMiddleware::new(LogOptions::default()));
//!
//!     Server::bind("0.0.0.0:8990").serve(app).await.unwrap();
//! }
//!
//! async fn index(_req: Request) -> &'static str {
//!     "hello!"
//! }
//! ```
//!
//! Each request then produces a line like:
//!
//! ```text
//! 2026-10-16T09:12:44+02:00  INFO completed handling request remoteAddr=127.0.0.1 status=200 took=142.5µs
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod writer;

pub mod middleware;

pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
pub use http::{HeaderMap, Method, StatusCode};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use writer::ResponseWriter;
