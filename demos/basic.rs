//! Minimal muxlog example — one route with request logging.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8990/hello
//!   curl -H 'x-request-id: abc123' -H 'x-forwarded-for: 1.2.3.4' http://localhost:8990/hello
//!
//! Access log entries go to stderr from the middleware's own subscriber;
//! server lifecycle events go through the global one installed below.

use muxlog::middleware::{LogOptions, LoggingMiddleware};
use muxlog::{Request, Router, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let app = Router::new()
        .get("/hello", index)
        .layer(LoggingMiddleware::new(LogOptions::default()));

    Server::bind("0.0.0.0:8990")
        .serve(app)
        .await
        .expect("server error");
}

// GET /hello
async fn index(_req: Request) -> &'static str {
    "hello!"
}
