//! Structured request logging.
//!
//! [`LoggingMiddleware`] writes one entry per request once the handler has
//! returned, and optionally a second one when handling starts:
//!
//! ```text
//! 2026-10-16T09:12:44+02:00  INFO started handling request requestId=abc123 remoteAddr=10.0.0.5 request=/hello method=GET
//! 2026-10-16T09:12:44+02:00  INFO completed handling request requestId=abc123 remoteAddr=10.0.0.5 status=200 took=142.5µs
//! ```
//!
//! Entries go to a subscriber owned by the middleware, not to the global one,
//! so access logs keep their own format and destination. Pass a
//! [`Dispatch`] through [`LogOptions::dispatch`] to send them somewhere else.

use std::sync::Arc;

use tracing::field;
use tracing::{info, Dispatch, Level};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::capture::StatusRecorder;
use crate::middleware::clock::{Clock, SystemClock};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::writer::ResponseWriter;

const REQUEST_ID: &str = "x-request-id";
const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

// ── Options ───────────────────────────────────────────────────────────────────

/// How log entries are encoded.
///
/// Only these two encodings are built in. For anything else, build a
/// subscriber with the formatter you need and hand it over through
/// [`LogOptions::dispatch`].
#[derive(Clone, Debug)]
pub enum Formatter {
    /// `timestamp LEVEL message key=value ...`, one entry per line.
    Text(TextFormatter),
    /// One JSON object per line, fields at the top level.
    Json(JsonFormatter),
}

impl Default for Formatter {
    fn default() -> Self {
        Self::Text(TextFormatter::default())
    }
}

#[derive(Clone, Debug)]
pub struct TextFormatter {
    /// Defaults to `true`: access logs usually end up in files.
    pub disable_colors: bool,
    /// A chrono `strftime` pattern. `None` means RFC 3339, whole seconds.
    pub timestamp_format: Option<String>,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self { disable_colors: true, timestamp_format: None }
    }
}

#[derive(Clone, Debug, Default)]
pub struct JsonFormatter {
    /// A chrono `strftime` pattern. `None` means RFC 3339, whole seconds.
    pub timestamp_format: Option<String>,
}

/// Configuration for [`LoggingMiddleware::new`].
///
/// ```rust
/// use muxlog::middleware::{Formatter, JsonFormatter, LogOptions};
///
/// let opts = LogOptions::default()
///     .formatter(Formatter::Json(JsonFormatter::default()))
///     .enable_starting(true)
///     .writer(std::io::stdout);
/// ```
#[derive(Default)]
pub struct LogOptions {
    formatter: Option<Formatter>,
    enable_starting: bool,
    writer: Option<BoxMakeWriter>,
    dispatch: Option<Dispatch>,
}

impl LogOptions {
    /// Output encoding. Defaults to [`TextFormatter::default`].
    pub fn formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Also log when handling begins, not only when it completes.
    pub fn enable_starting(mut self, enable: bool) -> Self {
        self.enable_starting = enable;
        self
    }

    /// Where entries are written. Defaults to stderr.
    pub fn writer<W>(mut self, writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        self.writer = Some(BoxMakeWriter::new(writer));
        self
    }

    /// Emit entries into an existing subscriber instead of building one.
    /// The formatter and writer options are ignored when this is set.
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }
}

// ── LoggingMiddleware ─────────────────────────────────────────────────────────

/// Request logging middleware.
///
/// Cheap to clone; every clone logs into the same sink.
#[derive(Clone)]
pub struct LoggingMiddleware {
    dispatch: Dispatch,
    clock: Arc<dyn Clock>,
    enable_starting: bool,
}

impl LoggingMiddleware {
    pub fn new(options: LogOptions) -> Self {
        let dispatch = match options.dispatch {
            Some(dispatch) => dispatch,
            None => build_dispatch(
                options.formatter.unwrap_or_default(),
                options.writer.unwrap_or_else(|| BoxMakeWriter::new(std::io::stderr)),
            ),
        };
        Self {
            dispatch,
            clock: Arc::new(SystemClock),
            enable_starting: options.enable_starting,
        }
    }

    /// Replaces the time source used to measure `took`.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Wraps `next` so every request through it is logged.
    pub fn middleware(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Logged { logger: self.clone(), next })
    }

    fn emit(&self, f: impl FnOnce()) {
        tracing::dispatcher::with_default(&self.dispatch, f);
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new(LogOptions::default())
    }
}

impl Middleware for LoggingMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self.middleware(next)
    }
}

fn build_dispatch(formatter: Formatter, writer: BoxMakeWriter) -> Dispatch {
    let builder = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_writer(writer);

    match formatter {
        Formatter::Text(text) => Dispatch::new(
            builder
                .with_ansi(!text.disable_colors)
                .with_timer(timer(text.timestamp_format))
                .finish(),
        ),
        Formatter::Json(json) => Dispatch::new(
            builder
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_ansi(false)
                .with_timer(timer(json.timestamp_format))
                .finish(),
        ),
    }
}

/// RFC 3339 with whole seconds, e.g. `2026-10-16T09:12:44+02:00`.
const RFC3339: &str = "%Y-%m-%dT%H:%M:%S%:z";

fn timer(format: Option<String>) -> ChronoLocal {
    ChronoLocal::new(format.unwrap_or_else(|| RFC3339.to_owned()))
}

// ── Per-request handler ───────────────────────────────────────────────────────

struct Logged {
    logger: LoggingMiddleware,
    next: BoxedHandler,
}

impl ErasedHandler for Logged {
    fn call<'a>(&'a self, req: Request, writer: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        Box::pin(async move {
            let logger = &self.logger;
            let request_id = req
                .header(REQUEST_ID)
                .filter(|id| !id.is_empty())
                .map(str::to_owned);
            let remote_addr = real_ip(&req);

            if logger.enable_starting {
                logger.emit(|| {
                    info!(
                        requestId = request_id.as_deref().map(field::display),
                        remoteAddr = remote_addr.as_deref().map(field::display),
                        request = %req.request_uri(),
                        method = %req.method(),
                        "started handling request"
                    )
                });
            }

            let start = logger.clock.now();
            let mut recorder = StatusRecorder::new(writer);
            self.next.call(req, &mut recorder).await;
            let took = logger.clock.since(start);
            let status = recorder.status();

            logger.emit(|| {
                info!(
                    requestId = request_id.as_deref().map(field::display),
                    remoteAddr = remote_addr.as_deref().map(field::display),
                    status = status.as_u16(),
                    took = ?took,
                    "completed handling request"
                )
            });
        })
    }
}

/// The caller's address as best the request can tell.
///
/// First non-empty of: the first `X-Forwarded-For` entry, `X-Real-IP`, the
/// peer's IP without its port. `None` when there is nothing to report.
pub fn real_ip(req: &Request) -> Option<String> {
    req.header(FORWARDED_FOR)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| req.header(REAL_IP).map(str::trim).filter(|ip| !ip.is_empty()))
        .map(str::to_owned)
        .or_else(|| req.remote_addr().map(|addr| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use http::{Method, StatusCode};
    use serde_json::Value;

    use super::*;
    use crate::handler::Handler;
    use crate::request::test_support::request;
    use crate::response::Response;
    use crate::router::Router;
    use crate::writer::BufferedWriter;

    /// In-memory log destination.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }

        fn entries(&self) -> Vec<Value> {
            self.text()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Hands out scripted instants, one per read.
    struct StepClock(Mutex<VecDeque<Instant>>);

    impl StepClock {
        fn new(readings: impl IntoIterator<Item = Instant>) -> Self {
            Self(Mutex::new(readings.into_iter().collect()))
        }

        fn next(&self) -> Instant {
            self.0.lock().unwrap().pop_front().expect("clock read more often than scripted")
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> Instant {
            self.next()
        }

        fn since(&self, start: Instant) -> Duration {
            self.next().duration_since(start)
        }
    }

    /// Writes through the raw writer, the way a streaming handler would.
    struct Raw {
        status: Option<StatusCode>,
        body: &'static [u8],
    }

    impl ErasedHandler for Raw {
        fn call<'a>(&'a self, _req: Request, writer: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
            Box::pin(async move {
                if let Some(status) = self.status {
                    writer.write_header(status);
                }
                if !self.body.is_empty() {
                    writer.write(self.body).unwrap();
                }
            })
        }
    }

    async fn hello(_req: Request) -> Response {
        Response::text("hello!")
    }

    fn json_logger(capture: &Capture, enable_starting: bool) -> LoggingMiddleware {
        LoggingMiddleware::new(
            LogOptions::default()
                .formatter(Formatter::Json(JsonFormatter::default()))
                .enable_starting(enable_starting)
                .writer(capture.clone()),
        )
    }

    async fn run(logger: &LoggingMiddleware, next: BoxedHandler, req: Request) -> BufferedWriter {
        let mut writer = BufferedWriter::new();
        logger.middleware(next).call(req, &mut writer).await;
        writer
    }

    // ── real_ip ───────────────────────────────────────────────────────────────

    #[test]
    fn real_ip_takes_first_forwarded_entry() {
        let req = request(
            Method::GET,
            "/",
            &[("X-Forwarded-For", "1.2.3.4, 5.6.7.6"), ("X-Real-IP", "9.9.9.9")],
            Some("127.0.0.1:54321"),
        );
        assert_eq!(real_ip(&req).as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn real_ip_falls_back_to_real_ip_header() {
        let req = request(Method::GET, "/", &[("X-Real-IP", "9.9.9.9")], Some("127.0.0.1:54321"));
        assert_eq!(real_ip(&req).as_deref(), Some("9.9.9.9"));
    }

    #[test]
    fn real_ip_strips_the_peer_port() {
        let req = request(Method::GET, "/", &[], Some("127.0.0.1:54321"));
        assert_eq!(real_ip(&req).as_deref(), Some("127.0.0.1"));

        let req = request(Method::GET, "/", &[], Some("[::1]:8080"));
        assert_eq!(real_ip(&req).as_deref(), Some("::1"));
    }

    #[test]
    fn real_ip_skips_empty_headers() {
        let req = request(
            Method::GET,
            "/",
            &[("X-Forwarded-For", ""), ("X-Real-IP", " ")],
            Some("10.0.0.5:1000"),
        );
        assert_eq!(real_ip(&req).as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn real_ip_is_none_without_any_source() {
        let req = request(Method::GET, "/", &[], None);
        assert_eq!(real_ip(&req), None);
    }

    // ── entries ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn logs_once_per_request_by_default() {
        let capture = Capture::default();
        let logger = json_logger(&capture, false);

        let req = request(
            Method::GET,
            "/hello",
            &[("X-Request-Id", "abc123")],
            Some("10.0.0.5:1000"),
        );
        let writer = run(&logger, hello.into_boxed_handler(), req).await;
        assert_eq!(writer.body(), b"hello!");

        let entries = capture.entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry["message"], "completed handling request");
        assert_eq!(entry["level"], "INFO");
        assert_eq!(entry["requestId"], "abc123");
        assert_eq!(entry["remoteAddr"], "10.0.0.5");
        assert_eq!(entry["status"], 200);
        assert!(entry["took"].is_string());
        assert!(entry.get("request").is_none());
        assert!(entry.get("method").is_none());
    }

    #[tokio::test]
    async fn starting_entry_precedes_completion() {
        let capture = Capture::default();
        let logger = json_logger(&capture, true);

        let req = request(
            Method::POST,
            "/users?notify=1",
            &[("X-Request-Id", "r-1"), ("X-Forwarded-For", "1.2.3.4, 5.6.7.6")],
            Some("127.0.0.1:54321"),
        );
        run(&logger, hello.into_boxed_handler(), req).await;

        let entries = capture.entries();
        assert_eq!(entries.len(), 2);

        let started = &entries[0];
        assert_eq!(started["message"], "started handling request");
        assert_eq!(started["request"], "/users?notify=1");
        assert_eq!(started["method"], "POST");
        assert_eq!(started["requestId"], "r-1");
        assert_eq!(started["remoteAddr"], "1.2.3.4");
        assert!(started.get("status").is_none());

        let completed = &entries[1];
        assert_eq!(completed["message"], "completed handling request");
        assert_eq!(completed["requestId"], "r-1");
        assert_eq!(completed["remoteAddr"], "1.2.3.4");
        assert!(completed.get("request").is_none());
    }

    #[tokio::test]
    async fn took_is_measured_by_the_clock() {
        let capture = Capture::default();
        let t0 = Instant::now();
        let logger = json_logger(&capture, true)
            .with_clock(StepClock::new([t0, t0 + Duration::from_millis(250)]));

        run(&logger, hello.into_boxed_handler(), request(Method::GET, "/", &[], None)).await;

        let entries = capture.entries();
        assert_eq!(entries[1]["took"], format!("{:?}", Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn records_status_written_before_the_body() {
        let capture = Capture::default();
        let logger = json_logger(&capture, false);
        let next: BoxedHandler = Arc::new(Raw {
            status: Some(StatusCode::IM_A_TEAPOT),
            body: b"short and stout",
        });

        let writer = run(&logger, next, request(Method::GET, "/tea", &[], None)).await;

        assert_eq!(writer.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(writer.body(), b"short and stout");
        assert_eq!(capture.entries()[0]["status"], 418);
    }

    #[tokio::test]
    async fn silent_handler_logs_ok() {
        let capture = Capture::default();
        let logger = json_logger(&capture, false);
        let next: BoxedHandler = Arc::new(Raw { status: None, body: b"" });

        let writer = run(&logger, next, request(Method::GET, "/", &[], None)).await;

        assert!(writer.body().is_empty());
        assert_eq!(capture.entries()[0]["status"], 200);
    }

    #[tokio::test]
    async fn omits_fields_it_cannot_derive() {
        let capture = Capture::default();
        let logger = json_logger(&capture, true);

        let req = request(Method::GET, "/", &[("X-Request-Id", "")], None);
        run(&logger, hello.into_boxed_handler(), req).await;

        for entry in capture.entries() {
            assert!(entry.get("requestId").is_none(), "{entry}");
            assert!(entry.get("remoteAddr").is_none(), "{entry}");
        }
    }

    #[tokio::test]
    async fn default_formatter_is_plain_text() {
        let capture = Capture::default();
        let logger = LoggingMiddleware::new(LogOptions::default().writer(capture.clone()));

        let req = request(
            Method::GET,
            "/hello",
            &[("X-Request-Id", "abc123")],
            Some("10.0.0.5:1000"),
        );
        run(&logger, hello.into_boxed_handler(), req).await;

        let text = capture.text();
        let line = text.lines().next().unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(!line.contains('\u{1b}'), "colour codes in {line:?}");
        assert!(line.contains(" INFO "), "{line}");
        assert!(line.contains("completed handling request"), "{line}");
        assert!(line.contains("requestId=abc123"), "{line}");
        assert!(line.contains("remoteAddr=10.0.0.5"), "{line}");
        assert!(line.contains("status=200"), "{line}");
        assert!(line.contains("took="), "{line}");

        // RFC 3339 with whole seconds: 2026-10-16T09:12:44+02:00
        let stamp = line.split_whitespace().next().unwrap();
        assert_eq!(stamp.len(), 25, "{stamp}");
        assert_eq!(stamp.as_bytes()[10], b'T', "{stamp}");
        assert!(!stamp.contains('.'), "{stamp}");
    }

    #[tokio::test]
    async fn custom_timestamp_format() {
        let capture = Capture::default();
        let logger = LoggingMiddleware::new(
            LogOptions::default()
                .formatter(Formatter::Json(JsonFormatter {
                    timestamp_format: Some("%Y-%m-%d".to_owned()),
                }))
                .writer(capture.clone()),
        );

        run(&logger, hello.into_boxed_handler(), request(Method::GET, "/", &[], None)).await;

        let stamp = capture.entries()[0]["timestamp"].as_str().unwrap().to_owned();
        assert_eq!(stamp.len(), 10, "{stamp}");
    }

    #[tokio::test]
    async fn logs_into_a_supplied_dispatch() {
        let capture = Capture::default();
        let dispatch = Dispatch::new(
            tracing_subscriber::fmt()
                .json()
                .flatten_event(true)
                .with_writer(capture.clone())
                .finish(),
        );
        let logger = LoggingMiddleware::new(LogOptions::default().dispatch(dispatch));

        run(&logger, hello.into_boxed_handler(), request(Method::GET, "/", &[], None)).await;

        assert_eq!(capture.entries()[0]["message"], "completed handling request");
    }

    #[tokio::test]
    async fn logs_routed_requests() {
        let capture = Capture::default();
        let router = Router::new()
            .get("/hello", hello)
            .layer(json_logger(&capture, false));

        let (handler, _) = router.lookup(&Method::GET, "/hello").unwrap();
        let mut writer = BufferedWriter::new();
        let req = request(
            Method::GET,
            "/hello",
            &[("X-Request-Id", "abc123")],
            Some("10.0.0.5:1000"),
        );
        handler.call(req, &mut writer).await;

        let entry = &capture.entries()[0];
        assert_eq!(entry["requestId"], "abc123");
        assert_eq!(entry["remoteAddr"], "10.0.0.5");
        assert_eq!(entry["status"], 200);
        assert_eq!(writer.body(), b"hello!");
    }
}
