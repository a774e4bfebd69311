//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in a single
//! `HashMap<Method, Tree>`, and middleware must be able to wrap any of them
//! without knowing their concrete type. Both needs are met by one trait
//! object, [`ErasedHandler`], stored as a [`BoxedHandler`].
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.get("/hello", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← stored as BoxedHandler
//!        ↓  middleware.wrap(handler) per layer      ← still a BoxedHandler
//! handler.call(req, &mut writer)                   ← one vtable dispatch per layer
//!        ↓
//! hello(req).await.into_response().write_to(writer)
//! ```
//!
//! Handlers return values; the framework turns them into writes. Only
//! [`ErasedHandler`] implementors (middleware, mostly) touch the writer
//! directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::IntoResponse;
use crate::writer::ResponseWriter;

// ── Dispatch types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that finishes once the response has
/// been written.
///
/// It borrows the handler and the writer for `'a`, so a middleware can hand
/// its inner handler a wrapper that lives on its own stack frame.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// The shape every handler takes once erased: take a request, write a
/// response.
///
/// Implement this directly when you need the writer itself, which is what
/// middleware does to observe or decorate a response.
pub trait ErasedHandler {
    fn call<'a>(&'a self, req: Request, writer: &'a mut dyn ResponseWriter) -> BoxFuture<'a>;
}

/// A type-erased handler shared across concurrent requests.
///
/// `Arc` gives cheap, thread-safe shared ownership (one atomic reference
/// count increment per request) without copying the handler.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// The trait is **sealed** (via the private `Sealed` supertrait): only the
/// blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call<'a>(&'a self, req: Request, writer: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response().write_to(writer) })
    }
}
