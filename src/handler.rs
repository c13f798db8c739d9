//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in one
//! `HashMap<Method, Tree>`, so every handler is hidden behind a trait object
//! (`dyn ErasedHandler`):
//!
//! ```text
//! async fn hello(req: Request) -> Result<Json<T>, E> { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                                 ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                                 ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time                         ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(req).await.into_outcome() })       ← BoxFuture<Outcome>
//! ```
//!
//! Handlers resolve to an [`Outcome`]: either a response, or a
//! [`Fault`] that the middleware chain carries outward to error translation.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;

use crate::fault::Fault;
use crate::request::Request;
use crate::response::{IntoResponse, Json, Response};

/// What every handler and middleware resolves to.
pub type Outcome = Result<Response, Fault>;

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` because the runtime polls the future in place; `Send` so
/// tokio may move it across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<'static, Outcome>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Handler output ────────────────────────────────────────────────────────────

/// Anything a handler may return.
///
/// Response-like values ([`Response`], `String`, `&'static str`,
/// [`StatusCode`], [`Json`], `(StatusCode, R)`) always succeed. A
/// `Result<R, E>` fails with a [`Fault`] when `E` converts into one — any
/// `std::error::Error + Send + Sync + 'static`, or `Fault` itself.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl<R, E> IntoOutcome for Result<R, E>
where
    R: IntoResponse,
    E: Into<Fault>,
{
    fn into_outcome(self) -> Outcome {
        self.map(IntoResponse::into_response).map_err(Into::into)
    }
}

macro_rules! infallible_outcome {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOutcome for $ty {
                fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
            }
        )*
    };
}

infallible_outcome!(Response, String, &'static str, StatusCode);

impl<T: serde::Serialize> IntoOutcome for Json<T> {
    fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
}

impl<R: IntoResponse> IntoOutcome for (StatusCode, R) {
    fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoOutcome
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    /// A panicking handler resolves to a [`Panic`](crate::Panic) fault, so
    /// every layer still sees an ordinary `Err` on the way out.
    fn call(&self, req: Request) -> BoxFuture<'static, Outcome> {
        let fut = match catch_unwind(AssertUnwindSafe(|| (self.0)(req))) {
            Ok(fut) => fut,
            Err(panic) => {
                let fault = Fault::from_panic(panic);
                return Box::pin(async move { Err(fault) });
            }
        };
        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(output) => output.into_outcome(),
                Err(panic) => Err(Fault::from_panic(panic)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpException;

    fn request() -> Request {
        Request::new(http::Request::get("/").body(bytes::Bytes::new()).unwrap())
    }

    async fn ok(_req: Request) -> &'static str { "ok" }

    async fn failing(_req: Request) -> Result<Response, HttpException> {
        Err(HttpException::not_found("missing"))
    }

    async fn with_question_mark(_req: Request) -> Result<String, Fault> {
        let n: u8 = "nope".parse()?;
        Ok(n.to_string())
    }

    #[tokio::test]
    async fn infallible_handlers_respond() {
        let response = ok.into_boxed_handler().call(request()).await.unwrap();
        assert_eq!(response.body().as_ref(), b"ok");
    }

    async fn panics(_req: Request) -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn panics_become_faults() {
        let fault = panics.into_boxed_handler().call(request()).await.unwrap_err();
        assert_eq!(fault.type_name(), "Panic");
        assert_eq!(fault.message(), "handler exploded");

        let eager = |_req: Request| -> std::future::Ready<&'static str> { panic!("before any await") };
        let fault = eager.into_boxed_handler().call(request()).await.unwrap_err();
        assert_eq!(fault.message(), "before any await");
        assert_eq!(fault.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn errors_become_faults() {
        let fault = failing.into_boxed_handler().call(request()).await.unwrap_err();
        assert_eq!(fault.status(), StatusCode::NOT_FOUND);

        let fault = with_question_mark.into_boxed_handler().call(request()).await.unwrap_err();
        assert_eq!(fault.type_name(), "ParseIntError");
    }
}
