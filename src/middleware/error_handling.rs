//! Centralised error-to-response translation.
//!
//! # Resolution order
//!
//! When the inner chain fails, the first rule that applies produces the
//! response. A panicking handler already arrives here as a
//! [`Panic`](crate::Panic) fault, having passed through every inner layer
//! like any other error; a panic raised by a middleware layer itself is
//! caught here.
//!
//!
//! 1. **Custom handler.** Handlers registered with [`ErrorHandling::catch`]
//!    form a priority list. The fault's own error is offered to every handler
//!    in registration order, then each error of its `source()` chain in turn.
//!    A direct type match therefore always beats a match on a wrapped cause,
//!    and a handler registered for [`HttpException`] overrides rule 2.
//! 2. **`HttpException` passthrough.** Rendered with its detail and headers,
//!    and its own status unless the fault carries an explicit one.
//! 3. **Generic fallback.** Logged at `ERROR`, rendered as
//!    `{"error": <type>, "message": <display>, "request_id": <id|null>}` with
//!    status 500 (or the status set via [`Fault::with_status`]).
//!
//! Whatever the rule, headers that inner layers attached to the fault (request
//! id, timing, security headers) are merged into the response.

use std::error::Error as StdError;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::Method;
use tracing::{debug, error};

use super::{Middleware, Next};
use crate::error::HttpException;
use crate::fault::Fault;
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;
use crate::response::Response;

/// What a custom error handler knows about the failed request.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    request_id: Option<String>,
    method: Method,
    path: String,
}

impl ErrorContext {
    /// Set when a [`RequestId`](super::RequestId) layer ran inside this one.
    pub fn request_id(&self) -> Option<&str> { self.request_id.as_deref() }
    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
}

trait Catch: Send + Sync {
    fn respond(&self, error: &(dyn StdError + 'static), ctx: &ErrorContext) -> Option<Response>;
}

struct Typed<E, F> {
    handler: F,
    _error: PhantomData<fn(&E)>,
}

impl<E, F> Catch for Typed<E, F>
where
    E: StdError + 'static,
    F: Fn(&E, &ErrorContext) -> Response + Send + Sync,
{
    fn respond(&self, error: &(dyn StdError + 'static), ctx: &ErrorContext) -> Option<Response> {
        error.downcast_ref::<E>().map(|e| (self.handler)(e, ctx))
    }
}

/// Catches every fault and panic raised inside it and answers with JSON.
///
/// Install it outermost so that everything, including the other layers, is
/// covered:
///
/// ```rust
/// use guardrail::middleware::ErrorHandling;
/// use guardrail::{IntoResponse, Json, StatusCode};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("{0}")]
/// struct ValueError(String);
///
/// let errors = ErrorHandling::new()
///     .catch::<ValueError>(|err, _ctx| {
///         let body = serde_json::json!({ "custom_error": "bad_request", "details": err.0 });
///         (StatusCode::BAD_REQUEST, Json(body)).into_response()
///     });
/// ```
///
/// `include_traceback` adds a `"traceback"` field with the source chain (and
/// the backtrace when `RUST_BACKTRACE` is set). It is off by default and must
/// stay off in production: it hands internals to whoever triggers an error.
pub struct ErrorHandling {
    include_traceback: bool,
    handlers: Vec<Box<dyn Catch>>,
}

impl ErrorHandling {
    pub fn new() -> Self {
        Self { include_traceback: false, handlers: Vec::new() }
    }

    /// Development only.
    pub fn include_traceback(mut self, include: bool) -> Self {
        self.include_traceback = include;
        self
    }

    /// Registers `handler` for errors of type `E`, whether raised directly or
    /// found in a fault's source chain. Earlier registrations take priority
    /// at the same depth.
    pub fn catch<E>(
        mut self,
        handler: impl Fn(&E, &ErrorContext) -> Response + Send + Sync + 'static,
    ) -> Self
    where
        E: StdError + 'static,
    {
        self.handlers.push(Box::new(Typed { handler, _error: PhantomData }));
        self
    }

    fn render(&self, fault: Fault, ctx: &ErrorContext) -> Response {
        for (depth, error) in fault.chain().enumerate() {
            for catch in &self.handlers {
                if let Some(response) = catch.respond(error, ctx) {
                    debug!(error_type = fault.type_name(), depth, "fault handled by custom handler");
                    return fault.decorate(response);
                }
            }
        }

        if let Some(exc) = fault.downcast_ref::<HttpException>() {
            let mut response = exc.to_response();
            response.status = fault.status();
            return fault.decorate(response);
        }

        error!(
            request_id = ctx.request_id().unwrap_or("N/A"),
            method = %ctx.method,
            path = %ctx.path,
            error_type = fault.type_name(),
            "request failed: {fault}"
        );

        let mut body = serde_json::json!({
            "error": fault.type_name(),
            "message": fault.message(),
            "request_id": ctx.request_id(),
        });
        if self.include_traceback {
            body["traceback"] = fault.traceback().into();
        }
        let response = Response::builder()
            .status(fault.status())
            .json(body.to_string());
        fault.decorate(response)
    }
}

impl Default for ErrorHandling {
    fn default() -> Self { Self::new() }
}

impl Middleware for ErrorHandling {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let context = req.context().clone();
            let method = req.method().clone();
            let path = req.path().to_owned();

            let fault = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(fault)) => fault,
                Err(panic) => Fault::from_panic(panic),
            };

            let ctx = ErrorContext {
                request_id: context.request_id().map(str::to_owned),
                method,
                path,
            };
            Ok(self.render(fault, &ctx))
        })
    }
}
