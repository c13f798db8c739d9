//! Request-path errors.
//!
//! A handler that returns `Err(e)` (or uses `?`) hands its error to the
//! middleware chain as a [`Fault`]. The fault then bubbles outward: layers
//! that decorate responses (request id, timing, security headers, CORS) attach
//! their headers to the fault instead, so whichever layer finally renders it
//! produces a response that still carries them.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt::{self, Write as _};

use http::{HeaderMap, HeaderName, StatusCode};

use crate::error::HttpException;
use crate::response::Response;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A type-erased error raised somewhere inside the middleware chain.
///
/// Any `std::error::Error + Send + Sync + 'static` converts into a `Fault`, so
/// `?` works in handlers returning `Result<_, Fault>`:
///
/// ```rust
/// use guardrail::{Fault, Request, Response};
///
/// async fn parse(req: Request) -> Result<Response, Fault> {
///     let n: u32 = req.param("n").unwrap_or("").parse()?;
///     Ok(Response::text(format!("{}", n * 2)))
/// }
/// ```
///
/// `Fault` deliberately does not implement `std::error::Error` itself; that
/// would collide with the blanket `From` conversion.
#[derive(Debug)]
pub struct Fault {
    error: BoxError,
    type_name: &'static str,
    status: Option<StatusCode>,
    backtrace: Backtrace,
    headers: HeaderMap,
    strip: Vec<HeaderName>,
}

/// A panic caught in a route handler, or in a layer by
/// [`ErrorHandling`](crate::middleware::ErrorHandling).
///
/// Register a handler for it with `.catch::<Panic>(…)` to customise the
/// response to a panicking handler.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Panic(pub String);

impl Fault {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            error: Box::new(error),
            type_name: short_type_name(std::any::type_name::<E>()),
            status: None,
            backtrace: Backtrace::capture(),
            headers: HeaderMap::new(),
            strip: Vec::new(),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_owned()
        };
        Self::new(Panic(message))
    }

    /// Overrides the status used by the generic error response.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Short name of the original error type, e.g. `ParseIntError`.
    pub fn type_name(&self) -> &str { self.type_name }

    /// The original error's `Display` output.
    pub fn message(&self) -> String { self.error.to_string() }

    pub fn error(&self) -> &(dyn StdError + 'static) { &*self.error }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    /// The error followed by its `source()` chain, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        std::iter::successors(Some(self.error()), |&e| e.source())
    }

    /// The status this fault resolves to when nothing more specific handles it:
    /// the explicit status, the status of an [`HttpException`], or 500.
    pub fn status(&self) -> StatusCode {
        self.status
            .or_else(|| self.downcast_ref::<HttpException>().map(HttpException::status))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn backtrace(&self) -> &Backtrace { &self.backtrace }

    /// Response headers attached by the layers this fault has passed through.
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// Human-readable dump for development: type, message, source chain and,
    /// when `RUST_BACKTRACE` enabled capturing, the backtrace.
    pub fn traceback(&self) -> String {
        let mut out = format!("{}: {}", self.type_name, self.error);
        let mut sources = self.chain().skip(1).peekable();
        if sources.peek().is_some() {
            out.push_str("\n\nCaused by:");
            for (i, source) in sources.enumerate() {
                let _ = write!(out, "\n    {i}: {source}");
            }
        }
        if self.backtrace.status() == BacktraceStatus::Captured {
            let _ = write!(out, "\n\nBacktrace:\n{}", self.backtrace);
        }
        out
    }

    /// Removes `name` from whatever response this fault is rendered into,
    /// including headers an error handler sets itself.
    pub fn strip_header(&mut self, name: HeaderName) {
        self.strip.push(name);
    }

    /// Merges the attached headers into `response`; headers the response
    /// already has win. Stripped headers are removed afterwards.
    pub fn decorate(&self, mut response: Response) -> Response {
        let headers = response.headers_mut();
        merge_absent(headers, &self.headers);
        for name in &self.strip {
            headers.remove(name);
        }
        response
    }

    /// Last-resort rendering, used when no `ErrorHandling` layer is installed.
    ///
    /// An [`HttpException`] keeps its own body, under the explicit status if
    /// one was set; anything else becomes a bare status with its canonical
    /// reason phrase, leaking nothing.
    pub fn into_response(self) -> Response {
        let response = match self.downcast_ref::<HttpException>() {
            Some(exc) => {
                let mut response = exc.to_response();
                response.status = self.status();
                response
            }
            None => {
                let status = self.status();
                Response::builder()
                    .status(status)
                    .text(status.canonical_reason().unwrap_or("Error"))
            }
        };
        self.decorate(response)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.error)
    }
}

impl<E> From<E> for Fault
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

/// Copies every header of `from` whose name is not yet present in `into`.
pub(crate) fn merge_absent(into: &mut HeaderMap, from: &HeaderMap) {
    for name in from.keys() {
        if into.contains_key(name) {
            continue;
        }
        for value in from.get_all(name) {
            into.append(name.clone(), value.clone());
        }
    }
}

/// `core::num::error::ParseIntError` → `ParseIntError`,
/// `my_app::Wrapper<u8>` → `Wrapper`.
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
