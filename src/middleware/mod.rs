//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. Each layer implements one method:
//!
//! ```text
//! handle(request, next) -> Outcome
//! ```
//!
//! It may inspect or modify the request, call `next.run(request)` to delegate
//! to the layers inside it, then inspect or modify the [`Outcome`] on the way
//! back. Layers form a plain ordered list; the router endpoint sits after the
//! innermost one.
//!
//! # Built-in layers, outermost first
//!
//! | Layer | Does |
//! |---|---|
//! | [`ErrorHandling`] | turns faults and panics into JSON error responses |
//! | [`Cors`] | answers preflights, adds `Access-Control-*` headers |
//! | [`SecurityHeaders`] | adds OWASP headers, strips `Server` / `X-Powered-By` |
//! | [`RequestId`] | reuses or generates `X-Request-ID` |
//! | [`RequestTiming`] | adds `X-Process-Time` |
//! | [`Logging`] | one structured event per request |
//! | [`Gzip`] | compresses large bodies |
//!
//! [`Router::with_essentials`](crate::Router::with_essentials) installs all
//! of them in this order.
//!
//! # Writing a layer
//!
//! ```rust
//! use guardrail::middleware::{Middleware, Next};
//! use guardrail::{BoxFuture, Outcome, Request};
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
//!         Box::pin(async move {
//!             let mut response = next.run(req).await?;
//!             response.headers_mut().insert("x-served-by", "guardrail".parse().unwrap());
//!             Ok(response)
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;
use crate::router::Router;

mod cors;
mod error_handling;
mod essentials;
mod gzip;
mod logging;
mod request_id;
mod security;
mod timing;

pub use cors::Cors;
pub use error_handling::{ErrorContext, ErrorHandling};
pub use essentials::Essentials;
pub use gzip::Gzip;
pub use logging::Logging;
pub use request_id::RequestId;
pub use security::SecurityHeaders;
pub use timing::RequestTiming;

/// One layer of the request pipeline.
///
/// Instances are shared by every connection task, so `&self` is all a layer
/// gets: configuration is fixed at wiring time and per-request state lives in
/// the [`Request`] and its [`RequestContext`](crate::RequestContext).
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

/// The rest of the chain, from the point of view of one layer.
///
/// Cheap to clone; a layer that needs to hand the chain to a `tower` service
/// clones it into the service closure.
#[derive(Clone)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    router: &'a Router,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], router: &'a Router) -> Self {
        Self { chain, router }
    }

    /// Runs the remaining layers, then the matched route handler.
    pub fn run(self, req: Request) -> BoxFuture<'a, Outcome> {
        match self.chain.split_first() {
            Some((layer, rest)) => layer.handle(req, Next { chain: rest, router: self.router }),
            None => self.router.route(req),
        }
    }
}

/// Sets `name: value` on the successful response, or attaches it to the
/// fault so the rendered error response carries it too.
pub(crate) fn set_header(outcome: &mut Outcome, name: http::HeaderName, value: http::HeaderValue) {
    let headers = match outcome {
        Ok(response) => response.headers_mut(),
        Err(fault) => fault.headers_mut(),
    };
    headers.insert(name, value);
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers shared by the middleware unit tests.

    use std::io;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use tracing_subscriber::fmt::MakeWriter;

    use crate::request::Request;
    use crate::response::Response;
    use crate::router::Router;

    pub(crate) fn get(uri: &str) -> Request {
        Request::new(http::Request::get(uri).body(Bytes::new()).unwrap())
    }

    pub(crate) fn request(builder: http::request::Builder) -> Request {
        Request::new(builder.body(Bytes::new()).unwrap())
    }

    pub(crate) async fn call(router: &Router, req: Request) -> Response {
        router.call(req).await
    }

    pub(crate) fn json(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.body()).expect("response body is JSON")
    }

    /// In-memory sink for a `tracing_subscriber::fmt` subscriber.
    #[derive(Clone, Default)]
    pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        /// Installs a subscriber writing into this buffer for the current
        /// thread until the guard drops.
        pub(crate) fn install(&self) -> tracing::subscriber::DefaultGuard {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::TRACE)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        pub(crate) fn lines(&self) -> Vec<String> {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf).lines().map(str::to_owned).collect()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    impl<'w> MakeWriter<'w> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'w self) -> Self::Writer { self.clone() }
    }
}
