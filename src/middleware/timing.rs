//! Request timing.

use std::time::Instant;

use http::{HeaderName, HeaderValue};

use super::{Middleware, Next, set_header};
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;

/// Reports how long the inner chain took, in seconds with four decimals, as
/// `X-Process-Time: 0.0123`.
///
/// The clock starts right before this layer delegates inward, so the value
/// covers every layer inside it plus the handler. Faults get the header too.
pub struct RequestTiming {
    header: HeaderName,
}

impl RequestTiming {
    /// Uses `X-Process-Time`.
    pub fn new() -> Self {
        Self { header: HeaderName::from_static("x-process-time") }
    }

    /// # Panics
    ///
    /// Panics if `name` is not a valid header name.
    pub fn header(name: &str) -> Self {
        let header = HeaderName::from_bytes(name.as_bytes())
            .unwrap_or_else(|e| panic!("invalid timing header `{name}`: {e}"));
        Self { header }
    }
}

impl Default for RequestTiming {
    fn default() -> Self { Self::new() }
}

impl Middleware for RequestTiming {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let start = Instant::now();
            let mut outcome = next.run(req).await;
            let elapsed = start.elapsed().as_secs_f64();

            if let Ok(value) = HeaderValue::from_str(&format!("{elapsed:.4}")) {
                set_header(&mut outcome, self.header.clone(), value);
            }
            outcome
        })
    }
}
