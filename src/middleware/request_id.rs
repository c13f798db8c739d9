//! Request identifier propagation.

use http::{HeaderName, HeaderValue};
use uuid::Uuid;

use super::{Middleware, Next, set_header};
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;

/// Tags every request with a unique identifier.
///
/// Reuses the inbound identifier header when the client (or a proxy in front)
/// already sent one; otherwise generates a UUID v4. The identifier is stored in
/// the [`RequestContext`](crate::RequestContext) for inner layers and handlers
/// (`req.request_id()`) and echoed back in the same header on the response,
/// error responses included.
pub struct RequestId {
    header: HeaderName,
}

impl RequestId {
    /// Uses `X-Request-ID`.
    pub fn new() -> Self {
        Self { header: HeaderName::from_static("x-request-id") }
    }

    /// Uses a custom header name, e.g. `X-Correlation-ID`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid header name.
    pub fn header(name: &str) -> Self {
        let header = HeaderName::from_bytes(name.as_bytes())
            .unwrap_or_else(|e| panic!("invalid request id header `{name}`: {e}"));
        Self { header }
    }
}

impl Default for RequestId {
    fn default() -> Self { Self::new() }
}

impl Middleware for RequestId {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let inbound = req.headers()
                .get(&self.header)
                .filter(|v| !v.is_empty())
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let id = inbound.unwrap_or_else(|| Uuid::new_v4().to_string());
            let id = req.context().set_request_id(id).to_owned();

            let mut outcome = next.run(req).await;

            // Inbound ids already passed header validation; fresh ones are hex.
            if let Ok(value) = HeaderValue::from_str(&id) {
                set_header(&mut outcome, self.header.clone(), value);
            }
            outcome
        })
    }
}
