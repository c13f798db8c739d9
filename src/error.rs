//! Error types.
//!
//! Two very different things can go wrong in a guardrail service:
//!
//! - **Infrastructure** — binding the port, accepting a connection. These are
//!   [`Error`]s, returned from [`Server::serve`](crate::Server::serve).
//! - **Request path** — a handler or a middleware gives up on a request. Those
//!   travel outward through the chain as a [`Fault`](crate::Fault) until
//!   [`ErrorHandling`](crate::middleware::ErrorHandling) turns them into a
//!   response. [`HttpException`] is the one request-path error the framework
//!   itself knows how to render.

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::response::Response;

/// The error type returned by guardrail's fallible operations.
///
/// Application-level errors (404, 422, etc.) are not `Error`s: return them
/// from a handler as an [`HttpException`] or any other error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A framework-native HTTP error.
///
/// Carries its own status, a human-readable `detail`, and optional response
/// headers. It renders as `{"detail": "..."}` with that status, untouched by
/// the generic error shape:
///
/// ```rust
/// use guardrail::{HttpException, Request, Response};
///
/// async fn get_user(req: Request) -> Result<Response, HttpException> {
///     match req.param("id") {
///         Some("42") => Ok(Response::text("alice")),
///         _ => Err(HttpException::not_found("Resource not found")),
///     }
/// }
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status}: {detail}")]
pub struct HttpException {
    status: StatusCode,
    detail: String,
    headers: HeaderMap,
}

impl HttpException {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into(), headers: HeaderMap::new() }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    /// Adds a header to the rendered response (e.g. `WWW-Authenticate` on a 401).
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn detail(&self) -> &str { &self.detail }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// Renders the exception as `{"detail": ...}` with its own status and headers.
    pub fn to_response(&self) -> Response {
        let body = serde_json::json!({ "detail": self.detail });
        let mut response = Response::builder()
            .status(self.status)
            .json(body.to_string().into_bytes());
        for (name, value) in &self.headers {
            response.headers_mut().append(name, value.clone());
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_detail_with_own_status() {
        let response = HttpException::not_found("Resource not found")
            .with_header(HeaderName::from_static("x-reason"), HeaderValue::from_static("gone"))
            .to_response();

        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-reason"], "gone");
        assert_eq!(response.headers()["content-type"], "application/json");
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, serde_json::json!({ "detail": "Resource not found" }));
    }

    #[test]
    fn display_includes_status_and_detail() {
        let exc = HttpException::unauthorized("Unauthorized");
        assert_eq!(exc.to_string(), "401 Unauthorized: Unauthorized");
    }
}
