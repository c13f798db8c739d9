//! OWASP response headers.

use http::header::{self, HeaderMap, HeaderName, HeaderValue};

use super::{Middleware, Next};
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;

const DEFAULT_HSTS_MAX_AGE: u64 = 31_536_000;

const DEFAULTS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "0"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("content-security-policy", "frame-ancestors 'none'"),
    ("cache-control", "no-store, max-age=0"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
];

/// Adds a fixed set of security headers to every response and strips headers
/// that fingerprint the server.
///
/// | Header | Default |
/// |---|---|
/// | `X-Content-Type-Options` | `nosniff` |
/// | `X-Frame-Options` | `DENY` |
/// | `X-XSS-Protection` | `0` |
/// | `Referrer-Policy` | `strict-origin-when-cross-origin` |
/// | `Content-Security-Policy` | `frame-ancestors 'none'` |
/// | `Cache-Control` | `no-store, max-age=0` |
/// | `Permissions-Policy` | `geolocation=(), microphone=(), camera=()` |
/// | `Strict-Transport-Security` | `max-age=31536000; includeSubDomains`, HTTPS only |
///
/// A header the handler already set is left alone, so a route can still opt
/// into e.g. `Cache-Control: public, max-age=3600`. `Server` and
/// `X-Powered-By` are removed before the table is applied. On faults the
/// strip-list travels with the fault, so it also covers headers added by
/// `HttpException::with_header` or by a custom error handler.
///
/// ```rust
/// use guardrail::middleware::SecurityHeaders;
///
/// // Defaults, with a stricter CSP and one extra header.
/// SecurityHeaders::new()
///     .header("content-security-policy", "default-src 'self'")
///     .header("cross-origin-opener-policy", "same-origin")
///     .hsts_max_age(63_072_000);
/// ```
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
    strip: Vec<HeaderName>,
    hsts_max_age: u64,
}

impl SecurityHeaders {
    /// The default table.
    pub fn new() -> Self {
        Self::with_headers(DEFAULTS.iter().copied())
    }

    /// Replaces the default table entirely with `headers`.
    ///
    /// # Panics
    ///
    /// Panics on an invalid header name or value.
    pub fn with_headers<'h>(headers: impl IntoIterator<Item = (&'h str, &'h str)>) -> Self {
        let mut this = Self {
            headers: Vec::new(),
            strip: vec![header::SERVER, HeaderName::from_static("x-powered-by")],
            hsts_max_age: DEFAULT_HSTS_MAX_AGE,
        };
        for (name, value) in headers {
            this = this.header(name, value);
        }
        this
    }

    /// Sets one header of the table, replacing a default of the same name.
    ///
    /// # Panics
    ///
    /// Panics on an invalid header name or value.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let (name, value) = parse_pair(name, value);
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Also strips `name` from every response.
    ///
    /// # Panics
    ///
    /// Panics on an invalid header name.
    pub fn strip(mut self, name: &str) -> Self {
        let name = HeaderName::from_bytes(name.as_bytes())
            .unwrap_or_else(|e| panic!("invalid header name `{name}`: {e}"));
        self.strip.push(name);
        self
    }

    /// `max-age` of the HSTS header sent on secure requests.
    pub fn hsts_max_age(mut self, seconds: u64) -> Self {
        self.hsts_max_age = seconds;
        self
    }

    fn apply(&self, headers: &mut HeaderMap, secure: bool) {
        for name in &self.strip {
            headers.remove(name);
        }
        for (name, value) in &self.headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        if secure && !headers.contains_key(header::STRICT_TRANSPORT_SECURITY) {
            let hsts = format!("max-age={}; includeSubDomains", self.hsts_max_age);
            if let Ok(value) = HeaderValue::from_str(&hsts) {
                headers.insert(header::STRICT_TRANSPORT_SECURITY, value);
            }
        }
    }
}

impl Default for SecurityHeaders {
    fn default() -> Self { Self::new() }
}

impl Middleware for SecurityHeaders {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let secure = req.is_secure();
            let mut outcome = next.run(req).await;
            match &mut outcome {
                Ok(response) => self.apply(response.headers_mut(), secure),
                Err(fault) => {
                    self.apply(fault.headers_mut(), secure);
                    for name in &self.strip {
                        fault.strip_header(name.clone());
                    }
                }
            }
            outcome
        })
    }
}

fn parse_pair(name: &str, value: &str) -> (HeaderName, HeaderValue) {
    let header = HeaderName::from_bytes(name.as_bytes())
        .unwrap_or_else(|e| panic!("invalid header name `{name}`: {e}"));
    let value = HeaderValue::from_str(value)
        .unwrap_or_else(|e| panic!("invalid value for header `{name}`: {e}"));
    (header, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpException;
    use crate::fault::Fault;
    use crate::middleware::ErrorHandling;
    use crate::middleware::test_support::{call, get, request};
    use crate::response::Response;
    use crate::router::Router;

    const SECURITY: &[&str] = &[
        "x-content-type-options",
        "x-frame-options",
        "referrer-policy",
        "content-security-policy",
        "cache-control",
        "permissions-policy",
    ];

    async fn ok(_req: Request) -> &'static str { "ok" }

    async fn leaky(_req: Request) -> Response {
        Response::builder()
            .header("server", "uvicorn")
            .header("x-powered-by", "Express")
            .text("ok")
    }

    async fn own_cache(_req: Request) -> Response {
        Response::builder().header("cache-control", "public, max-age=3600").text("ok")
    }

    async fn own_hsts(_req: Request) -> Response {
        Response::builder().header("strict-transport-security", "max-age=99999").text("ok")
    }

    async fn fail(_req: Request) -> Result<Response, Fault> {
        Err(Fault::from(std::fmt::Error))
    }

    async fn leaky_error(_req: Request) -> Result<Response, HttpException> {
        Err(HttpException::unauthorized("Not authenticated")
            .with_header(header::SERVER, HeaderValue::from_static("nginx")))
    }

    fn app(layer: SecurityHeaders) -> Router {
        Router::new()
            .get("/test", ok)
            .get("/leaky", leaky)
            .get("/cache", own_cache)
            .get("/hsts", own_hsts)
            .get("/fail", fail)
            .get("/leaky-error", leaky_error)
            .layer(layer)
    }

    #[tokio::test]
    async fn adds_every_default_exactly_once() {
        let response = call(&app(SecurityHeaders::new()), get("/test")).await;
        let headers = response.headers();

        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
        assert_eq!(headers["content-security-policy"], "frame-ancestors 'none'");
        assert_eq!(headers["cache-control"], "no-store, max-age=0");
        assert_eq!(headers["permissions-policy"], "geolocation=(), microphone=(), camera=()");
        for name in SECURITY {
            assert_eq!(headers.get_all(*name).iter().count(), 1, "{name}");
        }
    }

    #[tokio::test]
    async fn strips_server_identification() {
        let response = call(&app(SecurityHeaders::new()), get("/leaky")).await;
        assert!(!response.headers().contains_key("server"));
        assert!(!response.headers().contains_key("x-powered-by"));
    }

    #[tokio::test]
    async fn hsts_only_over_https() {
        let app = app(SecurityHeaders::new());

        let response = call(&app, get("/test")).await;
        assert!(!response.headers().contains_key("strict-transport-security"));

        let response = call(&app, request(http::Request::get("/test").header("X-Forwarded-Proto", "https"))).await;
        assert_eq!(response.headers()["strict-transport-security"], "max-age=31536000; includeSubDomains");
    }

    #[tokio::test]
    async fn hsts_max_age_is_configurable() {
        let app = app(SecurityHeaders::new().hsts_max_age(600));
        let response = call(&app, request(http::Request::get("https://example.com/test"))).await;
        assert_eq!(response.headers()["strict-transport-security"], "max-age=600; includeSubDomains");
    }

    #[tokio::test]
    async fn handler_headers_win() {
        let app = app(SecurityHeaders::new());

        let response = call(&app, get("/cache")).await;
        assert_eq!(response.headers()["cache-control"], "public, max-age=3600");
        assert!(response.headers().contains_key("content-security-policy"));

        let response = call(&app, request(http::Request::get("/hsts").header("X-Forwarded-Proto", "https"))).await;
        assert_eq!(response.headers()["strict-transport-security"], "max-age=99999");
        assert_eq!(response.headers().get_all("strict-transport-security").iter().count(), 1);
    }

    #[tokio::test]
    async fn overrides_merge_into_defaults() {
        let layer = SecurityHeaders::new()
            .header("Cache-Control", "no-cache")
            .header("X-Custom-Header", "custom-value");
        let response = call(&app(layer), get("/test")).await;

        assert_eq!(response.headers()["cache-control"], "no-cache");
        assert_eq!(response.headers()["x-custom-header"], "custom-value");
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn with_headers_replaces_defaults() {
        let layer = SecurityHeaders::with_headers([
            ("Cache-Control", "no-cache"),
            ("Content-Security-Policy", "default-src 'self'"),
        ]);
        let response = call(&app(layer), get("/test")).await;

        assert_eq!(response.headers()["cache-control"], "no-cache");
        assert_eq!(response.headers()["content-security-policy"], "default-src 'self'");
        assert!(!response.headers().contains_key("x-frame-options"));
        assert!(!response.headers().contains_key("referrer-policy"));
    }

    #[test]
    fn extra_strip_names() {
        let layer = SecurityHeaders::new().strip("x-aspnet-version");
        let mut headers = HeaderMap::new();
        headers.insert("x-aspnet-version", HeaderValue::from_static("4.0"));
        layer.apply(&mut headers, false);
        assert!(!headers.contains_key("x-aspnet-version"));
    }

    #[tokio::test]
    async fn faults_carry_the_headers() {
        let response = call(&app(SecurityHeaders::new()), get("/fail")).await;
        assert_eq!(response.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
        for name in SECURITY {
            assert!(response.headers().contains_key(*name), "{name}");
        }
    }

    #[tokio::test]
    async fn strips_headers_set_by_error_responses() {
        let bare = app(SecurityHeaders::new());
        let handled = app(SecurityHeaders::new()).layer(ErrorHandling::new());
        let rewritten = app(SecurityHeaders::new()).layer(ErrorHandling::new().catch::<std::fmt::Error>(
            |_fault, _req| Response::builder().status(http::StatusCode::BAD_GATEWAY).header("x-powered-by", "Express").text("upstream"),
        ));

        for app in [&bare, &handled] {
            let response = call(app, get("/leaky-error")).await;
            assert_eq!(response.status_code(), http::StatusCode::UNAUTHORIZED);
            assert!(!response.headers().contains_key("server"));
            assert_eq!(response.headers()["x-frame-options"], "DENY");
        }

        let response = call(&rewritten, get("/fail")).await;
        assert_eq!(response.status_code(), http::StatusCode::BAD_GATEWAY);
        assert!(!response.headers().contains_key("x-powered-by"));
    }

    #[test]
    #[should_panic(expected = "invalid header name")]
    fn invalid_names_panic_at_wiring() {
        let _ = SecurityHeaders::new().header("bad name", "x");
    }
}
