//! Cross-Origin Resource Sharing, backed by `tower_http`'s `CorsLayer`.

use std::convert::Infallible;
use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, ORIGIN, VARY};
use http::Method;
use tower::{Layer, ServiceExt, service_fn};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};

use super::{Middleware, Next};
use crate::fault::Fault;
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;
use crate::response::Response;

enum Allowed<T> {
    Any,
    List(Vec<T>),
}

impl<T> Allowed<T> {
    /// `*` anywhere in the list allows everything.
    fn parse<I, S>(items: I, what: &str, parse: impl Fn(&str) -> Option<T>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Vec::new();
        for item in items {
            let item = item.as_ref().trim();
            if item == "*" {
                return Self::Any;
            }
            match parse(item) {
                Some(value) => list.push(value),
                None => panic!("invalid CORS {what} `{item}`"),
            }
        }
        Self::List(list)
    }
}

/// CORS handling.
///
/// Defaults are permissive (any origin, method and header, credentials
/// allowed), so production services should list their origins:
///
/// ```rust
/// use guardrail::middleware::Cors;
///
/// Cors::new()
///     .allow_origins(["http://localhost:3000", "http://localhost:5173"])
///     .allow_methods(["GET", "POST"])
///     .expose_headers(["x-request-id"]);
/// ```
///
/// The protocol itself is [`tower_http::cors::CorsLayer`]; this type only
/// configures it and runs it inside the guardrail chain:
///
/// - A **preflight** (`OPTIONS` with `Origin`) is answered by the layer with
///   `200 OK` and never reaches the handler.
/// - A **cross-origin request** runs normally and its response, or fault,
///   gets the `Access-Control-*` and `Vary` headers.
/// - An origin that is not allowed gets no `Access-Control-Allow-Origin`,
///   which browsers treat as a rejection.
/// - Requests without `Origin` pass through untouched.
///
/// Browsers refuse a literal `*` on credentialed requests, so while
/// credentials are allowed a wildcard is answered by mirroring the request's
/// origin, method and headers.
pub struct Cors {
    origins: Allowed<HeaderValue>,
    methods: Allowed<Method>,
    headers: Allowed<HeaderName>,
    allow_credentials: bool,
    expose_headers: Vec<HeaderName>,
    max_age: Duration,
    layer: OnceLock<CorsLayer>,
}

impl Cors {
    pub fn new() -> Self {
        Self {
            origins: Allowed::Any,
            methods: Allowed::Any,
            headers: Allowed::Any,
            allow_credentials: true,
            expose_headers: Vec::new(),
            max_age: Duration::from_secs(600),
            layer: OnceLock::new(),
        }
    }

    /// # Panics
    ///
    /// Panics if an origin is not a valid header value.
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.origins = Allowed::parse(origins, "origin", |o| HeaderValue::from_str(o).ok());
        self
    }

    /// # Panics
    ///
    /// Panics on an invalid method name.
    pub fn allow_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.methods = Allowed::parse(methods, "method", |m| {
            Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok()
        });
        self
    }

    /// # Panics
    ///
    /// Panics on an invalid header name.
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.headers = Allowed::parse(headers, "header", |h| HeaderName::from_bytes(h.as_bytes()).ok());
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// # Panics
    ///
    /// Panics on an invalid header name.
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.expose_headers = headers
            .into_iter()
            .map(|h| {
                let h = h.as_ref();
                HeaderName::from_bytes(h.as_bytes())
                    .unwrap_or_else(|e| panic!("invalid CORS header `{h}`: {e}"))
            })
            .collect();
        self
    }

    /// How long browsers may cache a preflight answer, in seconds.
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Duration::from_secs(seconds);
        self
    }

    fn cors_layer(&self) -> &CorsLayer {
        self.layer.get_or_init(|| {
            let mirror = self.allow_credentials;
            let origins = match &self.origins {
                Allowed::Any if mirror => AllowOrigin::mirror_request(),
                Allowed::Any => AllowOrigin::any(),
                Allowed::List(list) => AllowOrigin::list(list.clone()),
            };
            let methods = match &self.methods {
                Allowed::Any if mirror => AllowMethods::mirror_request(),
                Allowed::Any => AllowMethods::any(),
                Allowed::List(list) => AllowMethods::list(list.clone()),
            };
            let headers = match &self.headers {
                Allowed::Any if mirror => AllowHeaders::mirror_request(),
                Allowed::Any => AllowHeaders::any(),
                Allowed::List(list) => AllowHeaders::list(list.clone()),
            };

            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(methods)
                .allow_headers(headers)
                .allow_credentials(self.allow_credentials)
                .expose_headers(ExposeHeaders::list(self.expose_headers.clone()))
                .max_age(self.max_age)
        })
    }
}

impl Default for Cors {
    fn default() -> Self { Self::new() }
}

impl Middleware for Cors {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            if !req.headers().contains_key(ORIGIN) {
                return next.run(req).await;
            }

            let endpoint = service_fn(move |req: http::Request<Bytes>| {
                let inner = next.clone().run(Request::new(req));
                async move { Ok::<_, Infallible>(into_http(inner.await)) }
            });

            match self.cors_layer().layer(endpoint).oneshot(req.into_http()).await {
                Ok(response) => from_http(response),
                Err(never) => match never {},
            }
        })
    }
}

/// Response body as seen by the tower layer: a fault rides through it in
/// place of a body and gets the CORS headers on the way back.
#[derive(Default)]
enum Payload {
    #[default]
    Empty,
    Body(Bytes),
    Fault(Fault),
}

fn into_http(outcome: Outcome) -> http::Response<Payload> {
    match outcome {
        Ok(response) => {
            let mut res = http::Response::new(Payload::Body(response.body));
            *res.status_mut() = response.status;
            *res.headers_mut() = response.headers;
            res
        }
        Err(fault) => {
            let status = fault.status();
            let mut res = http::Response::new(Payload::Fault(fault));
            *res.status_mut() = status;
            res
        }
    }
}

fn from_http(res: http::Response<Payload>) -> Outcome {
    let (parts, payload) = res.into_parts();
    let body = match payload {
        Payload::Empty => Bytes::new(),
        Payload::Body(body) => body,
        Payload::Fault(mut fault) => {
            let headers = fault.headers_mut();
            for name in parts.headers.keys() {
                if name != VARY {
                    headers.remove(name);
                }
                for value in parts.headers.get_all(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
            return Err(fault);
        }
    };
    Ok(Response { body, headers: parts.headers, status: parts.status })
}
