//! Radix-tree request router and middleware stack.
//!
//! One tree per HTTP method, O(path-length) lookup. The router also owns the
//! middleware stack: every request, matched or not, goes through all layers
//! before (and after) the route handler runs.

use std::collections::HashMap;
use std::sync::Arc;

use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::error;

use crate::error::HttpException;
use crate::handler::{BoxFuture, BoxedHandler, Handler, Outcome};
use crate::middleware::{Essentials, Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Registrations and layers chain:
///
/// ```rust
/// use guardrail::middleware::{ErrorHandling, RequestId};
/// use guardrail::{Request, Router};
///
/// async fn hello(_req: Request) -> &'static str { "hello" }
///
/// let app = Router::new()
///     .get("/", hello)
///     .layer(RequestId::new())
///     .layer(ErrorHandling::new());    // added last, runs first
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    /// Outermost layer first.
    layers: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), layers: Vec::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax — `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Wraps everything registered so far in `middleware`.
    ///
    /// The most recently added layer is the outermost: it sees the request
    /// first and the response last.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.insert(0, Arc::new(middleware));
        self
    }

    /// Installs the recommended stack (error handling, CORS, security headers,
    /// request id, timing, logging, gzip) around the current layers.
    pub fn with_essentials(self, config: Essentials) -> Self {
        config.apply(self)
    }

    /// Runs one request through every layer and the matched handler.
    ///
    /// Never fails: a fault that escapes every layer is rendered here, which is
    /// also what the server sends on the wire.
    pub async fn call(&self, req: impl Into<Request>) -> Response {
        let req = req.into();
        let (method, path) = (req.method().clone(), req.path().to_owned());

        match Next::new(&self.layers, self).run(req).await {
            Ok(response) => response,
            Err(fault) => {
                if fault.downcast_ref::<HttpException>().is_none() {
                    error!(%method, %path, "unhandled fault: {fault}");
                }
                fault.into_response()
            }
        }
    }

    /// The innermost step of the chain: route lookup and handler dispatch.
    pub(crate) fn route(&self, mut req: Request) -> BoxFuture<'static, Outcome> {
        let method = req.method().clone();
        match self.lookup(&method, req.path()) {
            Some((handler, params)) => {
                req.params = params;
                handler.call(req)
            }
            None => {
                let outcome = self.unmatched(&method, req.path());
                Box::pin(async move { outcome })
            }
        }
    }

    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// `405` when the path exists under other methods, `404` otherwise.
    fn unmatched(&self, method: &Method, path: &str) -> Outcome {
        let mut allowed: Vec<&str> = self.routes.iter()
            .filter(|(m, tree)| *m != method && tree.at(path).is_ok())
            .map(|(m, _)| m.as_str())
            .collect();

        if allowed.is_empty() {
            return Ok(HttpException::not_found("Not Found").to_response());
        }

        allowed.sort_unstable();
        let exc = HttpException::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        let exc = match HeaderValue::from_str(&allowed.join(", ")) {
            Ok(value) => exc.with_header(ALLOW, value),
            Err(_) => exc,
        };
        Ok(exc.to_response())
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::{get, json, request};

    async fn user(req: Request) -> String {
        format!("user {}", req.param("id").unwrap_or("?"))
    }

    async fn missing(_req: Request) -> Result<Response, HttpException> {
        Err(HttpException::not_found("Resource not found"))
    }

    #[derive(Debug, thiserror::Error)]
    #[error("kaboom")]
    struct Kaboom;

    async fn broken(_req: Request) -> Result<Response, Kaboom> {
        Err(Kaboom)
    }

    #[tokio::test]
    async fn routes_with_params() {
        let app = Router::new().get("/users/{id}", user);
        let response = app.call(get("/users/42")).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"user 42");
    }

    #[tokio::test]
    async fn unknown_path_is_404_json() {
        let response = Router::new().call(get("/nope")).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(json(&response), serde_json::json!({ "detail": "Not Found" }));
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let app = Router::new().get("/users/{id}", user).delete("/users/{id}", user);
        let response = app.call(request(http::Request::post("/users/1"))).await;
        assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["allow"], "DELETE, GET");
    }

    #[tokio::test]
    async fn unhandled_faults_render_without_error_layer() {
        let app = Router::new().get("/missing", missing).get("/broken", broken);

        let response = app.call(get("/missing")).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(json(&response)["detail"], "Resource not found");

        let response = app.call(get("/broken")).await;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().as_ref(), b"Internal Server Error");
    }
}
