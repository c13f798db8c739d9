//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Uri};

use crate::context::RequestContext;

/// An incoming HTTP request with its body fully collected.
///
/// Besides the usual method / URI / headers / body, every request carries a
/// [`RequestContext`] shared with the middleware chain, and an
/// [`Extensions`] map for whatever a handler or middleware wants to hand
/// further inward.
pub struct Request {
    pub(crate) head: Parts,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) context: RequestContext,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Wraps an `http::Request`, mostly useful for driving a
    /// [`Router`](crate::Router) directly in tests.
    ///
    /// A request produced by [`into_http`](Request::into_http) gets its
    /// context and peer address back.
    pub fn new(req: http::Request<Bytes>) -> Self {
        let (mut head, body) = req.into_parts();
        let carried = head.extensions.remove::<Carried>();
        let (context, remote_addr) = match carried {
            Some(carried) => (carried.context, carried.remote_addr),
            None => (RequestContext::new(), None),
        };
        Self { head, body, params: HashMap::new(), context, remote_addr }
    }

    /// Unwraps into an `http::Request` for handing to `tower` services.
    ///
    /// The context and peer address ride along in the extensions; path
    /// parameters do not, they are only known once routing has happened.
    pub(crate) fn into_http(self) -> http::Request<Bytes> {
        let Self { mut head, body, context, remote_addr, .. } = self;
        head.extensions.insert(Carried { context, remote_addr });
        http::Request::from_parts(head, body)
    }

    pub(crate) fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn query(&self) -> Option<&str> { self.head.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn context(&self) -> &RequestContext { &self.context }
    pub fn extensions(&self) -> &Extensions { &self.head.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.head.extensions }

    /// Case-insensitive header lookup. Values that are not visible ASCII read
    /// as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Shortcut for `req.context().request_id()`.
    pub fn request_id(&self) -> Option<&str> {
        self.context.request_id()
    }

    /// Whether the client reached us over TLS.
    ///
    /// TLS is terminated in front of the service, so the proxy's
    /// `X-Forwarded-Proto` is authoritative when present (first hop wins for
    /// comma-separated lists); otherwise the request URI's scheme decides.
    pub fn is_secure(&self) -> bool {
        if let Some(proto) = self.header("x-forwarded-proto") {
            let first = proto.split(',').next().unwrap_or("").trim();
            return first.eq_ignore_ascii_case("https");
        }
        self.head.uri.scheme_str() == Some("https")
    }
}

#[derive(Clone)]
struct Carried {
    context: RequestContext,
    remote_addr: Option<SocketAddr>,
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        Self::new(req)
    }
}
