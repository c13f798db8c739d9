//! Request-scoped state.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Per-request state shared by every layer of the middleware chain.
///
/// A [`Request`](crate::Request) is moved inward through the chain, so an
/// outer layer cannot look at it again once it has called
/// [`Next::run`](crate::middleware::Next::run). Instead it clones the context
/// first: clones share the same state, and whatever an inner layer stores is
/// visible to the outer one after the inner chain returns.
///
/// ```text
/// ErrorHandling ── ctx.clone() ──► … ──► RequestId ── ctx.set_request_id(id)
///       ▲                                                   │
///       └──────────── ctx.request_id() == Some(id) ◄────────┘
/// ```
///
/// The context is created when the request enters the chain and dropped with
/// the last clone. Nothing here outlives the request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    request_id: OnceLock<String>,
    started_at: Instant,
}

impl RequestContext {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner { request_id: OnceLock::new(), started_at: Instant::now() }),
        }
    }

    /// The identifier stored by [`RequestId`](crate::middleware::RequestId), if
    /// that layer has run.
    pub fn request_id(&self) -> Option<&str> {
        self.inner.request_id.get().map(String::as_str)
    }

    /// Stores the request identifier. Write-once: returns the identifier that
    /// ends up stored, which is the first one ever set.
    pub fn set_request_id(&self, id: String) -> &str {
        self.inner.request_id.get_or_init(|| id)
    }

    /// Monotonic timestamp taken when the request entered the chain.
    /// [`Logging`](crate::middleware::Logging) reports `elapsed_ms` from it.
    pub fn started_at(&self) -> Instant { self.inner.started_at }

    pub fn elapsed(&self) -> Duration { self.inner.started_at.elapsed() }
}

impl Default for RequestContext {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_request_id() {
        let ctx = RequestContext::new();
        let outer = ctx.clone();
        assert_eq!(outer.request_id(), None);

        ctx.set_request_id("abc".to_owned());
        assert_eq!(outer.request_id(), Some("abc"));
    }

    #[test]
    fn request_id_is_write_once() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.set_request_id("first".to_owned()), "first");
        assert_eq!(ctx.set_request_id("second".to_owned()), "first");
        assert_eq!(ctx.request_id(), Some("first"));
    }

    #[test]
    fn clones_share_the_start() {
        let ctx = RequestContext::new();
        let outer = ctx.clone();
        assert_eq!(outer.started_at(), ctx.started_at());

        std::thread::sleep(Duration::from_millis(5));
        assert!(outer.elapsed() >= Duration::from_millis(5));
    }
}
