//! Structured request logging.

use tracing::{info, warn};

use super::{Middleware, Next};
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;

/// Emits one structured `tracing` event per completed request.
///
/// Fields: `logger`, `request_id` (`N/A` without a [`RequestId`](super::RequestId)
/// layer outside this one), `method`, `path`, `query`, `client`, `status` and
/// `elapsed_ms`. Responses below 400 log at `INFO`, everything else at `WARN`.
///
/// When the inner chain fails, the logged status is the fault's status: the
/// explicit one if set, the `HttpException` status, else `500`. The error
/// itself is left to [`ErrorHandling`](super::ErrorHandling). A fault that a
/// custom `ErrorHandling::catch` handler turns into some other status is still
/// logged with the fault's status.
///
/// `elapsed_ms` is measured from when the request entered the chain, so it
/// includes the time spent in outer layers.
///
/// Requests whose path starts with an entry of the skip-list
/// (default `/health`, `/metrics`) are not logged.
pub struct Logging {
    logger: String,
    skip_paths: Vec<String>,
}

impl Logging {
    pub fn new() -> Self {
        Self {
            logger: "guardrail".to_owned(),
            skip_paths: vec!["/health".to_owned(), "/metrics".to_owned()],
        }
    }

    /// Value of the `logger` field, for telling several services apart in one
    /// log stream.
    pub fn logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger = name.into();
        self
    }

    /// Replaces the skip-list.
    pub fn skip_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one prefix to the skip-list.
    pub fn skip(mut self, path: impl Into<String>) -> Self {
        self.skip_paths.push(path.into());
        self
    }

    fn skips(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|p| path.starts_with(p.as_str()))
    }
}

impl Default for Logging {
    fn default() -> Self { Self::new() }
}

impl Middleware for Logging {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            if self.skips(req.path()) {
                return next.run(req).await;
            }

            let context = req.context().clone();
            let method = req.method().clone();
            let path = req.path().to_owned();
            let query = req.query().unwrap_or("").to_owned();
            let client = req.remote_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_owned());

            let outcome = next.run(req).await;

            let status = match &outcome {
                Ok(response) => response.status_code(),
                Err(fault) => fault.status(),
            };
            let elapsed_ms = format!("{:.2}", context.elapsed().as_secs_f64() * 1000.0);
            let request_id = context.request_id().unwrap_or("N/A");

            if status.as_u16() < 400 {
                info!(
                    logger = %self.logger,
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    query = %query,
                    client = %client,
                    status = status.as_u16(),
                    elapsed_ms = %elapsed_ms,
                    "request completed"
                );
            } else {
                warn!(
                    logger = %self.logger,
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    query = %query,
                    client = %client,
                    status = status.as_u16(),
                    elapsed_ms = %elapsed_ms,
                    "request completed"
                );
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::HttpException;
    use crate::fault::Fault;
    use crate::middleware::test_support::{CapturedLogs, call, get};
    use crate::middleware::{ErrorHandling, Middleware, Next, RequestId};
    use crate::response::Response;
    use crate::router::Router;

    async fn ok(_req: Request) -> &'static str { "ok" }

    async fn fail(_req: Request) -> Result<Response, HttpException> {
        Err(HttpException::new(http::StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
    }

    async fn teapot(_req: Request) -> Result<Response, Fault> {
        Err(Fault::from(HttpException::not_found("brewing")).with_status(http::StatusCode::IM_A_TEAPOT))
    }

    struct Stall;

    impl Middleware for Stall {
        fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                next.run(req).await
            })
        }
    }

    fn elapsed_ms(line: &str) -> f64 {
        let rest = &line[line.find("elapsed_ms=").unwrap() + "elapsed_ms=".len()..];
        rest.split_whitespace().next().unwrap().parse().unwrap()
    }

    fn completed(logs: &CapturedLogs) -> Vec<String> {
        logs.lines().into_iter().filter(|l| l.contains("request completed")).collect()
    }

    #[tokio::test]
    async fn logs_one_record_per_request() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let app = Router::new()
            .get("/test", ok)
            .layer(Logging::new().logger_name("test_logger"))
            .layer(RequestId::new());
        let response = call(&app, get("/test?limit=10")).await;

        let lines = completed(&logs);
        assert_eq!(lines.len(), 1, "{lines:?}");
        let line = &lines[0];
        let id = response.headers()["x-request-id"].to_str().unwrap();
        assert!(line.contains(" INFO "), "{line}");
        assert!(line.contains("logger=test_logger"), "{line}");
        assert!(line.contains(&format!("request_id={id}")), "{line}");
        assert!(line.contains("method=GET"), "{line}");
        assert!(line.contains("path=/test"), "{line}");
        assert!(line.contains("query=limit=10"), "{line}");
        assert!(line.contains("status=200"), "{line}");
        assert!(line.contains("elapsed_ms="), "{line}");
    }

    #[tokio::test]
    async fn request_id_defaults_to_na() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let app = Router::new().get("/test", ok).layer(Logging::new());
        call(&app, get("/test")).await;

        let lines = completed(&logs);
        assert!(lines[0].contains("request_id=N/A"), "{lines:?}");
        assert!(lines[0].contains("logger=guardrail"), "{lines:?}");
    }

    #[tokio::test]
    async fn skips_configured_paths() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let app = Router::new()
            .get("/health", ok)
            .get("/metrics/live", ok)
            .get("/internal", ok)
            .get("/test", ok)
            .layer(Logging::new().skip("/internal"));
        for path in ["/health", "/metrics/live", "/internal", "/test"] {
            call(&app, get(path)).await;
        }

        let lines = completed(&logs);
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("path=/test"));
    }

    #[tokio::test]
    async fn replaced_skip_list() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let app = Router::new()
            .get("/health", ok)
            .layer(Logging::new().skip_paths(["/other"]));
        call(&app, get("/health")).await;

        assert_eq!(completed(&logs).len(), 1);
    }

    #[tokio::test]
    async fn errors_log_resulting_status_at_warn() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let app = Router::new()
            .get("/error", fail)
            .layer(Logging::new())
            .layer(ErrorHandling::new());
        let response = call(&app, get("/error")).await;
        assert_eq!(response.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);

        let lines = completed(&logs);
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains(" WARN "), "{}", lines[0]);
        assert!(lines[0].contains("status=500"), "{}", lines[0]);
        assert!(!lines[0].contains("Server error"), "{}", lines[0]);
    }

    #[tokio::test]
    async fn explicit_fault_status_is_logged_and_rendered() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let app = Router::new()
            .get("/teapot", teapot)
            .layer(Logging::new())
            .layer(ErrorHandling::new());
        let response = call(&app, get("/teapot")).await;
        assert_eq!(response.status_code(), http::StatusCode::IM_A_TEAPOT);

        let lines = completed(&logs);
        assert!(lines[0].contains("status=418"), "{}", lines[0]);
    }

    #[tokio::test]
    async fn elapsed_counts_from_chain_entry() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let app = Router::new().get("/test", ok).layer(Logging::new()).layer(Stall);
        call(&app, get("/test")).await;

        let lines = completed(&logs);
        assert!(elapsed_ms(&lines[0]) >= 30.0, "{}", lines[0]);
    }
}
