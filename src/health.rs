//! Built-in health-check handlers.
//!
//! | Check | Body | Question |
//! |---|---|---|
//! | **Liveness** | `{"status":"healthy"}` | Is the process alive? Failure → restart. |
//! | **Readiness** | `{"status":"ready"}` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Mount them under `/health` and [`Logging`](crate::middleware::Logging)'s
//! default skip-list keeps health checks out of the request log:
//!
//! ```rust,no_run
//! use guardrail::{Router, health};
//!
//! let app = Router::new()
//!     .get("/health", health::liveness)
//!     .get("/health/ready", health::readiness);
//! ```
//!
//! Replace `readiness` with your own handler to gate on dependencies:
//!
//! ```rust,no_run
//! use guardrail::{HttpException, Json, Request};
//! use serde_json::{Value, json};
//!
//! async fn readiness(_req: Request) -> Result<Json<Value>, HttpException> {
//!     if database_is_up().await {
//!         Ok(Json(json!({ "status": "ready" })))
//!     } else {
//!         Err(HttpException::new(guardrail::StatusCode::SERVICE_UNAVAILABLE, "database unavailable"))
//!     }
//! }
//!
//! async fn database_is_up() -> bool { true }
//! ```

use serde::Serialize;

use crate::{Json, Request};

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

/// Always `200 OK`. If the process can answer HTTP at all, it is alive.
pub async fn liveness(_req: Request) -> Json<Health> {
    Json(Health { status: "healthy" })
}

/// `200 OK` once the router is serving.
pub async fn readiness(_req: Request) -> Json<Health> {
    Json(Health { status: "ready" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::{call, get, json};
    use crate::router::Router;

    #[tokio::test]
    async fn health_checks_answer_json() {
        let app = Router::new()
            .get("/health", liveness)
            .get("/health/ready", readiness);

        let response = call(&app, get("/health")).await;
        assert_eq!(json(&response), serde_json::json!({ "status": "healthy" }));
        assert_eq!(response.headers()["content-type"], "application/json");

        let response = call(&app, get("/health/ready")).await;
        assert_eq!(json(&response), serde_json::json!({ "status": "ready" }));
    }
}
