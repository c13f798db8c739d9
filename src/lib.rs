//! # guardrail
//!
//! Production middleware for HTTP services, on a small hyper-based router.
//!
//! ## What you get
//!
//! One call wraps an application in the stack every service ends up writing
//! by hand:
//!
//! - **Error handling**: faults and panics become JSON responses; framework
//!   [`HttpException`]s keep their status; custom handlers per error type
//! - **CORS**: preflight answers and `Access-Control-*` headers
//! - **Security headers**: OWASP defaults, HSTS over HTTPS, `Server` stripped
//! - **Request id**: `X-Request-ID` reused from the caller or generated
//! - **Timing**: `X-Process-Time` in seconds
//! - **Logging**: one structured `tracing` event per request
//! - **Gzip**: bodies of 1000 bytes and up
//!
//! Each layer is also usable on its own; see [`middleware`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use guardrail::middleware::Essentials;
//! use guardrail::{HttpException, Json, Request, Response, Router, Server, health};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct User { id: u32, name: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), guardrail::Error> {
//!     tracing_subscriber::fmt::init();
//!
//!     let app = Router::new()
//!         .get("/health", health::liveness)
//!         .get("/users/{id}", get_user)
//!         .with_essentials(Essentials::default());
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Result<Json<User>, HttpException> {
//!     let id = req.param("id")
//!         .and_then(|id| id.parse().ok())
//!         .ok_or_else(|| HttpException::bad_request("id must be a number"))?;
//!     Ok(Json(User { id, name: "alice".into() }))
//! }
//! ```
//!
//! ## Errors
//!
//! Handlers return anything implementing [`IntoOutcome`]. A
//! `Result<_, E>` with any `E: std::error::Error + Send + Sync + 'static`
//! works with `?`; the error travels outward as a [`Fault`] until
//! [`ErrorHandling`](middleware::ErrorHandling) renders it:
//!
//! ```json
//! {"error": "ParseIntError", "message": "invalid digit found in string", "request_id": "…"}
//! ```

mod context;
mod error;
mod fault;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod health;
pub mod middleware;

pub use context::RequestContext;
pub use error::{Error, HttpException};
pub use fault::{Fault, Panic};
pub use handler::{BoxFuture, Handler, IntoOutcome, Outcome};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;

pub use http::{HeaderMap, Method, StatusCode};
