//! Every guardrail layer in front of a small JSON API.
//!
//! Run with:
//!   cargo run --example essentials
//!
//! Try:
//!   curl -i http://localhost:8000/
//!   curl -i http://localhost:8000/users/1
//!   curl -i http://localhost:8000/users/0           # 500, generic error body
//!   curl -i http://localhost:8000/error
//!   curl -i http://localhost:8000/not-found         # 404, {"detail": ...}
//!   curl -i http://localhost:8000/slow              # X-Process-Time ≈ 1
//!   curl -i -H 'Accept-Encoding: gzip' http://localhost:8000/large
//!   curl -i -X POST http://localhost:8000/items -d '{"name":"widget"}'
//!   curl -i -X OPTIONS http://localhost:8000/items \
//!        -H 'Origin: http://localhost:3000' \
//!        -H 'Access-Control-Request-Method: POST'
//!
//! Check the response headers for X-Request-ID, X-Process-Time,
//! X-Content-Type-Options and X-Frame-Options.

use std::time::Duration;

use guardrail::middleware::Essentials;
use guardrail::{HttpException, Json, Request, Router, Server, StatusCode, health};
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
#[error("User ID must be positive")]
struct InvalidUserId;

#[derive(Debug, thiserror::Error)]
#[error("This is a test error!")]
struct TestError;

#[tokio::main]
async fn main() -> Result<(), guardrail::Error> {
    tracing_subscriber::fmt::init();

    let config = Essentials {
        cors_origins: vec!["http://localhost:3000".into(), "http://localhost:5173".into()],
        include_traceback: true, // never in production
        logger_name: "example_app".into(),
        ..Essentials::default()
    };

    let app = Router::new()
        .get("/", root)
        .get("/health", health::liveness)
        .get("/users/{id}", get_user)
        .get("/items", list_items)
        .post("/items", create_item)
        .get("/error", trigger_error)
        .get("/not-found", not_found)
        .get("/slow", slow)
        .get("/large", large)
        .with_essentials(config);

    Server::bind("0.0.0.0:8000").serve(app).await
}

async fn root(req: Request) -> Json<Value> {
    Json(json!({
        "message": "guardrail example",
        "request_id": req.request_id(),
        "endpoints": {
            "root": "/",
            "health": "/health",
            "users": "/users/{id}",
            "items": "/items?limit=10",
            "error": "/error",
            "not_found": "/not-found",
            "slow": "/slow",
            "large": "/large",
        },
    }))
}

async fn get_user(req: Request) -> Result<Json<Value>, guardrail::Fault> {
    let id: i64 = req.param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| HttpException::new(StatusCode::UNPROCESSABLE_ENTITY, "id must be an integer"))?;
    if id < 1 {
        return Err(InvalidUserId.into());
    }

    Ok(Json(json!({
        "user_id": id,
        "name": format!("User {id}"),
        "email": format!("user{id}@example.com"),
        "request_id": req.request_id(),
    })))
}

async fn list_items(req: Request) -> Json<Value> {
    let limit = query_param(&req, "limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(10)
        .min(100);
    let items: Vec<Value> = (1..=limit).map(|i| json!({ "id": i, "name": format!("Item {i}") })).collect();
    Json(json!({ "items": items, "total": limit }))
}

async fn create_item(req: Request) -> Result<(StatusCode, Json<Value>), HttpException> {
    let item: Value = serde_json::from_slice(req.body())
        .map_err(|e| HttpException::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Item created", "item": item, "id": 123 }))))
}

async fn trigger_error(_req: Request) -> Result<Json<Value>, TestError> {
    Err(TestError)
}

async fn not_found(_req: Request) -> Result<Json<Value>, HttpException> {
    Err(HttpException::not_found("Resource not found"))
}

async fn slow(_req: Request) -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(1)).await;
    Json(json!({ "message": "This took a while", "duration": "1 second" }))
}

async fn large(_req: Request) -> Json<Value> {
    Json(json!({ "data": "x".repeat(10_000), "message": "This response is compressed with gzip" }))
}

fn query_param<'r>(req: &'r Request, name: &str) -> Option<&'r str> {
    req.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find_map(|(k, v)| (k == name).then_some(v))
}
