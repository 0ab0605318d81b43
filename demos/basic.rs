//! Minimal onion example: a request flowing through timing, auth and
//! request-id layers, with a per-run terminal acting as the "handler".
//!
//! Run with:
//!   RUST_LOG=trace cargo run --example basic

use std::time::Instant;

use onion::{Error, Next, Pipeline};
use tracing::info;

#[derive(Debug)]
struct Request {
    path: &'static str,
    token: Option<&'static str>,
    request_id: Option<u64>,
    status: u16,
}

impl Request {
    fn new(path: &'static str, token: Option<&'static str>) -> Self {
        Self { path, token, request_id: None, status: 0 }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let app: Pipeline<Request> = Pipeline::builder()
        .name("app")
        .with(timing)
        .with(auth)
        .with(request_id)
        .build();

    for req in [Request::new("/users/42", Some("secret")), Request::new("/users/42", None)] {
        match app.run_with(req, handle).await {
            Ok(res) => info!(path = res.path, status = res.status, id = ?res.request_id, "done"),
            Err(e) => info!("pipeline failed: {e}"),
        }
    }
}

// Outermost: measures everything below it, including rejections.
async fn timing(req: Request, next: Next<Request>) -> Result<Request, Error> {
    let started = Instant::now();
    let res = next.run(req).await;
    info!(elapsed = ?started.elapsed(), ok = res.is_ok(), "timing");
    res
}

// Short-circuits with a 401 instead of calling `next`.
async fn auth(mut req: Request, next: Next<Request>) -> Result<Request, Error> {
    if req.token != Some("secret") {
        req.status = 401;
        return Ok(req);
    }
    next.run(req).await
}

// Hands a replacement state downstream.
async fn request_id(mut req: Request, next: Next<Request>) -> Result<Request, Error> {
    req.request_id = Some(7);
    next.run(req).await
}

// Terminal: runs after the last layer, for this run only.
async fn handle(mut req: Request, _next: Next<Request>) -> Result<Request, Error> {
    req.status = 200;
    Ok(req)
}
