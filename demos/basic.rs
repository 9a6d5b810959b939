//! Minimal nope example: JSON endpoints, a mounted sub-router, a streaming
//! handler, and the built-in health check.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/users/42
//!   curl -X POST http://localhost:3000/api/users -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/api/users/42
//!   curl -i -X PUT http://localhost:3000/api/users        # 405, Allow: POST
//!   curl http://localhost:3000/files/docs/readme.txt
//!   curl http://localhost:3000/slow                       # 504 after 2 s
//!   curl -N http://localhost:3000/ticks
//!   curl http://localhost:3000/healthz

use std::time::Duration;

use http::{HeaderMap, StatusCode};
use nope::{AppError, Outcome, Request, ResponseWriter, Router, Server, handler};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct User {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let users = Router::new()
        .get("/users/:id", get_user)
        .post("/users", create_user)
        .delete("/users/:id", delete_user);

    let app = Router::new()
        .mount("/api", users)
        .get("/files/*path", file)
        .get("/slow", slow)
        .get("/ticks", handler::stream(ticks));

    if let Err(e) = Server::bind("0.0.0.0:3000")
        .request_timeout(Duration::from_secs(2))
        .health()
        .serve(app)
        .await
    {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}

// GET /api/users/:id
async fn get_user(req: Request) -> Result<Outcome<User>, AppError> {
    let id = req.param("id").unwrap_or_default().to_owned();
    Ok(Outcome::Success(User { id, name: "alice".into() }))
}

// POST /api/users → 201, or 400 with a field error
async fn create_user(req: Request) -> Result<Outcome<User>, AppError> {
    let input: CreateUser = serde_json::from_slice(req.body()).map_err(|e| {
        AppError::wrap(e, StatusCode::BAD_REQUEST, "invalid_body", "body must be a JSON user")
    })?;
    if input.name.is_empty() {
        return Err(AppError::new(StatusCode::BAD_REQUEST, "invalid_body", "validation failed")
            .with_field("name", "required"));
    }
    Ok(Outcome::Created(User { id: "99".into(), name: input.name }))
}

// DELETE /api/users/:id → 204
async fn delete_user(_req: Request) -> Result<Outcome<User>, AppError> {
    Ok(Outcome::NoContent)
}

// GET /files/*path: the wildcard holds the rest of the path, maybe empty.
async fn file(req: Request) -> String {
    format!("you asked for `{}`\n", req.param("path").unwrap_or_default())
}

// Ignores its deadline; the guard answers 504 instead.
async fn slow(_req: Request) -> &'static str {
    tokio::time::sleep(Duration::from_secs(10)).await;
    "done"
}

// Writes chunks until finished or the request context ends.
async fn ticks(req: Request, w: ResponseWriter) {
    w.write_head(StatusCode::OK, HeaderMap::new());
    for i in 0..5 {
        w.write(format!("tick {i}\n")).await;
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(300)) => {}
            _ = req.context().done() => return,
        }
    }
}
