use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use http_body_util::BodyExt;
use nope::{AppError, NoopObserver, Outcome, Request, Response, Router, Service, health};
use serde::Serialize;
use serde_json::Value;

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

fn service(router: Router) -> Service {
    Service::new(router).unwrap().observer(NoopObserver)
}

async fn send(svc: &Service, method: Method, path: &str) -> Reply {
    let req = http::Request::builder()
        .method(method)
        .uri(path)
        .body(Bytes::new())
        .unwrap();
    let res = svc.call(req).await.expect("a response");
    let (parts, body) = res.into_parts();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: body.collect().await.unwrap().to_bytes(),
    }
}

/// Echoes the routing path and every captured parameter.
async fn echo(req: Request) -> String {
    let params: Vec<String> = req.params().iter().map(|p| format!("{}={}", p.key, p.value)).collect();
    format!("{} {}", req.path(), params.join(","))
}

async fn named(req: Request) -> String {
    format!("named:{}", req.param("id").unwrap_or_default())
}

async fn list(_req: Request) -> &'static str {
    "list"
}

#[tokio::test]
async fn static_segment_beats_parameter() {
    let svc = service(Router::new().get("/users/:id", named).get("/users/list", list));
    assert_eq!(send(&svc, Method::GET, "/users/list").await.text(), "list");
    assert_eq!(send(&svc, Method::GET, "/users/42").await.text(), "named:42");
}

#[tokio::test]
async fn wildcard_captures_rest_including_nothing() {
    let svc = service(Router::new().get("/assets/*path", echo));
    assert_eq!(send(&svc, Method::GET, "/assets").await.text(), "/assets path=");
    assert_eq!(send(&svc, Method::GET, "/assets/").await.text(), "/assets/ path=");
    assert_eq!(send(&svc, Method::GET, "/assets/a/b.png").await.text(), "/assets/a/b.png path=a/b.png");
}

#[tokio::test]
async fn parameter_beats_wildcard_for_one_segment() {
    async fn by_id(_req: Request) -> &'static str { "id" }
    async fn by_path(_req: Request) -> &'static str { "path" }

    let svc = service(Router::new().get("/assets/:id", by_id).get("/assets/*path", by_path));
    assert_eq!(send(&svc, Method::GET, "/assets/123").await.text(), "id");
    assert_eq!(send(&svc, Method::GET, "/assets/a/b").await.text(), "path");
}

#[tokio::test]
async fn trailing_slash_is_not_normalized() {
    let svc = service(Router::new().get("/users", list));
    assert_eq!(send(&svc, Method::GET, "/users").await.status, StatusCode::OK);
    assert_eq!(send(&svc, Method::GET, "/users/").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_path_is_an_empty_404() {
    let svc = service(Router::new().get("/users", list));
    let res = send(&svc, Method::GET, "/nothing").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert!(res.body.is_empty());
}

#[tokio::test]
async fn wrong_method_is_405_with_sorted_allow() {
    let svc = service(
        Router::new()
            .post("/users", list)
            .get("/users", list)
            .delete("/users", list),
    );
    let res = send(&svc, Method::PUT, "/users").await;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers[ALLOW], "DELETE, GET, POST");
    assert!(res.body.is_empty());
}

#[tokio::test]
async fn mount_forwards_the_rest_of_the_path() {
    let api = Router::new().get("/", echo).get("/users/:id", echo);
    let svc = service(Router::new().mount("/api", api));

    assert_eq!(send(&svc, Method::GET, "/api").await.text(), "/ ");
    assert_eq!(send(&svc, Method::GET, "/api/users/7").await.text(), "/users/7 id=7");
}

#[tokio::test]
async fn mount_prefix_respects_segment_boundaries() {
    let svc = service(Router::new().mount("/api", Router::new().get("/*rest", echo)));
    assert_eq!(send(&svc, Method::GET, "/apix").await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&svc, Method::GET, "/api/x").await.text(), "/x rest=x");
}

#[tokio::test]
async fn longest_mount_wins_and_mounts_beat_routes() {
    async fn outer(_req: Request) -> &'static str { "outer" }
    async fn v1(_req: Request) -> &'static str { "v1" }
    async fn api(_req: Request) -> &'static str { "api" }

    let svc = service(
        Router::new()
            .get("/api/v1/ping", outer)
            .mount("/api", Router::new().get("/*any", api))
            .mount("/api/v1", Router::new().get("/ping", v1)),
    );
    assert_eq!(send(&svc, Method::GET, "/api/v1/ping").await.text(), "v1");
    assert_eq!(send(&svc, Method::GET, "/api/v2/ping").await.text(), "api");
}

#[tokio::test]
async fn nested_router_misses_answer_from_the_inner_router() {
    let svc = service(Router::new().mount("/api", Router::new().get("/users", list)));
    let res = send(&svc, Method::POST, "/api/users").await;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers[ALLOW], "GET");
}

#[derive(Serialize)]
struct User {
    id: u64,
    name: &'static str,
}

#[tokio::test]
async fn outcomes_write_json_with_their_status() {
    async fn show(_req: Request) -> Result<Outcome<User>, AppError> {
        Ok(Outcome::Success(User { id: 1, name: "alice" }))
    }
    async fn create(_req: Request) -> Result<Outcome<User>, AppError> {
        Ok(Outcome::Created(User { id: 2, name: "bob" }))
    }
    async fn remove(_req: Request) -> Result<Outcome<User>, AppError> {
        Ok(Outcome::NoContent)
    }

    let svc = service(
        Router::new()
            .get("/users/:id", show)
            .post("/users", create)
            .delete("/users/:id", remove),
    );

    let res = send(&svc, Method::GET, "/users/1").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.headers[CONTENT_TYPE], "application/json; charset=utf-8");
    assert_eq!(res.json()["name"], "alice");

    let res = send(&svc, Method::POST, "/users").await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.json()["id"], 2);

    let res = send(&svc, Method::DELETE, "/users/1").await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert!(res.body.is_empty());
}

#[tokio::test]
async fn handler_errors_use_the_error_body() {
    async fn reject(_req: Request) -> Result<Outcome<User>, AppError> {
        Err(AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid", "name is required")
            .with_field("name", "required"))
    }

    let svc = service(Router::new().post("/users", reject));
    let res = send(&svc, Method::POST, "/users").await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.headers[CONTENT_TYPE], "application/json; charset=utf-8");
    let body = res.json();
    assert_eq!(body["error"]["code"], "invalid");
    assert_eq!(body["error"]["message"], "name is required");
    assert_eq!(body["error"]["fields"]["name"], "required");
}

#[tokio::test]
async fn builder_headers_reach_the_client() {
    async fn created(_req: Request) -> Response {
        Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/99")
            .text("created")
    }

    let svc = service(Router::new().post("/users", created));
    let res = send(&svc, Method::POST, "/users").await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.headers["location"], "/users/99");
    assert_eq!(res.headers["content-length"], "7");
}

#[tokio::test]
async fn liveness_answers_ok() {
    let svc = service(Router::new().get(health::PATH, health::liveness));
    let res = send(&svc, Method::GET, "/healthz").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), serde_json::json!({ "status": "ok" }));
}

#[test]
fn registration_errors_fail_the_service() {
    assert!(Service::new(Router::new().get("/a/*x", list).get("/a/*y", list)).is_err());
    assert!(Service::new(Router::new().get("/a/*", list)).is_err());
    assert!(Service::new(Router::new().get("/a/*x/b", list)).is_err());
    assert!(Service::new(Router::new().get("/a/:", list)).is_err());
}

#[tokio::test]
async fn parameters_are_percent_decoded() {
    async fn greet(req: Request) -> String {
        format!("hello {}", req.param("name").unwrap_or_default())
    }

    let svc = service(Router::new().get("/users/:name", greet).get("/files/*rest", echo));

    let res = send(&svc, Method::GET, "/users/john%20doe").await;
    assert_eq!(res.text(), "hello john doe");

    // The routing path is left as sent; only captures are decoded.
    let res = send(&svc, Method::GET, "/files/a%2Fb/c").await;
    assert_eq!(res.text(), "/files/a%2Fb/c rest=a/b/c");
}

#[tokio::test]
async fn health_is_answered_ahead_of_a_root_mount() {
    async fn fallback(_req: Request) -> &'static str { "fallback" }

    let svc = service(Router::new().mount("/", Router::new().get("/*path", fallback))).health();

    let res = send(&svc, Method::GET, health::PATH).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), serde_json::json!({ "status": "ok" }));

    let res = send(&svc, Method::GET, "/anything").await;
    assert_eq!(res.text(), "fallback");

    // Only GET is taken over.
    let res = send(&svc, Method::POST, health::PATH).await;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn application_health_route_is_kept() {
    async fn custom(_req: Request) -> &'static str { "custom" }

    let svc = service(Router::new().get(health::PATH, custom)).health();
    let res = send(&svc, Method::GET, health::PATH).await;
    assert_eq!(res.text(), "custom");
}

#[tokio::test]
async fn question_mark_on_foreign_errors_yields_internal_error() {
    #[derive(serde::Deserialize, Serialize)]
    struct Payload {
        id: u32,
    }

    async fn parse(req: Request) -> Result<Outcome<Payload>, AppError> {
        let payload: Payload = serde_json::from_slice(req.body())?;
        Ok(Outcome::Success(payload))
    }

    let svc = service(Router::new().post("/parse", parse));
    let req = http::Request::builder()
        .method(Method::POST)
        .uri("/parse")
        .body(Bytes::from_static(b"{\"id\": \"not a number\"}"))
        .unwrap();
    let res = svc.call(req).await.expect("a response");
    let status = res.status();
    let body = res.into_body().collect().await.unwrap().to_bytes();

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["error"]["code"], "internal_error");
    assert_eq!(v["error"]["message"], "internal error");
    assert!(!String::from_utf8_lossy(&body).contains("invalid type"));
}
