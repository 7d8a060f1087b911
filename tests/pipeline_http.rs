use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use tower::ServiceExt;

use request_gate::app::{build_router, build_state};
use request_gate::clock::ManualClock;
use request_gate::config::{AppEnv, CacheBackendConfig, Config};
use request_gate::services::auth::KeyMaterial;
use request_gate::services::cache::RegionConfig;
use request_gate::services::rate_limit::BucketConfig;
use request_gate::state::AppState;

const SECRET: &[u8] = b"integration-secret";
const NOW: u64 = 1_700_000_000;

fn config(global_capacity: u32) -> Config {
    Config {
        addr: "127.0.0.1:0".parse().unwrap(),
        app_env: AppEnv::Development,
        request_timeout: Duration::from_secs(5),
        access_key: KeyMaterial::HmacSecret(SECRET.to_vec()),
        auth_issuer: None,
        auth_audience: None,
        access_token_leeway_seconds: 0,
        global_rate_limit: BucketConfig::new(global_capacity, 1.0).unwrap(),
        auth_rate_limit: BucketConfig::new(2, 10.0 / 60.0).unwrap(),
        rate_limit_sweep_interval: Duration::from_secs(60),
        // lets each test pick its client address
        trust_forwarded_for: true,
        ownership_timeout: Duration::from_millis(200),
        cache_backend: CacheBackendConfig::Memory,
        projects_cache: RegionConfig::new(100, Duration::from_secs(600)).unwrap(),
        tasks_cache: RegionConfig::new(500, Duration::from_secs(300)).unwrap(),
    }
}

struct TestApp {
    clock: Arc<ManualClock>,
    state: AppState,
    router: Router,
}

async fn app(global_capacity: u32) -> TestApp {
    let config = config(global_capacity);
    let clock = Arc::new(ManualClock::new(NOW));
    let state = build_state(&config, clock.clone()).await.unwrap();
    let router = build_router(state.clone(), &config);
    TestApp {
        clock,
        state,
        router,
    }
}

fn token(sub: &str, roles: &[&str], exp: u64) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &json!({ "sub": sub, "roles": roles, "iat": NOW, "exp": exp }),
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

fn user(sub: &str) -> String {
    token(sub, &["USER"], NOW + 3600)
}

fn admin(sub: &str) -> String {
    token(sub, &["ROLE_ADMIN"], NOW + 3600)
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        self.send_from("203.0.113.10", method, uri, bearer, body).await
    }

    async fn send_from(
        &self,
        client: &str,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut req = Request::builder()
            .method(method)
            .uri(format!("/api/v1{uri}"))
            .header("x-forwarded-for", client);
        if let Some(t) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        Reply {
            status,
            headers,
            body,
        }
    }
}

fn error_code(reply: &Reply) -> &str {
    reply.body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn health_is_reachable() {
    let app = app(10).await;
    let reply = app.send("GET", "/health", None, None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "ok");
    assert!(reply.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn exhausted_bucket_returns_429_with_retry_after() {
    let app = app(2).await;

    for _ in 0..2 {
        let reply = app.send("GET", "/projects", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    let reply = app.send("GET", "/projects", None, None).await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(&reply), "RATE_LIMIT_EXCEEDED");
    assert_eq!(reply.headers[header::RETRY_AFTER], "1");

    // other clients have their own bucket
    let reply = app
        .send_from("198.51.100.7", "GET", "/projects", None, None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    // refill at 1 token/s
    app.clock.advance(Duration::from_secs(1));
    let reply = app.send("GET", "/projects", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_applies_before_credential_checks() {
    let app = app(1).await;

    let reply = app.send("GET", "/projects/1", Some("garbage"), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = app.send("GET", "/projects/1", Some("garbage"), None).await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn credential_failures_are_401_with_distinct_codes() {
    let app = app(50).await;

    let reply = app.send("GET", "/projects/1", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&reply), "UNAUTHORIZED");
    assert!(reply.headers.contains_key(header::WWW_AUTHENTICATE));

    let reply = app.send("GET", "/projects/1", Some("not-a-jwt"), None).await;
    assert_eq!(error_code(&reply), "MALFORMED_CREDENTIAL");

    let forged = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &json!({ "sub": "alice", "exp": NOW + 3600 }),
        &EncodingKey::from_secret(b"someone-else"),
    )
    .unwrap();
    let reply = app.send("GET", "/projects/1", Some(&forged), None).await;
    assert_eq!(error_code(&reply), "INVALID_SIGNATURE");

    let short = token("alice", &["USER"], NOW + 10);
    app.clock.advance(Duration::from_secs(10));
    let reply = app.send("GET", "/projects/1", Some(&short), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&reply), "EXPIRED_CREDENTIAL");
}

#[tokio::test]
async fn only_creator_or_admin_may_modify_a_project() {
    let app = app(50).await;
    let alice = user("alice");
    let bob = user("bob");

    let created = app
        .send("POST", "/projects", Some(&alice), Some(json!({ "name": "apollo" })))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["created_by"], "alice");
    let id = created.body["id"].as_u64().unwrap();
    let path = format!("/projects/{id}");

    let reply = app
        .send("PUT", &path, Some(&bob), Some(json!({ "name": "hijacked" })))
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&reply), "FORBIDDEN");

    let reply = app
        .send("PUT", &path, Some(&alice), Some(json!({ "name": "apollo 2" })))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["name"], "apollo 2");

    let reply = app.send("DELETE", &path, Some(&admin("root")), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = app.send("GET", &path, Some(&alice), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forbidden_does_not_reveal_existence() {
    let app = app(50).await;
    let bob = user("bob");

    let missing = app
        .send("DELETE", "/projects/999", Some(&bob), None)
        .await;
    let created = app
        .send("POST", "/projects", Some(&user("alice")), Some(json!({ "name": "x" })))
        .await;
    let id = created.body["id"].as_u64().unwrap();
    let existing = app
        .send("DELETE", &format!("/projects/{id}"), Some(&bob), None)
        .await;

    assert_eq!(missing.status, StatusCode::FORBIDDEN);
    assert_eq!(existing.status, StatusCode::FORBIDDEN);
    assert_eq!(missing.body, existing.body);
}

#[tokio::test]
async fn reads_are_cached_until_a_write_invalidates_them() {
    let app = app(50).await;
    let alice = user("alice");

    let created = app
        .send("POST", "/projects", Some(&alice), Some(json!({ "name": "v1" })))
        .await;
    let id = created.body["id"].as_u64().unwrap();
    let path = format!("/projects/{id}");

    let reply = app.send("GET", &path, Some(&alice), None).await;
    assert_eq!(reply.body["name"], "v1");

    // a change behind the API's back is not visible: the view is cached
    app.state.projects.update(id, Some("sneaky"), None);
    let reply = app.send("GET", &path, Some(&alice), None).await;
    assert_eq!(reply.body["name"], "v1");

    // a write through the API drops the cached view
    app.send("PUT", &path, Some(&alice), Some(json!({ "name": "v2" })))
        .await;
    let reply = app.send("GET", &path, Some(&alice), None).await;
    assert_eq!(reply.body["name"], "v2");
}

#[tokio::test]
async fn task_writes_invalidate_the_parent_project() {
    let app = app(50).await;
    let alice = user("alice");

    let created = app
        .send("POST", "/projects", Some(&alice), Some(json!({ "name": "p" })))
        .await;
    let id = created.body["id"].as_u64().unwrap();

    let reply = app.send("GET", &format!("/projects/{id}"), Some(&alice), None).await;
    assert_eq!(reply.body["task_count"], 0);
    let reply = app
        .send("GET", &format!("/projects/{id}/tasks"), Some(&alice), None)
        .await;
    assert_eq!(reply.body, json!([]));

    let task = app
        .send(
            "POST",
            &format!("/projects/{id}/tasks"),
            Some(&alice),
            Some(json!({ "title": "ship it", "assigned_to": "bob" })),
        )
        .await;
    assert_eq!(task.status, StatusCode::CREATED);

    let reply = app.send("GET", &format!("/projects/{id}"), Some(&alice), None).await;
    assert_eq!(reply.body["task_count"], 1);
    let reply = app
        .send("GET", &format!("/projects/{id}/tasks"), Some(&alice), None)
        .await;
    assert_eq!(reply.body[0]["title"], "ship it");
}

#[tokio::test]
async fn assignee_may_update_but_only_project_creator_may_delete() {
    let app = app(50).await;
    let alice = user("alice");
    let bob = user("bob");
    let carol = user("carol");

    let project = app
        .send("POST", "/projects", Some(&alice), Some(json!({ "name": "p" })))
        .await;
    let pid = project.body["id"].as_u64().unwrap();

    // only the project creator may add tasks
    let reply = app
        .send(
            "POST",
            &format!("/projects/{pid}/tasks"),
            Some(&bob),
            Some(json!({ "title": "nope" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let task = app
        .send(
            "POST",
            &format!("/projects/{pid}/tasks"),
            Some(&alice),
            Some(json!({ "title": "t", "assigned_to": "bob" })),
        )
        .await;
    let tid = task.body["id"].as_u64().unwrap();
    let path = format!("/tasks/{tid}");

    // warm the task cache
    let reply = app.send("GET", &path, Some(&carol), None).await;
    assert_eq!(reply.body["done"], false);

    let reply = app
        .send("PUT", &path, Some(&bob), Some(json!({ "done": true })))
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app.send("GET", &path, Some(&carol), None).await;
    assert_eq!(reply.body["done"], true);

    let reply = app
        .send("PUT", &path, Some(&carol), Some(json!({ "done": false })))
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = app.send("DELETE", &path, Some(&bob), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = app.send("DELETE", &path, Some(&alice), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = app.send("GET", &path, Some(&carol), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_endpoint_has_a_tighter_budget() {
    let app = app(50).await;
    let t = token("dave", &[], NOW + 3600);

    let reply = app.send("GET", "/auth/session", Some(&t), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["subject"], "dave");

    app.send("GET", "/auth/session", Some(&t), None).await;
    let reply = app.send("GET", "/auth/session", Some(&t), None).await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);

    // the global domain is unaffected
    let reply = app.send("GET", "/projects", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn invalid_body_is_rejected_after_admission() {
    let app = app(50).await;

    let reply = app
        .send("POST", "/projects", Some(&user("alice")), Some(json!({ "name": "  " })))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&reply), "INVALID_PROJECT");
}
