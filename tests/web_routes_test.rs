//! Integration tests for the JSON API.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use content_promoter::config::Config;
use content_promoter::db::{insert_user, Database, NewUser};
use content_promoter::feeds::{FeedKind, FeedSource};
use content_promoter::jobs::JobQueue;
use content_promoter::publish::{
    LinkedInClient, LinkedInSettings, PlatformPublisher, PlatformRegistry,
};
use content_promoter::web::{create_app, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestApp {
    app: Router,
    db: Database,
    _temp_dir: TempDir,
}

async fn setup(linkedin_base: &str) -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::new(&temp_dir.path().join("test.sqlite"))
        .await
        .expect("Failed to create database");

    let config = Config {
        content_feeds: vec![
            FeedSource::new("https://blog.example.com/feed.xml", FeedKind::Blog),
            FeedSource::new("https://videos.example.com/feed.xml", FeedKind::Video),
        ],
        ..Config::for_testing()
    };

    let mut registry = PlatformRegistry::new();
    registry.register(Arc::new(
        LinkedInClient::new(
            LinkedInSettings {
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
                redirect_uri: "http://localhost:8080/auth/linkedin/callback".to_string(),
                oauth_base: format!("{linkedin_base}/oauth/v2"),
                api_base: format!("{linkedin_base}/v2"),
            },
            Duration::from_secs(5),
        )
        .expect("Failed to build LinkedIn client"),
    ));
    let publisher = PlatformPublisher::new(
        db.clone(),
        registry,
        config.publish_retry,
        config.token_refresh_skew,
    );

    let state = AppState {
        db: db.clone(),
        queue: JobQueue::new(db.clone()),
        publisher,
        config: Arc::new(config),
    };
    TestApp {
        app: create_app(state),
        db,
        _temp_dir: temp_dir,
    }
}

async fn create_user(db: &Database) -> i64 {
    insert_user(
        db.pool(),
        &NewUser {
            email: "web@example.com".to_string(),
            name: "Web User".to_string(),
            ..NewUser::default()
        },
    )
    .await
    .expect("Failed to insert user")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to execute request");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

#[tokio::test]
async fn test_health_check() {
    let t = setup("http://127.0.0.1:9").await;
    let (status, body) = send(&t.app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}

#[tokio::test]
async fn test_ingest_submission_returns_pending_job() {
    let t = setup("http://127.0.0.1:9").await;

    let (status, body) = send(
        &t.app,
        post_json(
            "/api/ingest",
            &json!({ "feed_url": "https://blog.example.com/feed.xml", "kind": "blog" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().expect("job_id missing").to_string();

    let (status, body) = send(&t.app, get(&format!("/api/jobs/{job_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "PENDING");
    assert_eq!(body["kind"], "ingest-feed");
    assert_eq!(body["id"], job_id.as_str());
}

#[tokio::test]
async fn test_ingest_rejects_bad_input() {
    let t = setup("http://127.0.0.1:9").await;

    let (status, body) = send(
        &t.app,
        post_json(
            "/api/ingest",
            &json!({ "feed_url": "https://blog.example.com/feed.xml", "kind": "newsletter" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = send(
        &t.app,
        post_json("/api/ingest", &json!({ "feed_url": "ftp://x", "kind": "blog" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_jobs_are_not_found() {
    let t = setup("http://127.0.0.1:9").await;

    let (status, body) = send(
        &t.app,
        get("/api/jobs/6f9619ff-8b86-4d11-b42d-00c04fc964ff"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = send(&t.app, get("/api/jobs/not-a-job-id")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_content_submission_is_deduplicated() {
    let t = setup("http://127.0.0.1:9").await;

    let (status, body) = send(
        &t.app,
        post_json(
            "/api/content",
            &json!({ "url": "https://blog.example.com/launch", "title": "Launch day" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_i64().expect("id missing");
    assert_eq!(body["title"], "Launch day");

    let (status, body) = send(
        &t.app,
        post_json(
            "/api/content",
            &json!({ "url": "https://blog.example.com/launch/?utm_source=twitter" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "duplicate");
    assert_eq!(body["id"], id);

    let (status, _) = send(
        &t.app,
        post_json(
            "/api/content",
            &json!({ "url": "https://blog.example.com/x", "kind": "hologram" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_and_publish_validate_inputs() {
    let t = setup("http://127.0.0.1:9").await;
    let user_id = create_user(&t.db).await;
    let (_, body) = send(
        &t.app,
        post_json("/api/content", &json!({ "url": "https://blog.example.com/valid" })),
    )
    .await;
    let content_id = body["id"].as_i64().expect("id missing");

    let (status, _) = send(
        &t.app,
        post_json(
            "/api/content/999/generate",
            &json!({ "user_id": user_id, "platform": "linkedin" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &t.app,
        post_json(
            &format!("/api/content/{content_id}/generate"),
            &json!({ "user_id": user_id, "platform": "myspace" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &t.app,
        post_json(
            &format!("/api/content/{content_id}/publish"),
            &json!({ "user_id": 4242, "platform": "linkedin" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &t.app,
        post_json(
            &format!("/api/content/{content_id}/publish"),
            &json!({ "user_id": user_id, "platform": "linkedin", "text": "Custom text" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["job_id"].is_string());

    let (status, body) = send(
        &t.app,
        post_json(
            &format!("/api/content/{content_id}/publish"),
            &json!({ "user_id": user_id, "platform": "x", "text": "Short post" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "publish_rejected");
}

#[tokio::test]
async fn test_announcement_submission() {
    let t = setup("http://127.0.0.1:9").await;
    let (_, body) = send(
        &t.app,
        post_json("/api/content", &json!({ "url": "https://blog.example.com/big-news" })),
    )
    .await;
    let content_id = body["id"].as_i64().expect("id missing");

    let (status, body) = send(
        &t.app,
        post_json(&format!("/api/content/{content_id}/notify"), &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().expect("job_id missing");
    let (_, body) = send(&t.app, get(&format!("/api/jobs/{job_id}"))).await;
    assert_eq!(body["kind"], "announce-content");
    assert_eq!(body["state"], "PENDING");

    let (status, _) = send(&t.app, post_json("/api/content/999/notify", &json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_platform_connection_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/accessToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "expires_in": 5_184_000,
            "refresh_token": "new-refresh",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sub": "abc123" })))
        .mount(&server)
        .await;

    let t = setup(&server.uri()).await;
    let user_id = create_user(&t.db).await;
    let base = format!("/api/users/{user_id}/platforms");

    let (status, body) = send(&t.app, get(&base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["platforms"]["linkedin"], "unauthorized");

    let (status, body) = send(&t.app, get(&format!("{base}/linkedin/authorize"))).await;
    assert_eq!(status, StatusCode::OK);
    let state = body["state"].as_str().expect("state missing");
    assert!(state.starts_with(&format!("{user_id}.")));
    let url = body["authorization_url"].as_str().expect("url missing");
    assert!(url.contains("response_type=code"));
    assert!(url.contains(&format!("state={}", urlencoding::encode(state))));

    let (status, body) = send(
        &t.app,
        post_json(&format!("{base}/linkedin/connect"), &json!({ "code": "auth-code" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "authorized");

    let (_, body) = send(&t.app, get(&base)).await;
    assert_eq!(body["platforms"]["linkedin"], "authorized");

    let (status, body) = send(&t.app, delete(&format!("{base}/linkedin"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "revoked");

    let (_, body) = send(&t.app, get(&base)).await;
    assert_eq!(body["platforms"]["linkedin"], "revoked");
}

#[tokio::test]
async fn test_unsupported_platform_cannot_authorize() {
    let t = setup("http://127.0.0.1:9").await;
    let user_id = create_user(&t.db).await;

    let (status, body) = send(
        &t.app,
        get(&format!("/api/users/{user_id}/platforms/x/authorize")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "publish_rejected");

    let (status, _) = send(&t.app, get("/api/users/4242/platforms")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manual_scheduler_triggers() {
    let t = setup("http://127.0.0.1:9").await;

    let (status, body) = send(&t.app, post_json("/api/scheduler/ingest", &json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let batch_id = body["job_id"].as_str().expect("job_id missing");
    let (_, body) = send(&t.app, get(&format!("/api/jobs/{batch_id}"))).await;
    assert_eq!(body["kind"], "ingest-batch");

    let (status, body) = send(
        &t.app,
        post_json("/api/scheduler/notify-sweep", &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().expect("job_id missing");

    let (_, body) = send(&t.app, get(&format!("/api/jobs/{job_id}"))).await;
    assert_eq!(body["kind"], "notify-sweep");
}
