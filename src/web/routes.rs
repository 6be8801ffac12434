use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::canonical::is_http_url;
use crate::db::{get_content_item, get_user, ContentKind, NewContentItem};
use crate::dedup;
use crate::error::PromotionError;
use crate::feeds::FeedKind;
use crate::jobs::{JobId, JobPayload};
use crate::platform::Platform;
use crate::scheduler::{submit_ingestion_batch, submit_notify_sweep};

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/ingest", post(ingest))
        .route("/api/content", post(create_content))
        .route("/api/content/:id/generate", post(generate))
        .route("/api/content/:id/publish", post(publish))
        .route("/api/content/:id/notify", post(announce))
        .route("/api/jobs/:id", get(job_status))
        .route("/api/users/:id/platforms", get(platform_states))
        .route("/api/users/:id/platforms/:platform", delete(disconnect))
        .route("/api/users/:id/platforms/:platform/authorize", get(authorize))
        .route("/api/users/:id/platforms/:platform/connect", post(connect))
        .route("/api/scheduler/ingest", post(trigger_ingest))
        .route("/api/scheduler/notify-sweep", post(trigger_notify_sweep))
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message } })),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(what: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found", &format!("{what} not found"))
}

fn internal_error(context: &str, e: &anyhow::Error) -> Response {
    error!("{context}: {e:#}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "An internal error occurred",
    )
}

fn promotion_error(e: &PromotionError) -> Response {
    let status = match e {
        PromotionError::AuthorizationRequired { .. } => StatusCode::UNAUTHORIZED,
        PromotionError::PublishRejected { .. } | PromotionError::GenerationFailed(_) => {
            StatusCode::BAD_REQUEST
        }
        PromotionError::NotFound(_) => StatusCode::NOT_FOUND,
        PromotionError::TransientUpstream(_) | PromotionError::FeedUnavailable { .. } => {
            StatusCode::BAD_GATEWAY
        }
        PromotionError::Internal(inner) => return internal_error("Request failed", inner),
    };
    error_response(status, e.code(), &e.user_message())
}

fn accepted(job_id: JobId) -> Response {
    (StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))).into_response()
}

fn parse_platform(value: &str) -> Result<Platform, Response> {
    Platform::parse(value).ok_or_else(|| bad_request(&format!("Unknown platform: {value}")))
}

async fn health() -> &'static str {
    "ok"
}

// ========== Jobs ==========

#[derive(Deserialize)]
struct IngestRequest {
    feed_url: String,
    kind: String,
}

async fn ingest(State(state): State<AppState>, Json(req): Json<IngestRequest>) -> Response {
    let Some(kind) = FeedKind::parse(&req.kind) else {
        return bad_request(&format!("Unknown feed kind: {}", req.kind));
    };
    let feed_url = req.feed_url.trim().to_string();
    if !is_http_url(&feed_url) {
        return bad_request("feed_url must be an http(s) URL");
    }

    match state
        .queue
        .submit(JobPayload::IngestFeed {
            feed_url,
            feed_kind: kind,
        })
        .await
    {
        Ok(id) => accepted(id),
        Err(e) => internal_error("Failed to submit ingest job", &e),
    }
}

#[derive(Deserialize)]
struct ContentJobRequest {
    user_id: i64,
    platform: String,
    #[serde(default)]
    text: Option<String>,
}

/// Check a content/user/platform triple before a job is submitted for it.
async fn validate_triple(
    state: &AppState,
    content_id: i64,
    req: &ContentJobRequest,
) -> Result<Platform, Response> {
    let platform = parse_platform(&req.platform)?;
    match get_content_item(state.db.pool(), content_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(not_found("Content item")),
        Err(e) => return Err(internal_error("Failed to load content item", &e)),
    }
    match get_user(state.db.pool(), req.user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(not_found("User")),
        Err(e) => return Err(internal_error("Failed to load user", &e)),
    }
    Ok(platform)
}

async fn generate(
    State(state): State<AppState>,
    Path(content_id): Path<i64>,
    Json(req): Json<ContentJobRequest>,
) -> Response {
    let platform = match validate_triple(&state, content_id, &req).await {
        Ok(platform) => platform,
        Err(response) => return response,
    };

    match state
        .queue
        .submit(JobPayload::GenerateCopy {
            content_id,
            user_id: req.user_id,
            platform,
        })
        .await
    {
        Ok(id) => accepted(id),
        Err(e) => internal_error("Failed to submit generate job", &e),
    }
}

async fn publish(
    State(state): State<AppState>,
    Path(content_id): Path<i64>,
    Json(req): Json<ContentJobRequest>,
) -> Response {
    let platform = match validate_triple(&state, content_id, &req).await {
        Ok(platform) => platform,
        Err(response) => return response,
    };

    if !state.publisher.supports(platform) {
        return promotion_error(&PromotionError::PublishRejected {
            platform,
            message: format!("{} is not supported", platform.display_name()),
        });
    }

    match state
        .queue
        .submit(JobPayload::PublishPost {
            content_id,
            user_id: req.user_id,
            platform,
            text: req.text,
        })
        .await
    {
        Ok(id) => accepted(id),
        Err(e) => internal_error("Failed to submit publish job", &e),
    }
}

async fn announce(State(state): State<AppState>, Path(content_id): Path<i64>) -> Response {
    match get_content_item(state.db.pool(), content_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("Content item"),
        Err(e) => return internal_error("Failed to load content item", &e),
    }

    match state
        .queue
        .submit(JobPayload::AnnounceContent { content_id })
        .await
    {
        Ok(id) => accepted(id),
        Err(e) => internal_error("Failed to submit announcement job", &e),
    }
}

async fn job_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return not_found("Job");
    };
    match state.queue.status(id).await {
        Ok(Some(status)) => Json(status).into_response(),
        Ok(None) => not_found("Job"),
        Err(e) => internal_error("Failed to read job status", &e),
    }
}

// ========== Content ==========

#[derive(Deserialize)]
struct CreateContentRequest {
    url: String,
    title: Option<String>,
    kind: Option<String>,
    context: Option<String>,
    copy: Option<String>,
    utm_campaign: Option<String>,
    submitted_by: Option<i64>,
}

async fn create_content(
    State(state): State<AppState>,
    Json(req): Json<CreateContentRequest>,
) -> Response {
    let url = req.url.trim();
    if !is_http_url(url) {
        return bad_request("url must be an http(s) URL");
    }
    let kind = match req.kind.as_deref() {
        None => ContentKind::Article,
        Some(kind) => match ContentKind::from_str(kind) {
            Some(kind) => kind,
            None => return bad_request(&format!("Unknown content kind: {kind}")),
        },
    };
    if let Some(user_id) = req.submitted_by {
        match get_user(state.db.pool(), user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return not_found("User"),
            Err(e) => return internal_error("Failed to load user", &e),
        }
    }

    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(url);
    let mut item = NewContentItem::new(url, title, kind);
    item.context = req.context.filter(|c| !c.trim().is_empty());
    item.fixed_copy = req.copy.filter(|c| !c.trim().is_empty());
    item.utm_campaign = req.utm_campaign.filter(|c| !c.trim().is_empty());
    item.submitted_by = req.submitted_by;

    match dedup::record(state.db.pool(), &item).await {
        Ok(outcome) if outcome.created => {
            info!(content_id = outcome.content_id, url = %item.url, "Content submitted");
            (
                StatusCode::CREATED,
                Json(json!({ "id": outcome.content_id, "url": item.url, "title": item.title })),
            )
                .into_response()
        }
        Ok(outcome) => {
            warn!(content_id = outcome.content_id, url = %item.url, "Duplicate content submission");
            (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": { "code": "duplicate", "message": "This content already exists" },
                    "id": outcome.content_id,
                })),
            )
                .into_response()
        }
        Err(e) => internal_error("Failed to store content", &e),
    }
}

// ========== Platform connections ==========

async fn user_exists(state: &AppState, user_id: i64) -> Result<(), Response> {
    match get_user(state.db.pool(), user_id).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(not_found("User")),
        Err(e) => Err(internal_error("Failed to load user", &e)),
    }
}

async fn platform_states(State(state): State<AppState>, Path(user_id): Path<i64>) -> Response {
    if let Err(response) = user_exists(&state, user_id).await {
        return response;
    }

    let mut platforms = BTreeMap::new();
    for platform in Platform::ALL {
        match state.publisher.authorization_state(user_id, platform).await {
            Ok(token_state) => {
                platforms.insert(platform.as_str(), token_state);
            }
            Err(e) => return promotion_error(&e),
        }
    }
    Json(json!({ "user_id": user_id, "platforms": platforms })).into_response()
}

async fn authorize(
    State(state): State<AppState>,
    Path((user_id, platform)): Path<(i64, String)>,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(platform) => platform,
        Err(response) => return response,
    };
    if let Err(response) = user_exists(&state, user_id).await {
        return response;
    }

    let oauth_state = format!("{user_id}.{}", Uuid::new_v4().simple());
    match state.publisher.authorization_url(platform, &oauth_state) {
        Ok(url) => Json(json!({ "authorization_url": url, "state": oauth_state })).into_response(),
        Err(e) => promotion_error(&e),
    }
}

#[derive(Deserialize)]
struct ConnectRequest {
    code: String,
}

async fn connect(
    State(state): State<AppState>,
    Path((user_id, platform)): Path<(i64, String)>,
    Json(req): Json<ConnectRequest>,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(platform) => platform,
        Err(response) => return response,
    };
    if req.code.trim().is_empty() {
        return bad_request("code is required");
    }
    if let Err(response) = user_exists(&state, user_id).await {
        return response;
    }

    match state.publisher.connect(user_id, platform, req.code.trim()).await {
        Ok(token_state) => {
            Json(json!({ "platform": platform, "state": token_state })).into_response()
        }
        Err(e) => promotion_error(&e),
    }
}

async fn disconnect(
    State(state): State<AppState>,
    Path((user_id, platform)): Path<(i64, String)>,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(platform) => platform,
        Err(response) => return response,
    };
    if let Err(response) = user_exists(&state, user_id).await {
        return response;
    }

    match state.publisher.disconnect(user_id, platform).await {
        Ok(token_state) => {
            Json(json!({ "platform": platform, "state": token_state })).into_response()
        }
        Err(e) => promotion_error(&e),
    }
}

// ========== Manual scheduler triggers ==========

async fn trigger_ingest(State(state): State<AppState>) -> Response {
    if state.config.content_feeds.is_empty() {
        return bad_request("No content feeds are configured");
    }
    match submit_ingestion_batch(&state.queue, &state.config.content_feeds).await {
        Ok(id) => accepted(id),
        Err(e) => internal_error("Failed to submit ingestion batch", &e),
    }
}

async fn trigger_notify_sweep(State(state): State<AppState>) -> Response {
    match submit_notify_sweep(&state.queue).await {
        Ok(id) => accepted(id),
        Err(e) => internal_error("Failed to submit notify sweep", &e),
    }
}
