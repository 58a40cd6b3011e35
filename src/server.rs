//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/search` | Answer `{q}` from the index; session from the `session` cookie |
//! | `GET`  | `/api/search` | Current session id and its history |
//! | `GET`  | `/api/daily` | Latest daily reminder |
//! | `POST` | `/api/daily` | Reminder for `{date}` (today or latest when omitted) |
//! | `GET`  | `/api/daily/{date}` | Reminder stored for a `YYYY-MM-DD` date |
//! | `GET`  | `/api/hijri/date` | Today's Gregorian and Hijri dates |
//! | `POST` | `/api/push/subscribe` | Register a push subscription |
//! | `POST` | `/api/push/unsubscribe` | Remove a push subscription by endpoint |
//! | `GET`  | `/health` | Status, version and index readiness |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `indexing` (503),
//! `query_error` (500), `llm_error` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::daily::DailyState;
use crate::error::{QueryError, SearchError};
use crate::hijri::Today;
use crate::push::Subscription;
use crate::search::{answer, SearchResponse};
use crate::state::AppContext;

const SESSION_COOKIE: &str = "session";

/// Bind `[server].bind` and serve until `cancel` fires.
pub async fn run_server(ctx: Arc<AppContext>, cancel: CancellationToken) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", bind_addr);
    serve(listener, ctx, cancel).await
}

/// Serve on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<AppContext>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/search", post(handle_search).get(handle_history))
        .route("/api/daily", get(handle_daily).post(handle_daily_for))
        .route("/api/daily/{date}", get(handle_daily_by_date))
        .route("/api/hijri/date", get(handle_hijri))
        .route("/api/push/subscribe", post(handle_subscribe))
        .route("/api/push/unsubscribe", post(handle_unsubscribe))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(ctx)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!("request failed: {:#}", err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        let message = err.to_string();
        match err {
            SearchError::NotReady(_) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "indexing",
                message,
            },
            SearchError::EmptyQuestion | SearchError::Query(QueryError::EmptyQuery) => {
                bad_request(message)
            }
            SearchError::Query(_) => {
                tracing::error!("search query failed: {}", message);
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "query_error",
                    message,
                }
            }
            SearchError::Llm(_) => {
                tracing::error!("answer generation failed: {}", message);
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "llm_error",
                    message,
                }
            }
        }
    }
}

// ============ Session cookie ============

fn session_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// The request's session id and, for a new session, the cookie to set.
fn resolve_session(headers: &HeaderMap) -> (String, Option<HeaderValue>) {
    match session_from(headers) {
        Some(id) => (id, None),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
            (id, HeaderValue::from_str(&cookie).ok())
        }
    }
}

fn with_cookie<T: IntoResponse>(body: T, cookie: Option<HeaderValue>) -> Response {
    let mut resp = body.into_response();
    if let Some(cookie) = cookie {
        resp.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    resp
}

// ============ /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    q: String,
}

async fn handle_search(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload?;
    let (session, cookie) = resolve_session(&headers);
    let resp: SearchResponse = answer(&ctx, &session, &req.q).await?;
    Ok(with_cookie(Json(resp), cookie))
}

#[derive(Serialize)]
struct HistoryResponse {
    session: String,
    history: Vec<String>,
}

async fn handle_history(State(ctx): State<Arc<AppContext>>, headers: HeaderMap) -> Response {
    let (session, cookie) = resolve_session(&headers);
    let history = ctx.sessions.history(&session);
    with_cookie(Json(HistoryResponse { session, history }), cookie)
}

// ============ /api/daily ============

async fn handle_daily(State(ctx): State<Arc<AppContext>>) -> Result<Json<DailyState>, AppError> {
    ctx.daily
        .current()
        .await
        .map(Json)
        .ok_or_else(|| not_found("no daily reminder published yet"))
}

#[derive(Deserialize, Default)]
struct DailyRequest {
    #[serde(default)]
    date: Option<String>,
}

async fn handle_daily_for(
    State(ctx): State<Arc<AppContext>>,
    body: Bytes,
) -> Result<Json<DailyState>, AppError> {
    let req: DailyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DailyRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid body: {}", e)))?
    };

    let state = match req.date.filter(|d| !d.trim().is_empty()) {
        Some(date) => ctx.daily.by_date(date.trim()).await,
        None => {
            let today = Utc::now().format("%Y-%m-%d").to_string();
            match ctx.daily.by_date(&today).await {
                Some(s) => Some(s),
                None => ctx.daily.current().await,
            }
        }
    };
    state
        .map(Json)
        .ok_or_else(|| not_found("no daily reminder for that date"))
}

async fn handle_daily_by_date(
    State(ctx): State<Arc<AppContext>>,
    Path(date): Path<String>,
) -> Result<Json<DailyState>, AppError> {
    ctx.daily
        .by_date(&date)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("no daily reminder for {}", date)))
}

async fn handle_hijri() -> Json<Today> {
    Json(Today::for_date(Utc::now().date_naive()))
}

// ============ /api/push ============

async fn handle_subscribe(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<Subscription>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(sub) = payload?;
    if sub.endpoint.trim().is_empty() {
        return Err(bad_request("endpoint must not be empty"));
    }
    let endpoint = sub.endpoint.clone();
    ctx.subscriptions.add(sub).map_err(internal)?;
    tracing::info!(%endpoint, "push subscription added");
    Ok(Json(serde_json::json!({ "subscribed": endpoint })))
}

#[derive(Deserialize)]
struct UnsubscribeRequest {
    endpoint: String,
}

async fn handle_unsubscribe(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<UnsubscribeRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(req) = payload?;
    let removed = ctx.subscriptions.remove(&req.endpoint).map_err(internal)?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    indexed: bool,
    documents: usize,
}

async fn handle_health(State(ctx): State<Arc<AppContext>>) -> Json<HealthResponse> {
    let indexed = ctx.readiness.is_ready();
    // The document count reads the collection, so only report it once indexing is done.
    let documents = if indexed { ctx.index.len().await } else { 0 };
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        indexed,
        documents,
    })
}
