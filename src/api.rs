//! REST API router for the offsetting engine.
//!
//! Used by the binary and by integration tests. Create with [`create_router`].
//! Uses Extension for state so the router is `Router<()>` and works with `into_make_service()`.
//! `/health` and `/cities` are public; every other route requires an identity (see [`crate::auth`]).

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::warn;

use crate::auth::{require_identity, AuthConfig, AuthUser};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::matching::RejectDisposition;
use crate::persistence::FilePersistence;
use crate::store::ListFilter;
use crate::types::{NewTransaction, TransactionId, TransactionStatus, UserId};

/// Shared app state: one engine per process, optional snapshot file.
#[derive(Clone)]
pub struct AppState {
    pub(crate) engine: Arc<Engine>,
    pub(crate) persistence: Option<FilePersistence>,
}

impl AppState {
    /// Snapshots and writes the state file on the blocking pool.
    async fn persist(&self) {
        let Some(p) = self.persistence.clone() else {
            return;
        };
        let engine = Arc::clone(&self.engine);
        match tokio::task::spawn_blocking(move || p.save_with(|| engine.state())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("failed to persist state: {}", e),
            Err(e) => warn!("persist task failed: {}", e),
        }
    }
}

impl EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidState(_) | EngineError::StaleState(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        (status, body).into_response()
    }
}

fn respond<T: serde::Serialize>(result: EngineResult<T>) -> Response {
    match result {
        Ok(v) => (StatusCode::OK, Json(v)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Like [`respond`], saving a snapshot first when the mutation succeeded.
async fn respond_mutation<T: serde::Serialize>(state: &AppState, result: EngineResult<T>) -> Response {
    if result.is_ok() {
        state.persist().await;
    }
    respond(result)
}

/// Builds the REST router. Returns `Router<()>` so you can call `.into_make_service()` for `axum::serve`.
pub fn create_router(engine: Arc<Engine>, auth: AuthConfig, persistence: Option<FilePersistence>) -> Router<()> {
    let state = AppState { engine, persistence };
    let protected = Router::new()
        .route("/transactions", post(post_transaction).get(list_transactions))
        .route("/transactions/:id", get(get_transaction))
        .route("/transactions/:id/candidates", get(find_candidates))
        .route("/transactions/:id/match", post(create_match))
        .route("/transactions/:id/review", post(submit_for_review))
        .route("/transactions/:id/withdraw", post(withdraw_match))
        .route("/transactions/:id/cancel", post(cancel_transaction))
        .route("/transactions/:id/messages", post(send_message).get(transcript))
        .route("/transactions/:id/ratings", post(rate))
        .route("/users/:id", get(get_user))
        .route("/users/:id/transactions", get(user_transactions))
        .route("/users/:id/ratings", get(user_ratings))
        .route("/admin/transactions/:id/approve", post(approve))
        .route("/admin/transactions/:id/reject", post(reject))
        .route_layer(middleware::from_fn(move |req: Request, next: Next| {
            let auth = auth.clone();
            async move { require_identity(req, next, auth).await }
        }));
    Router::new()
        .route("/health", get(health))
        .route("/cities", get(cities))
        .merge(protected)
        .layer(Extension(state))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn cities(Extension(state): Extension<AppState>) -> Response {
    #[derive(serde::Serialize)]
    struct Out {
        cities: Vec<String>,
    }
    (StatusCode::OK, Json(Out { cities: state.engine.cities() })).into_response()
}

async fn post_transaction(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(submission): Json<NewTransaction>,
) -> Response {
    let result = state.engine.post_transaction(user.user_id, &submission);
    respond_mutation(&state, result).await
}

#[derive(serde::Deserialize)]
struct ListQuery {
    city: Option<String>,
    status: Option<String>,
}

async fn list_transactions(Extension(state): Extension<AppState>, Query(q): Query<ListQuery>) -> Response {
    let status = match q.status.as_deref() {
        None => None,
        Some(s) => match TransactionStatus::from_str(s) {
            Some(st) => Some(st),
            None => return EngineError::Validation(format!("unknown status {}", s)).into_response(),
        },
    };
    let filter = ListFilter {
        city: q.city,
        status,
        owner: None,
    };
    (StatusCode::OK, Json(state.engine.list_transactions(&filter))).into_response()
}

async fn get_transaction(Extension(state): Extension<AppState>, Path(id): Path<u64>) -> Response {
    respond(state.engine.transaction(TransactionId(id)))
}

async fn find_candidates(Extension(state): Extension<AppState>, Path(id): Path<u64>) -> Response {
    respond(state.engine.find_candidates(TransactionId(id)))
}

#[derive(serde::Deserialize)]
struct MatchRequest {
    candidate_id: u64,
}

async fn create_match(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
    Json(body): Json<MatchRequest>,
) -> Response {
    let result = state
        .engine
        .create_match(TransactionId(id), TransactionId(body.candidate_id), user.user_id);
    respond_mutation(&state, result).await
}

async fn submit_for_review(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
) -> Response {
    let result = state.engine.submit_for_review(TransactionId(id), user.user_id);
    respond_mutation(&state, result).await
}

async fn withdraw_match(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
) -> Response {
    let result = state.engine.withdraw_match(TransactionId(id), user.user_id);
    respond_mutation(&state, result).await
}

async fn cancel_transaction(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
) -> Response {
    let result = state.engine.cancel_transaction(TransactionId(id), user.user_id);
    respond_mutation(&state, result).await
}

#[derive(serde::Deserialize)]
struct MessageRequest {
    #[serde(default)]
    receiver_id: Option<u64>,
    body: String,
}

async fn send_message(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
    Json(req): Json<MessageRequest>,
) -> Response {
    let result = state
        .engine
        .send_message(TransactionId(id), user.user_id, req.receiver_id.map(UserId), &req.body);
    respond_mutation(&state, result).await
}

async fn transcript(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
) -> Response {
    respond(state.engine.transcript(TransactionId(id), user.user_id))
}

#[derive(serde::Deserialize)]
struct RatingRequest {
    score: u8,
    #[serde(default)]
    comment: String,
}

async fn rate(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
    Json(req): Json<RatingRequest>,
) -> Response {
    let result = state
        .engine
        .rate(TransactionId(id), user.user_id, req.score, &req.comment);
    respond_mutation(&state, result).await
}

async fn get_user(Extension(state): Extension<AppState>, Path(id): Path<u64>) -> Response {
    #[derive(serde::Serialize)]
    struct Out {
        #[serde(flatten)]
        profile: crate::registry::UserProfile,
        rating: Option<rust_decimal::Decimal>,
    }
    let user = UserId(id);
    respond(state.engine.user(user).map(|profile| Out {
        profile,
        rating: state.engine.average_rating(user),
    }))
}

async fn user_transactions(Extension(state): Extension<AppState>, Path(id): Path<u64>) -> Response {
    (StatusCode::OK, Json(state.engine.transactions_for_owner(UserId(id)))).into_response()
}

async fn user_ratings(Extension(state): Extension<AppState>, Path(id): Path<u64>) -> Response {
    (StatusCode::OK, Json(state.engine.ratings_for(UserId(id)))).into_response()
}

async fn approve(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
) -> Response {
    let result = state.engine.approve(TransactionId(id), user.user_id);
    respond_mutation(&state, result).await
}

#[derive(serde::Deserialize, Default)]
struct RejectRequest {
    #[serde(default)]
    disposition: RejectDisposition,
}

async fn reject(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
    body: Option<Json<RejectRequest>>,
) -> Response {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let result = state.engine.reject(TransactionId(id), user.user_id, req.disposition);
    respond_mutation(&state, result).await
}
