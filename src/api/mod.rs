// HTTP API routes: the callback boundary over the game engines.
//
// Chat-platform concerns (webhook signatures, block rendering, slash-command
// parsing) live outside this service; these endpoints speak plain
// TurnResult/RejectedResult JSON.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{ActionError, GameEngine};
use crate::metrics;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct StartRequest {
    pub user_id: String,
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    pub user_id: String,
    pub item_id: String,
    pub option_id: String,
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub user_id: String,
    pub item_id: String,
}

// ── Shared application state ─────────────────────────────────────────

/// One engine per loaded catalog, keyed by catalog name.
pub type EngineMap = HashMap<String, Arc<GameEngine>>;

#[derive(Clone)]
pub struct AppState {
    pub games: Arc<EngineMap>,
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

/// Map an engine rejection to a response. Stale actions are not errors to a
/// retrying chat client: reply 200 with the turn as last shown so the caller
/// simply re-renders it.
fn rejection(err: ActionError) -> axum::response::Response {
    match err {
        ActionError::Stale { current, .. } => (
            StatusCode::OK,
            Json(json!({
                "rejected": true,
                "reason": "stale_action",
                "turn": current,
            })),
        )
            .into_response(),
        ActionError::NoActiveSession => (
            StatusCode::CONFLICT,
            Json(json!({
                "rejected": true,
                "reason": "no_active_session",
                "error": "No active session — start a new game",
            })),
        )
            .into_response(),
        ActionError::NotFound(e) => {
            tracing::error!("Catalog lookup failed mid-session: {e}");
            json_error(StatusCode::NOT_FOUND, &e.to_string()).into_response()
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(games: Arc<EngineMap>) -> Router {
    let state = AppState { games };

    Router::new()
        .route("/api/catalogs", get(list_catalogs))
        .route("/api/games/{catalog}/start", post(start_game))
        .route("/api/games/{catalog}/answer", post(submit_answer))
        .route("/api/games/{catalog}/advance", post(advance))
        .route("/api/games/{catalog}/state/{user_id}", get(game_state))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn list_catalogs(State(state): State<AppState>) -> impl IntoResponse {
    let mut catalogs: Vec<_> = state
        .games
        .values()
        .map(|engine| {
            json!({
                "name": engine.catalog().name,
                "mode": engine.catalog().mode,
                "items": engine.catalog().len(),
            })
        })
        .collect();
    catalogs.sort_by_key(|c| c["name"].as_str().map(str::to_string));
    (StatusCode::OK, Json(json!(catalogs)))
}

async fn start_game(
    State(state): State<AppState>,
    Path(catalog): Path<String>,
    Json(req): Json<StartRequest>,
) -> impl IntoResponse {
    let Some(engine) = state.games.get(&catalog) else {
        return json_error(StatusCode::NOT_FOUND, "Catalog not found").into_response();
    };
    if req.user_id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "user_id is required").into_response();
    }

    let turn = engine.start_session(&req.user_id);
    (StatusCode::OK, Json(json!(turn))).into_response()
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(catalog): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> impl IntoResponse {
    let Some(engine) = state.games.get(&catalog) else {
        return json_error(StatusCode::NOT_FOUND, "Catalog not found").into_response();
    };

    match engine.submit_answer(&req.user_id, &req.item_id, &req.option_id) {
        Ok(turn) => (StatusCode::OK, Json(json!(turn))).into_response(),
        Err(e) => rejection(e),
    }
}

async fn advance(
    State(state): State<AppState>,
    Path(catalog): Path<String>,
    Json(req): Json<AdvanceRequest>,
) -> impl IntoResponse {
    let Some(engine) = state.games.get(&catalog) else {
        return json_error(StatusCode::NOT_FOUND, "Catalog not found").into_response();
    };

    match engine.advance(&req.user_id, &req.item_id) {
        Ok(turn) => (StatusCode::OK, Json(json!(turn))).into_response(),
        Err(e) => rejection(e),
    }
}

async fn game_state(
    State(state): State<AppState>,
    Path((catalog, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let Some(engine) = state.games.get(&catalog) else {
        return json_error(StatusCode::NOT_FOUND, "Catalog not found").into_response();
    };

    // An absent session is a normal answer, not an error.
    let session = engine.current_state(&user_id);
    (StatusCode::OK, Json(json!({ "session": session }))).into_response()
}

async fn serve_metrics() -> impl IntoResponse {
    (StatusCode::OK, metrics::gather_metrics())
}
