use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::extractors::{BearerToken, CurrentUser};
use crate::models::{Reaction, ReactionKind, ReactionSummary};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReactionRequest {
    pub post_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reactions", get(list_reactions).post(upsert_reaction))
        .route("/reactions/post/{post_id}", get(post_reactions))
        .route("/reactions/{post_id}", delete(delete_reaction))
}

async fn upsert_reaction(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ReactionRequest>,
) -> AppResult<Json<Reaction>> {
    let kind: ReactionKind = request
        .kind
        .trim()
        .to_lowercase()
        .parse()
        .map_err(AppError::BadRequest)?;
    let reaction = state
        .services
        .reactions
        .upsert_reaction(&user.id, &request.post_id, kind)
        .await?;
    Ok(Json(reaction))
}

async fn list_reactions(State(state): State<AppState>) -> AppResult<Json<Vec<Reaction>>> {
    Ok(Json(state.services.reactions.list_all().await?))
}

async fn post_reactions(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(post_id): Path<String>,
) -> AppResult<Json<ReactionSummary>> {
    let summary = state
        .services
        .reactions
        .aggregate(&post_id, token.as_deref())
        .await?;
    Ok(Json(summary))
}

async fn delete_reaction(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<Value>> {
    state
        .services
        .reactions
        .delete_reaction(&user.id, &post_id)
        .await?;
    Ok(Json(json!({ "message": "Reaction removed", "post_id": post_id })))
}
