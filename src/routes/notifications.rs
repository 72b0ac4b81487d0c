use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::models::Inbox;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct InboxQuery {
    pub limit: Option<u32>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/{id}/read", put(mark_read))
}

async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<InboxQuery>,
) -> AppResult<Json<Inbox>> {
    let inbox = state
        .services
        .notifications
        .list_for_user(&user.id, query.limit)
        .await?;
    Ok(Json(inbox))
}

async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.services.notifications.mark_read(&id, &user.id).await?;
    Ok(Json(json!({ "message": "Notification marked as read" })))
}

async fn mark_all_read(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let count = state.services.notifications.mark_all_read(&user.id).await?;
    Ok(Json(json!({
        "message": format!("{} notifications marked as read", count),
        "count": count
    })))
}
