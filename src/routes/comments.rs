use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::media::MediaKind;
use crate::routes::MultipartForm;
use crate::services::{CommentChanges, NewComment};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments", post(create_comment))
        .route("/comments/reply", post(create_reply))
        // one path segment, two meanings: a post id for reads, a comment id
        // for mutations
        .route(
            "/comments/{id}",
            get(get_thread).put(update_comment).delete(delete_comment),
        )
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut form = MultipartForm::read(multipart).await?;
    let post_id = form.required("post_id")?.to_string();
    let content = form.text("content").unwrap_or_default().to_string();
    let image_url = form.store_file(&state, MediaKind::Comment).await?;

    let comment = state
        .services
        .comments
        .create_comment(NewComment {
            post_id,
            author_id: user.id,
            content,
            image_url,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "comment": comment }))))
}

async fn create_reply(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut form = MultipartForm::read(multipart).await?;
    let post_id = form.required("post_id")?.to_string();
    let parent_id = form.required("parent_comment_id")?.to_string();
    let content = form.text("content").unwrap_or_default().to_string();
    let image_url = form.store_file(&state, MediaKind::Comment).await?;

    let reply = state
        .services
        .comments
        .create_reply(
            &parent_id,
            NewComment {
                post_id,
                author_id: user.id,
                content,
                image_url,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "comment": reply }))))
}

async fn get_thread(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<Value>> {
    let comments = state.services.comments.get_thread(&post_id).await?;
    Ok(Json(json!({ "comments": comments })))
}

async fn update_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(changes): Json<CommentChanges>,
) -> AppResult<Json<Value>> {
    let comment = state
        .services
        .comments
        .update_comment(&id, &user.id, changes)
        .await?;
    Ok(Json(json!({ "comment": comment })))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.services.comments.delete_comment(&id, &user.id).await?;
    Ok(Json(json!({ "message": "Comment deleted", "comment_id": id })))
}
