use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::media::MediaKind;
use crate::models::PostPage;
use crate::routes::MultipartForm;
use crate::services::PostChanges;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut form = MultipartForm::read(multipart).await?;
    let content = form.text("content").unwrap_or_default().to_string();
    let image_url = form.store_file(&state, MediaKind::Post).await?;

    let post = state
        .services
        .posts
        .create(&user.id, &content, image_url)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "post": post }))))
}

async fn list_posts(State(state): State<AppState>) -> AppResult<Json<PostPage>> {
    Ok(Json(state.services.posts.list().await?))
}

async fn get_post(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let post = state.services.posts.get(&id).await?;
    Ok(Json(json!({ "post": post })))
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut form = MultipartForm::read(multipart).await?;
    let content = form.text("content").map(str::to_string);
    let image_url = form.store_file(&state, MediaKind::Post).await?;

    let post = state
        .services
        .posts
        .update(&id, &user.id, PostChanges { content, image_url })
        .await?;
    Ok(Json(json!({ "post": post })))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.services.posts.delete(&id, &user.id).await?;
    Ok(Json(json!({ "message": "Post deleted", "post_id": id })))
}
