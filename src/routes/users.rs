use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{require_self, Principal};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media::MediaKind;
use crate::models::User;
use crate::routes::MultipartForm;
use crate::services::{LoginResponse, NewUser, ProfileChanges};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/me", get(me))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/profile-picture", post(upload_profile_picture))
}

async fn register(
    State(state): State<AppState>,
    Json(new_user): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.users.register(new_user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let response = state
        .services
        .users
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(response))
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    let principal = Principal {
        user_id: user.id,
        username: user.username,
    };
    Ok(Json(state.services.users.me(&principal).await?))
}

async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.services.users.list().await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    Ok(Json(state.services.users.get(&id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(changes): Json<ProfileChanges>,
) -> AppResult<Json<User>> {
    let updated = state
        .services
        .users
        .update_profile(&user.id, &id, changes)
        .await?;
    Ok(Json(updated))
}

async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.services.users.delete(&user.id, &id).await?;
    Ok(Json(json!({ "message": "User deleted", "user_id": id })))
}

async fn upload_profile_picture(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<User>> {
    // check before the file touches disk
    require_self(&user.id, &id)?;
    let mut form = MultipartForm::read(multipart).await?;
    let url = form
        .store_file(&state, MediaKind::Profile)
        .await?
        .ok_or_else(|| AppError::BadRequest("Missing image file".into()))?;

    let updated = state
        .services
        .users
        .set_profile_picture(&user.id, &id, &url)
        .await?;
    Ok(Json(updated))
}
