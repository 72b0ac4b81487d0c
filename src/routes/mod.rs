pub mod comments;
pub mod notifications;
pub mod posts;
pub mod reactions;
pub mod users;

use std::collections::HashMap;

use axum::extract::Multipart;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::media::{MediaKind, MediaUpload};
use crate::state::AppState;

/// The full HTTP surface.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(health))
        .merge(users::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(reactions::router())
        .merge(notifications::router())
        .nest_service("/uploads", ServeDir::new(state.config.uploads_path()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// `"*"` anywhere in the list allows every origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin.trim() == "*") {
        AllowOrigin::any()
    } else {
        let list: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Text fields plus at most one file from a multipart body.
#[derive(Debug, Default)]
pub(crate) struct MultipartForm {
    fields: HashMap<String, String>,
    file: Option<MediaUpload>,
}

impl MultipartForm {
    pub(crate) async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = MultipartForm::default();
        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                // browsers send an empty file part when nothing was picked
                Some(file_name) if !file_name.is_empty() => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(bad_multipart)?;
                    if !bytes.is_empty() {
                        form.file = Some(MediaUpload {
                            file_name,
                            content_type,
                            bytes,
                        });
                    }
                }
                Some(_) => {}
                None => {
                    let value = field.text().await.map_err(bad_multipart)?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    pub(crate) fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub(crate) fn required(&self, name: &str) -> AppResult<&str> {
        self.text(name)
            .ok_or_else(|| AppError::BadRequest(format!("Missing field '{}'", name)))
    }

    /// Store the attached file, if any, and return its URL.
    pub(crate) async fn store_file(
        &mut self,
        state: &AppState,
        kind: MediaKind,
    ) -> AppResult<Option<String>> {
        match self.file.take() {
            Some(upload) => Ok(Some(state.media.store(kind, upload).await?)),
            None => Ok(None),
        }
    }
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid multipart body: {}", err))
}
