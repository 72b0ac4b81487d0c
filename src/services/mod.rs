//! Domain services. Each one owns a clone of the shared [`GraphStore`] and
//! runs every unit of work as a single read or write against it.

pub mod comments;
pub mod notifications;
pub mod posts;
pub mod reactions;
pub mod users;

use std::sync::Arc;

use crate::auth::SessionKeys;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::graph::GraphStore;

pub use comments::{CommentChanges, CommentService, NewComment};
pub use notifications::{NotificationEvent, NotificationService};
pub use posts::{PostChanges, PostService};
pub use reactions::ReactionService;
pub use users::{LoginResponse, NewUser, ProfileChanges, UserService};

pub const MAX_POST_CHARS: usize = 2000;
pub const MAX_COMMENT_CHARS: usize = 500;

#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub posts: PostService,
    pub comments: CommentService,
    pub reactions: ReactionService,
    pub notifications: NotificationService,
}

impl Services {
    pub fn new(store: GraphStore, sessions: Arc<SessionKeys>, config: &Config) -> Self {
        let notifications = NotificationService::new(store.clone(), config.notifications.clone());
        Self {
            users: UserService::new(store.clone(), sessions.clone(), config.auth.bcrypt_cost),
            posts: PostService::new(store.clone()),
            comments: CommentService::new(store.clone(), notifications.clone()),
            reactions: ReactionService::new(store, notifications.clone(), sessions),
            notifications,
        }
    }
}

/// Trim `content` and enforce its length. Empty text is only accepted when an
/// image carries the post or comment.
pub(crate) fn validate_content(
    content: &str,
    has_image: bool,
    max_chars: usize,
    what: &str,
) -> AppResult<String> {
    let trimmed = content.trim();
    if trimmed.chars().count() > max_chars {
        return Err(AppError::BadRequest(format!(
            "{} must be {} characters or less",
            what, max_chars
        )));
    }
    if trimmed.is_empty() && !has_image {
        return Err(AppError::BadRequest(format!("{} cannot be empty", what)));
    }
    Ok(trimmed.to_string())
}
