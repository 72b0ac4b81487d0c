use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::auth::require_owner;
use crate::error::{AppError, AppResult};
use crate::graph::relationship::{self, Label};
use crate::graph::{query_all, query_opt, GraphStore, Rel, StoreError};
use crate::models::{Post, PostPage};
use crate::services::{comments, notifications, validate_content, MAX_POST_CHARS};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostChanges {
    pub content: Option<String>,
    pub image_url: Option<String>,
}

impl PostChanges {
    fn is_empty(&self) -> bool {
        self.content.is_none() && self.image_url.is_none()
    }
}

#[derive(Clone)]
pub struct PostService {
    store: GraphStore,
}

impl PostService {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        author_id: &str,
        content: &str,
        image_url: Option<String>,
    ) -> AppResult<Post> {
        let content = validate_content(content, image_url.is_some(), MAX_POST_CHARS, "Post")?;
        let author_id = author_id.to_string();
        let post_id = uuid::Uuid::now_v7().to_string();
        let now = Utc::now();

        let post = self
            .store
            .write(move |tx| -> AppResult<Post> {
                if !relationship::node_exists(tx, Label::User, &author_id)? {
                    return Err(AppError::NotFound("User"));
                }
                tx.execute(
                    "INSERT INTO posts (id, content, image_url, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![post_id, content, image_url, now],
                )?;
                relationship::link(tx, &author_id, Rel::Created, &post_id, now)?;
                fetch_post(tx, &post_id)?.ok_or(AppError::NotFound("Post"))
            })
            .await?;

        tracing::info!("User {} created post {}", post.user_id, post.post_id);
        Ok(post)
    }

    /// Every post, newest first.
    pub async fn list(&self) -> AppResult<PostPage> {
        let posts: Vec<Post> = self
            .store
            .read(|conn| {
                query_all(
                    conn,
                    "SELECT p.id AS post_id, p.content, p.image_url, p.created_at, p.updated_at,
                            u.id AS user_id, u.username, u.profile_picture
                     FROM posts p
                     JOIN relationships r ON r.to_id = p.id AND r.rel_type = 'CREATED'
                     JOIN users u ON u.id = r.from_id
                     ORDER BY p.created_at DESC, p.rowid DESC",
                    [],
                )
            })
            .await
            .map_err(AppError::from)?;
        Ok(PostPage {
            total: posts.len(),
            posts,
        })
    }

    pub async fn get(&self, post_id: &str) -> AppResult<Post> {
        let post_id = post_id.to_string();
        self.store
            .read(move |conn| -> AppResult<Post> {
                fetch_post(conn, &post_id)?.ok_or(AppError::NotFound("Post"))
            })
            .await
    }

    pub async fn update(&self, post_id: &str, actor_id: &str, changes: PostChanges) -> AppResult<Post> {
        if changes.is_empty() {
            return Err(AppError::BadRequest("No changes supplied".into()));
        }
        let post_id = post_id.to_string();
        let actor_id = actor_id.to_string();
        let now = Utc::now();

        self.store
            .write(move |tx| -> AppResult<Post> {
                let current = fetch_post(tx, &post_id)?.ok_or(AppError::NotFound("Post"))?;
                require_owner(tx, &actor_id, Rel::Created, &post_id)?;

                let has_image = changes.image_url.is_some() || current.image_url.is_some();
                let content = changes
                    .content
                    .as_deref()
                    .map(|c| validate_content(c, has_image, MAX_POST_CHARS, "Post"))
                    .transpose()?;

                tx.execute(
                    "UPDATE posts SET
                       content = COALESCE(?2, content),
                       image_url = COALESCE(?3, image_url),
                       updated_at = ?4
                     WHERE id = ?1",
                    params![post_id, content, changes.image_url, now],
                )?;
                fetch_post(tx, &post_id)?.ok_or(AppError::NotFound("Post"))
            })
            .await
    }

    /// Delete a post together with its comments, replies, reactions and the
    /// notifications that point at any of them.
    pub async fn delete(&self, post_id: &str, actor_id: &str) -> AppResult<()> {
        let post_id = post_id.to_string();
        let actor_id = actor_id.to_string();
        let deleted = post_id.clone();

        self.store
            .write(move |tx| -> AppResult<()> {
                if !relationship::node_exists(tx, Label::Post, &post_id)? {
                    return Err(AppError::NotFound("Post"));
                }
                require_owner(tx, &actor_id, Rel::Created, &post_id)?;
                purge_post(tx, &post_id)?;
                Ok(())
            })
            .await?;

        tracing::info!("Post {} deleted", deleted);
        Ok(())
    }
}

fn fetch_post(conn: &Connection, post_id: &str) -> Result<Option<Post>, StoreError> {
    query_opt(
        conn,
        "SELECT p.id AS post_id, p.content, p.image_url, p.created_at, p.updated_at,
                u.id AS user_id, u.username, u.profile_picture
         FROM posts p
         JOIN relationships r ON r.to_id = p.id AND r.rel_type = 'CREATED'
         JOIN users u ON u.id = r.from_id
         WHERE p.id = ?1",
        params![post_id],
    )
}

/// Remove a post and everything hanging off it, inside the caller's
/// transaction.
pub(crate) fn purge_post(conn: &Connection, post_id: &str) -> Result<(), StoreError> {
    for comment_id in relationship::sources(conn, Rel::On, post_id)? {
        comments::purge_comment(conn, &comment_id)?;
    }
    notifications::purge_referencing(conn, post_id)?;
    relationship::detach_delete(conn, Label::Post, post_id)?;
    Ok(())
}
