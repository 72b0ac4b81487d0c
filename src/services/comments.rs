use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::auth::require_owner;
use crate::error::{AppError, AppResult};
use crate::graph::relationship::{self, Label};
use crate::graph::{query_all, query_opt, GraphStore, Rel, StoreError};
use crate::models::{Comment, NotificationKind};
use crate::services::notifications::{self, NotificationEvent, NotificationService};
use crate::services::{validate_content, MAX_COMMENT_CHARS};

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentChanges {
    pub content: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Clone)]
pub struct CommentService {
    store: GraphStore,
    notifications: NotificationService,
}

impl CommentService {
    pub fn new(store: GraphStore, notifications: NotificationService) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Comment on a post. The post's owner is notified.
    pub async fn create_comment(&self, new: NewComment) -> AppResult<Comment> {
        let content = validate_content(
            &new.content,
            new.image_url.is_some(),
            MAX_COMMENT_CHARS,
            "Comment",
        )?;
        let comment_id = uuid::Uuid::now_v7().to_string();
        let now = Utc::now();

        let (comment, post_owner) = self
            .store
            .write(move |tx| -> AppResult<(Comment, Option<String>)> {
                ensure_post_and_author(tx, &new.post_id, &new.author_id)?;
                insert_comment(tx, &comment_id, &new, &content, None, now)?;
                let owner = relationship::source_of(tx, Rel::Created, &new.post_id)?;
                let comment = fetch_comment(tx, &comment_id)?.ok_or(AppError::NotFound("Comment"))?;
                Ok((comment, owner))
            })
            .await?;

        tracing::info!(
            "User {} commented {} on post {}",
            comment.user_id,
            comment.comment_id,
            comment.post_id
        );
        if let Some(owner) = post_owner {
            self.notifications.dispatch(NotificationEvent {
                recipient_id: owner,
                actor_id: comment.user_id.clone(),
                kind: NotificationKind::Comment,
                post_id: Some(comment.post_id.clone()),
                comment_id: Some(comment.comment_id.clone()),
            });
        }
        Ok(comment)
    }

    /// Reply to `parent_id`. Threads are one level deep: a reply aimed at a
    /// reply is attached to that reply's root comment, while the author of
    /// the comment actually answered is the one notified.
    pub async fn create_reply(&self, parent_id: &str, new: NewComment) -> AppResult<Comment> {
        let content = validate_content(
            &new.content,
            new.image_url.is_some(),
            MAX_COMMENT_CHARS,
            "Reply",
        )?;
        let parent_id = parent_id.to_string();
        let comment_id = uuid::Uuid::now_v7().to_string();
        let now = Utc::now();

        let (reply, parent_author) = self
            .store
            .write(move |tx| -> AppResult<(Comment, Option<String>)> {
                ensure_post_and_author(tx, &new.post_id, &new.author_id)?;

                let parent_post = relationship::target_of(tx, &parent_id, Rel::On)?;
                if parent_post.as_deref() != Some(new.post_id.as_str()) {
                    return Err(AppError::NotFound("Comment"));
                }
                let root = relationship::target_of(tx, &parent_id, Rel::RepliedTo)?
                    .unwrap_or_else(|| parent_id.clone());
                let parent_author = relationship::source_of(tx, Rel::Commented, &parent_id)?;

                insert_comment(tx, &comment_id, &new, &content, Some(&root), now)?;
                let reply = fetch_comment(tx, &comment_id)?.ok_or(AppError::NotFound("Comment"))?;
                Ok((reply, parent_author))
            })
            .await?;

        tracing::info!(
            "User {} replied {} under comment {}",
            reply.user_id,
            reply.comment_id,
            reply.parent_id.as_deref().unwrap_or_default()
        );
        if let Some(author) = parent_author {
            self.notifications.dispatch(NotificationEvent {
                recipient_id: author,
                actor_id: reply.user_id.clone(),
                kind: NotificationKind::Reply,
                post_id: Some(reply.post_id.clone()),
                comment_id: Some(reply.comment_id.clone()),
            });
        }
        Ok(reply)
    }

    /// Top-level comments oldest first, each carrying its replies oldest
    /// first. An unknown post has an empty thread.
    pub async fn get_thread(&self, post_id: &str) -> AppResult<Vec<Comment>> {
        let post_id = post_id.to_string();
        let rows: Vec<Comment> = self
            .store
            .read(move |conn| {
                query_all(
                    conn,
                    "SELECT c.id AS comment_id, o.to_id AS post_id, p.to_id AS parent_id,
                            c.content, c.image_url, c.created_at, c.updated_at,
                            u.id AS user_id, u.username, u.profile_picture
                     FROM comments c
                     JOIN relationships o ON o.from_id = c.id AND o.rel_type = 'ON'
                     JOIN relationships a ON a.to_id = c.id AND a.rel_type = 'COMMENTED'
                     JOIN users u ON u.id = a.from_id
                     LEFT JOIN relationships p ON p.from_id = c.id AND p.rel_type = 'REPLIED_TO'
                     WHERE o.to_id = ?1
                     ORDER BY c.created_at ASC, c.rowid ASC",
                    params![post_id],
                )
            })
            .await
            .map_err(AppError::from)?;
        Ok(assemble_thread(rows))
    }

    pub async fn update_comment(
        &self,
        comment_id: &str,
        actor_id: &str,
        changes: CommentChanges,
    ) -> AppResult<Comment> {
        if changes.content.is_none() && changes.image_url.is_none() {
            return Err(AppError::BadRequest("No changes supplied".into()));
        }
        let comment_id = comment_id.to_string();
        let actor_id = actor_id.to_string();
        let now = Utc::now();

        self.store
            .write(move |tx| -> AppResult<Comment> {
                let current =
                    fetch_comment(tx, &comment_id)?.ok_or(AppError::NotFound("Comment"))?;
                require_owner(tx, &actor_id, Rel::Commented, &comment_id)?;

                let has_image = changes.image_url.is_some() || current.image_url.is_some();
                let content = changes
                    .content
                    .as_deref()
                    .map(|c| validate_content(c, has_image, MAX_COMMENT_CHARS, "Comment"))
                    .transpose()?;

                tx.execute(
                    "UPDATE comments SET
                       content = COALESCE(?2, content),
                       image_url = COALESCE(?3, image_url),
                       updated_at = ?4
                     WHERE id = ?1",
                    params![comment_id, content, changes.image_url, now],
                )?;
                fetch_comment(tx, &comment_id)?.ok_or(AppError::NotFound("Comment"))
            })
            .await
    }

    /// Author-only. Replies go with their comment.
    pub async fn delete_comment(&self, comment_id: &str, actor_id: &str) -> AppResult<()> {
        let comment_id = comment_id.to_string();
        let actor_id = actor_id.to_string();

        self.store
            .write(move |tx| -> AppResult<()> {
                if !relationship::node_exists(tx, Label::Comment, &comment_id)? {
                    return Err(AppError::NotFound("Comment"));
                }
                require_owner(tx, &actor_id, Rel::Commented, &comment_id)?;
                purge_comment(tx, &comment_id)?;
                Ok(())
            })
            .await
    }
}

fn ensure_post_and_author(conn: &Connection, post_id: &str, author_id: &str) -> AppResult<()> {
    if !relationship::node_exists(conn, Label::Post, post_id)? {
        return Err(AppError::NotFound("Post"));
    }
    if !relationship::node_exists(conn, Label::User, author_id)? {
        return Err(AppError::NotFound("User"));
    }
    Ok(())
}

fn insert_comment(
    conn: &Connection,
    comment_id: &str,
    new: &NewComment,
    content: &str,
    parent_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO comments (id, content, image_url, author_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![comment_id, content, new.image_url, new.author_id, at],
    )?;
    relationship::link(conn, &new.author_id, Rel::Commented, comment_id, at)?;
    relationship::link(conn, comment_id, Rel::On, &new.post_id, at)?;
    if let Some(parent_id) = parent_id {
        relationship::link(conn, comment_id, Rel::RepliedTo, parent_id, at)?;
    }
    Ok(())
}

fn fetch_comment(conn: &Connection, comment_id: &str) -> Result<Option<Comment>, StoreError> {
    query_opt(
        conn,
        "SELECT c.id AS comment_id, o.to_id AS post_id, p.to_id AS parent_id,
                c.content, c.image_url, c.created_at, c.updated_at,
                u.id AS user_id, u.username, u.profile_picture
         FROM comments c
         JOIN relationships o ON o.from_id = c.id AND o.rel_type = 'ON'
         JOIN relationships a ON a.to_id = c.id AND a.rel_type = 'COMMENTED'
         JOIN users u ON u.id = a.from_id
         LEFT JOIN relationships p ON p.from_id = c.id AND p.rel_type = 'REPLIED_TO'
         WHERE c.id = ?1",
        params![comment_id],
    )
}

/// Nest replies under their root comment, keeping row order on both levels.
fn assemble_thread(rows: Vec<Comment>) -> Vec<Comment> {
    let mut replies: HashMap<String, Vec<Comment>> = HashMap::new();
    let mut roots = Vec::new();
    for comment in rows {
        match &comment.parent_id {
            Some(parent) => replies.entry(parent.clone()).or_default().push(comment),
            None => roots.push(comment),
        }
    }
    for root in &mut roots {
        root.replies = replies.remove(&root.comment_id).unwrap_or_default();
    }
    roots
}

/// Remove a comment, its replies and every notification pointing at them,
/// inside the caller's transaction. Returns whether the comment existed.
pub(crate) fn purge_comment(conn: &Connection, comment_id: &str) -> Result<bool, StoreError> {
    for reply_id in relationship::sources(conn, Rel::RepliedTo, comment_id)? {
        purge_comment(conn, &reply_id)?;
    }
    notifications::purge_referencing(conn, comment_id)?;
    relationship::detach_delete(conn, Label::Comment, comment_id)
}
