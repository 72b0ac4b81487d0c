use chrono::Utc;
use rusqlite::{params, Connection};

use crate::config::NotificationConfig;
use crate::error::{AppError, AppResult};
use crate::graph::relationship::{self, Label};
use crate::graph::{query_all, GraphStore, Rel, StoreError};
use crate::models::{Inbox, Notification, NotificationKind, ReactionKind};

/// A secondary event worth telling `recipient_id` about.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub recipient_id: String,
    pub actor_id: String,
    pub kind: NotificationKind,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
}

impl NotificationEvent {
    fn is_self_action(&self) -> bool {
        self.recipient_id == self.actor_id
    }
}

#[derive(Clone)]
pub struct NotificationService {
    store: GraphStore,
    config: NotificationConfig,
}

impl NotificationService {
    pub fn new(store: GraphStore, config: NotificationConfig) -> Self {
        Self { store, config }
    }

    /// Fire-and-forget delivery after the triggering write has committed.
    /// Failures are logged and dropped; nothing is retried.
    pub fn dispatch(&self, event: NotificationEvent) {
        if event.is_self_action() {
            return;
        }
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.notify(event.clone()).await {
                tracing::warn!(
                    "Dropped {} notification from {} to {}: {}",
                    event.kind.as_str(),
                    event.actor_id,
                    event.recipient_id,
                    e
                );
            }
        });
    }

    /// Create one notification. Returns `None` when the actor is the
    /// recipient.
    pub async fn notify(&self, event: NotificationEvent) -> AppResult<Option<String>> {
        if event.is_self_action() {
            return Ok(None);
        }

        let id = uuid::Uuid::now_v7().to_string();
        let created = id.clone();
        let now = Utc::now();
        self.store
            .write(move |tx| -> AppResult<()> {
                if !relationship::node_exists(tx, Label::User, &event.recipient_id)? {
                    return Err(AppError::NotFound("User"));
                }
                // the subject may have been deleted since the event fired
                if let Some(post_id) = &event.post_id {
                    if !relationship::node_exists(tx, Label::Post, post_id)? {
                        return Err(AppError::NotFound("Post"));
                    }
                }
                if let Some(comment_id) = &event.comment_id {
                    if !relationship::node_exists(tx, Label::Comment, comment_id)? {
                        return Err(AppError::NotFound("Comment"));
                    }
                }
                let actor_username: String = tx
                    .query_row(
                        "SELECT username FROM users WHERE id = ?1",
                        params![event.actor_id],
                        |row| row.get(0),
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound("User"),
                        other => other.into(),
                    })?;

                tx.execute(
                    "INSERT INTO notifications
                       (id, actor_id, type, post_id, comment_id, message, is_read, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                    params![
                        id,
                        event.actor_id,
                        event.kind,
                        event.post_id,
                        event.comment_id,
                        render_message(&event.kind, &actor_username),
                        now
                    ],
                )?;
                relationship::link(tx, &event.recipient_id, Rel::HasNotification, &id, now)?;
                Ok(())
            })
            .await
            .map(|_| Some(created))
    }

    /// Newest first, capped at `limit` (clamped to the configured range).
    pub async fn list_for_user(&self, user_id: &str, limit: Option<u32>) -> AppResult<Inbox> {
        let limit = self.clamp_limit(limit);
        let user_id = user_id.to_string();
        self.store
            .read(move |conn| -> AppResult<Inbox> {
                let notifications: Vec<Notification> = query_all(
                    conn,
                    "SELECT n.id AS notification_id, r.from_id AS user_id, n.actor_id,
                            a.username AS actor_username,
                            a.profile_picture AS actor_profile_picture,
                            n.type AS kind, n.post_id, n.comment_id, n.message,
                            n.is_read, n.created_at
                     FROM notifications n
                     JOIN relationships r ON r.to_id = n.id AND r.rel_type = 'HAS_NOTIFICATION'
                     LEFT JOIN users a ON a.id = n.actor_id
                     WHERE r.from_id = ?1
                     ORDER BY n.created_at DESC, n.rowid DESC
                     LIMIT ?2",
                    params![user_id, limit],
                )?;
                let unread_count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM notifications n
                     JOIN relationships r ON r.to_id = n.id AND r.rel_type = 'HAS_NOTIFICATION'
                     WHERE r.from_id = ?1 AND n.is_read = 0",
                    params![user_id],
                    |row| row.get(0),
                )?;
                Ok(Inbox {
                    notifications,
                    unread_count,
                })
            })
            .await
    }

    pub async fn mark_read(&self, notification_id: &str, user_id: &str) -> AppResult<()> {
        let notification_id = notification_id.to_string();
        let user_id = user_id.to_string();
        self.store
            .write(move |tx| -> AppResult<()> {
                if !relationship::exists(tx, &user_id, Rel::HasNotification, &notification_id)? {
                    return Err(AppError::NotFound("Notification"));
                }
                tx.execute(
                    "UPDATE notifications SET is_read = 1 WHERE id = ?1",
                    params![notification_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Returns how many notifications went from unread to read.
    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<usize> {
        let user_id = user_id.to_string();
        self.store
            .write(move |tx| -> AppResult<usize> {
                let changed = tx.execute(
                    "UPDATE notifications SET is_read = 1
                     WHERE is_read = 0 AND id IN (
                       SELECT to_id FROM relationships
                       WHERE rel_type = 'HAS_NOTIFICATION' AND from_id = ?1
                     )",
                    params![user_id],
                )?;
                Ok(changed)
            })
            .await
    }

    fn clamp_limit(&self, limit: Option<u32>) -> u32 {
        let max = self.config.max_limit.max(1);
        limit.unwrap_or(self.config.default_limit).clamp(1, max)
    }
}

pub fn render_message(kind: &NotificationKind, actor: &str) -> String {
    match kind {
        NotificationKind::Reaction(ReactionKind::Like) => format!("{} liked your post", actor),
        NotificationKind::Reaction(ReactionKind::Love) => format!("{} loved your post", actor),
        NotificationKind::Reaction(ReactionKind::Haha) => {
            format!("{} reacted 😆 to your post", actor)
        }
        NotificationKind::Reaction(ReactionKind::Care) => {
            format!("{} reacted ❤️ to your post", actor)
        }
        NotificationKind::Comment => format!("{} commented on your post", actor),
        NotificationKind::Reply => format!("{} replied to your comment", actor),
        NotificationKind::Other(_) => format!("{} interacted with your content", actor),
    }
}

/// Remove notifications pointing at a post or comment that is going away.
pub(crate) fn purge_referencing(conn: &Connection, node_id: &str) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM notifications WHERE post_id = ?1 OR comment_id = ?1",
        params![node_id],
    )?;
    drop_orphaned_edges(conn)
}

/// Remove a user's inbox and every notification they caused.
pub(crate) fn purge_for_user(conn: &Connection, user_id: &str) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM notifications WHERE actor_id = ?1 OR id IN (
           SELECT to_id FROM relationships
           WHERE rel_type = 'HAS_NOTIFICATION' AND from_id = ?1
         )",
        params![user_id],
    )?;
    drop_orphaned_edges(conn)
}

fn drop_orphaned_edges(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM relationships
         WHERE rel_type = 'HAS_NOTIFICATION'
           AND to_id NOT IN (SELECT id FROM notifications)",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{seed_user, Fixture};

    fn comment_event(recipient: &str, actor: &str) -> NotificationEvent {
        NotificationEvent {
            recipient_id: recipient.to_string(),
            actor_id: actor.to_string(),
            kind: NotificationKind::Comment,
            post_id: None,
            comment_id: None,
        }
    }

    #[test]
    fn messages_follow_type_templates() {
        let like = NotificationKind::Reaction(ReactionKind::Like);
        assert_eq!(render_message(&like, "bob"), "bob liked your post");
        assert_eq!(
            render_message(&NotificationKind::Reply, "bob"),
            "bob replied to your comment"
        );
        assert_eq!(
            render_message(&NotificationKind::Other("poke".into()), "bob"),
            "bob interacted with your content"
        );
    }

    #[tokio::test]
    async fn notify_creates_unread_entry_with_actor_fields() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;

        let id = fx
            .notifications
            .notify(comment_event(&alice, &bob))
            .await
            .unwrap()
            .unwrap();

        let inbox = fx.notifications.list_for_user(&alice, None).await.unwrap();
        assert_eq!(inbox.unread_count, 1);
        let n = &inbox.notifications[0];
        assert_eq!(n.notification_id, id);
        assert_eq!(n.user_id, alice);
        assert_eq!(n.actor_id, bob);
        assert_eq!(n.actor_username.as_deref(), Some("bob"));
        assert_eq!(n.kind, NotificationKind::Comment);
        assert_eq!(n.message, "bob commented on your post");
        assert!(!n.is_read);
    }

    #[tokio::test]
    async fn self_action_is_a_no_op() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;

        let created = fx
            .notifications
            .notify(comment_event(&alice, &alice))
            .await
            .unwrap();
        assert!(created.is_none());

        let inbox = fx.notifications.list_for_user(&alice, None).await.unwrap();
        assert!(inbox.notifications.is_empty());
    }

    #[tokio::test]
    async fn inbox_is_newest_first_and_limited() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                fx.notifications
                    .notify(comment_event(&alice, &bob))
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }

        let inbox = fx.notifications.list_for_user(&alice, Some(2)).await.unwrap();
        let listed: Vec<_> = inbox
            .notifications
            .iter()
            .map(|n| n.notification_id.clone())
            .collect();
        assert_eq!(listed, vec![ids[2].clone(), ids[1].clone()]);
        // unread count covers the whole inbox, not just the page
        assert_eq!(inbox.unread_count, 3);
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let fx = Fixture::new();
        assert_eq!(fx.notifications.clamp_limit(Some(0)), 1);
        assert_eq!(fx.notifications.clamp_limit(Some(10_000)), 100);
        assert_eq!(fx.notifications.clamp_limit(None), 20);
    }

    #[tokio::test]
    async fn mark_read_requires_ownership() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;
        let id = fx
            .notifications
            .notify(comment_event(&alice, &bob))
            .await
            .unwrap()
            .unwrap();

        let result = fx.notifications.mark_read(&id, &bob).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        fx.notifications.mark_read(&id, &alice).await.unwrap();
        let inbox = fx.notifications.list_for_user(&alice, None).await.unwrap();
        assert_eq!(inbox.unread_count, 0);
        assert!(inbox.notifications[0].is_read);
    }

    #[tokio::test]
    async fn mark_all_read_counts_transitions() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;
        for _ in 0..2 {
            fx.notifications
                .notify(comment_event(&alice, &bob))
                .await
                .unwrap();
        }
        // bob's inbox is untouched
        fx.notifications
            .notify(comment_event(&bob, &alice))
            .await
            .unwrap();

        assert_eq!(fx.notifications.mark_all_read(&alice).await.unwrap(), 2);
        assert_eq!(fx.notifications.mark_all_read(&alice).await.unwrap(), 0);
        let bobs = fx.notifications.list_for_user(&bob, None).await.unwrap();
        assert_eq!(bobs.unread_count, 1);
    }

    #[tokio::test]
    async fn unknown_recipient_fails() {
        let fx = Fixture::new();
        let bob = seed_user(&fx.store, "bob").await;
        let result = fx.notifications.notify(comment_event("ghost", &bob)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn subject_deleted_before_delivery_is_dropped() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;
        let event = NotificationEvent {
            post_id: Some("gone".into()),
            ..comment_event(&alice, &bob)
        };
        assert!(matches!(
            fx.notifications.notify(event).await,
            Err(AppError::NotFound("Post"))
        ));
    }

    #[tokio::test]
    async fn purge_referencing_removes_notifications_and_edges() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;
        let post = fx.posts.create(&alice, "hello", None).await.unwrap();
        let event = NotificationEvent {
            post_id: Some(post.post_id.clone()),
            ..comment_event(&alice, &bob)
        };
        fx.notifications.notify(event).await.unwrap();

        let post_id = post.post_id.clone();
        fx.store
            .write(move |tx| -> AppResult<()> { Ok(purge_referencing(tx, &post_id)?) })
            .await
            .unwrap();

        let inbox = fx.notifications.list_for_user(&alice, None).await.unwrap();
        assert!(inbox.notifications.is_empty());
        let edges: i64 = fx
            .store
            .read(|conn| -> AppResult<i64> {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM relationships WHERE rel_type = 'HAS_NOTIFICATION'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(edges, 0);
    }
}
