use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::auth::SessionKeys;
use crate::error::{AppError, AppResult};
use crate::graph::relationship::{self, Label};
use crate::graph::{query_all, query_opt, FromRecord, GraphStore, Rel, StoreError};
use crate::models::{NotificationKind, Reaction, ReactionCounts, ReactionKind, ReactionSummary};
use crate::services::notifications::{NotificationEvent, NotificationService};

/// One `GROUP BY kind` bucket.
struct KindCount {
    kind: ReactionKind,
    count: i64,
}

impl FromRecord for KindCount {
    fn from_record(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(KindCount {
            kind: row.get("kind")?,
            count: row.get("count")?,
        })
    }
}

struct ViewerReaction {
    kind: ReactionKind,
}

impl FromRecord for ViewerReaction {
    fn from_record(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ViewerReaction {
            kind: row.get("kind")?,
        })
    }
}

#[derive(Clone)]
pub struct ReactionService {
    store: GraphStore,
    notifications: NotificationService,
    sessions: Arc<SessionKeys>,
}

impl ReactionService {
    pub fn new(
        store: GraphStore,
        notifications: NotificationService,
        sessions: Arc<SessionKeys>,
    ) -> Self {
        Self {
            store,
            notifications,
            sessions,
        }
    }

    /// Set `user_id`'s reaction on a post. A second call overwrites kind and
    /// timestamp on the same edge.
    pub async fn upsert_reaction(
        &self,
        user_id: &str,
        post_id: &str,
        kind: ReactionKind,
    ) -> AppResult<Reaction> {
        let user_id = user_id.to_string();
        let post_id = post_id.to_string();
        let now = Utc::now();

        let (reaction, owner) = self
            .store
            .write(move |tx| -> AppResult<(Reaction, Option<String>)> {
                if !relationship::node_exists(tx, Label::Post, &post_id)? {
                    return Err(AppError::NotFound("Post"));
                }
                if !relationship::node_exists(tx, Label::User, &user_id)? {
                    return Err(AppError::NotFound("User"));
                }
                relationship::merge_reaction(tx, &user_id, &post_id, kind.as_str(), now)?;
                let reaction =
                    fetch_reaction(tx, &user_id, &post_id)?.ok_or(AppError::NotFound("Reaction"))?;
                let owner = relationship::source_of(tx, Rel::Created, &post_id)?;
                Ok((reaction, owner))
            })
            .await?;

        tracing::debug!(
            "User {} reacted {} to post {}",
            reaction.user_id,
            reaction.kind,
            reaction.post_id
        );
        if let Some(owner) = owner {
            self.notifications.dispatch(NotificationEvent {
                recipient_id: owner,
                actor_id: reaction.user_id.clone(),
                kind: NotificationKind::Reaction(reaction.kind),
                post_id: Some(reaction.post_id.clone()),
                comment_id: None,
            });
        }
        Ok(reaction)
    }

    /// Per-kind counts for a post, plus the viewer's own reaction when a valid
    /// bearer token is supplied. A bad token only hides the viewer part.
    pub async fn aggregate(&self, post_id: &str, viewer_token: Option<&str>) -> AppResult<ReactionSummary> {
        let viewer = viewer_token.and_then(|token| match self.sessions.verify(token) {
            Ok(principal) => Some(principal.user_id),
            Err(_) => {
                tracing::debug!("Ignoring invalid viewer token on reaction aggregate");
                None
            }
        });
        let post_id = post_id.to_string();

        self.store
            .read(move |conn| -> AppResult<ReactionSummary> {
                let buckets: Vec<KindCount> = query_all(
                    conn,
                    "SELECT kind, COUNT(*) AS count FROM relationships
                     WHERE rel_type = 'REACTED' AND to_id = ?1
                     GROUP BY kind",
                    params![post_id],
                )?;
                let mut counts = ReactionCounts::default();
                for bucket in buckets {
                    counts.add(bucket.kind, bucket.count);
                }

                let viewer_reaction = match &viewer {
                    Some(user_id) => query_opt::<ViewerReaction, _>(
                        conn,
                        "SELECT kind FROM relationships
                         WHERE rel_type = 'REACTED' AND from_id = ?1 AND to_id = ?2",
                        params![user_id, post_id],
                    )?
                    .map(|v| v.kind),
                    None => None,
                };

                Ok(ReactionSummary {
                    counts,
                    viewer_reaction,
                })
            })
            .await
    }

    /// Remove the reaction if there is one. Returns whether it existed.
    pub async fn delete_reaction(&self, user_id: &str, post_id: &str) -> AppResult<bool> {
        let user_id = user_id.to_string();
        let post_id = post_id.to_string();
        self.store
            .write(move |tx| -> AppResult<bool> {
                Ok(relationship::unlink(tx, &user_id, Rel::Reacted, &post_id)?)
            })
            .await
    }

    /// Every reaction, most recent first.
    pub async fn list_all(&self) -> AppResult<Vec<Reaction>> {
        self.store
            .read(|conn| -> AppResult<Vec<Reaction>> {
                Ok(query_all(
                    conn,
                    "SELECT r.to_id AS post_id, r.from_id AS user_id, u.username,
                            r.kind, r.created_at
                     FROM relationships r
                     JOIN users u ON u.id = r.from_id
                     WHERE r.rel_type = 'REACTED'
                     ORDER BY r.created_at DESC, r.id DESC",
                    [],
                )?)
            })
            .await
    }
}

fn fetch_reaction(conn: &Connection, user_id: &str, post_id: &str) -> Result<Option<Reaction>, StoreError> {
    query_opt(
        conn,
        "SELECT r.to_id AS post_id, r.from_id AS user_id, u.username, r.kind, r.created_at
         FROM relationships r
         JOIN users u ON u.id = r.from_id
         WHERE r.rel_type = 'REACTED' AND r.from_id = ?1 AND r.to_id = ?2",
        params![user_id, post_id],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{inbox_eventually, seed_user, settle, Fixture};

    async fn reacted_edges(fx: &Fixture, user_id: &str, post_id: &str) -> i64 {
        let user_id = user_id.to_string();
        let post_id = post_id.to_string();
        fx.store
            .read(move |conn| -> AppResult<i64> {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM relationships
                     WHERE rel_type = 'REACTED' AND from_id = ?1 AND to_id = ?2",
                    params![user_id, post_id],
                    |r| r.get(0),
                )?)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn second_reaction_overwrites_the_first() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;
        let post = fx.posts.create(&alice, "post", None).await.unwrap();

        fx.reactions
            .upsert_reaction(&bob, &post.post_id, ReactionKind::Like)
            .await
            .unwrap();
        let second = fx
            .reactions
            .upsert_reaction(&bob, &post.post_id, ReactionKind::Haha)
            .await
            .unwrap();

        assert_eq!(second.kind, ReactionKind::Haha);
        assert_eq!(reacted_edges(&fx, &bob, &post.post_id).await, 1);
        let summary = fx.reactions.aggregate(&post.post_id, None).await.unwrap();
        assert_eq!(summary.counts.haha, 1);
        assert_eq!(summary.counts.like, 0);
        assert_eq!(summary.counts.total, 1);
    }

    #[tokio::test]
    async fn concurrent_upserts_converge_on_one_edge() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;
        let post = fx.posts.create(&alice, "post", None).await.unwrap();

        let mut handles = Vec::new();
        for kind in ReactionKind::ALL.iter().cycle().take(12) {
            let reactions = fx.reactions.clone();
            let (bob, post_id, kind) = (bob.clone(), post.post_id.clone(), *kind);
            handles.push(tokio::spawn(async move {
                reactions.upsert_reaction(&bob, &post_id, kind).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(reacted_edges(&fx, &bob, &post.post_id).await, 1);
        let summary = fx.reactions.aggregate(&post.post_id, None).await.unwrap();
        assert_eq!(summary.counts.total, 1);
    }

    #[tokio::test]
    async fn aggregate_counts_by_kind() {
        let fx = Fixture::new();
        let owner = seed_user(&fx.store, "owner").await;
        let post = fx.posts.create(&owner, "post", None).await.unwrap();

        for (i, kind) in [
            ReactionKind::Like,
            ReactionKind::Like,
            ReactionKind::Like,
            ReactionKind::Love,
            ReactionKind::Love,
        ]
        .into_iter()
        .enumerate()
        {
            let user = seed_user(&fx.store, &format!("fan{}", i)).await;
            fx.reactions
                .upsert_reaction(&user, &post.post_id, kind)
                .await
                .unwrap();
        }

        let summary = fx.reactions.aggregate(&post.post_id, None).await.unwrap();
        assert_eq!(
            summary.counts,
            ReactionCounts {
                like: 3,
                love: 2,
                haha: 0,
                care: 0,
                total: 5
            }
        );
        assert!(summary.viewer_reaction.is_none());
    }

    #[tokio::test]
    async fn aggregate_resolves_viewer_only_with_valid_token() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;
        let post = fx.posts.create(&alice, "post", None).await.unwrap();
        fx.reactions
            .upsert_reaction(&bob, &post.post_id, ReactionKind::Care)
            .await
            .unwrap();

        let token = fx.sessions.issue(&bob, "bob").unwrap();
        let mine = fx
            .reactions
            .aggregate(&post.post_id, Some(&token))
            .await
            .unwrap();
        assert_eq!(mine.viewer_reaction, Some(ReactionKind::Care));

        let garbled = fx
            .reactions
            .aggregate(&post.post_id, Some("garbage"))
            .await
            .unwrap();
        assert_eq!(garbled.viewer_reaction, None);
        assert_eq!(garbled.counts.care, 1);
    }

    #[tokio::test]
    async fn aggregate_on_unknown_post_is_all_zero() {
        let fx = Fixture::new();
        let summary = fx.reactions.aggregate("nope", None).await.unwrap();
        assert_eq!(summary.counts, ReactionCounts::default());
    }

    #[tokio::test]
    async fn reacting_to_missing_post_is_not_found() {
        let fx = Fixture::new();
        let bob = seed_user(&fx.store, "bob").await;
        let result = fx
            .reactions
            .upsert_reaction(&bob, "nope", ReactionKind::Like)
            .await;
        assert!(matches!(result, Err(AppError::NotFound("Post"))));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;
        let post = fx.posts.create(&alice, "post", None).await.unwrap();
        fx.reactions
            .upsert_reaction(&bob, &post.post_id, ReactionKind::Like)
            .await
            .unwrap();

        assert!(fx.reactions.delete_reaction(&bob, &post.post_id).await.unwrap());
        assert!(!fx.reactions.delete_reaction(&bob, &post.post_id).await.unwrap());
        assert!(!fx.reactions.delete_reaction(&bob, "never").await.unwrap());
        assert_eq!(reacted_edges(&fx, &bob, &post.post_id).await, 0);
    }

    #[tokio::test]
    async fn reaction_notifies_owner_but_not_self() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;
        let post = fx.posts.create(&alice, "post", None).await.unwrap();

        fx.reactions
            .upsert_reaction(&alice, &post.post_id, ReactionKind::Love)
            .await
            .unwrap();
        fx.reactions
            .upsert_reaction(&bob, &post.post_id, ReactionKind::Haha)
            .await
            .unwrap();

        let inbox = inbox_eventually(&fx.notifications, &alice, 1).await;
        settle().await;
        let inbox_after = fx.notifications.list_for_user(&alice, None).await.unwrap();
        assert_eq!(inbox.notifications.len(), 1);
        assert_eq!(inbox_after.notifications.len(), 1);
        let n = &inbox_after.notifications[0];
        assert_eq!(n.actor_id, bob);
        assert_eq!(n.kind, NotificationKind::Reaction(ReactionKind::Haha));
        assert_eq!(n.message, "bob reacted 😆 to your post");
    }

    #[tokio::test]
    async fn list_all_is_most_recent_first() {
        let fx = Fixture::new();
        let alice = seed_user(&fx.store, "alice").await;
        let bob = seed_user(&fx.store, "bob").await;
        let p1 = fx.posts.create(&alice, "one", None).await.unwrap();
        let p2 = fx.posts.create(&alice, "two", None).await.unwrap();

        fx.reactions
            .upsert_reaction(&bob, &p1.post_id, ReactionKind::Like)
            .await
            .unwrap();
        fx.reactions
            .upsert_reaction(&alice, &p2.post_id, ReactionKind::Love)
            .await
            .unwrap();

        let all = fx.reactions.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].post_id, p2.post_id);
        assert_eq!(all[0].username, "alice");
        assert_eq!(all[1].post_id, p1.post_id);
        assert_eq!(all[1].kind, ReactionKind::Like);
    }
}
