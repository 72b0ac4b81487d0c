use std::sync::Arc;
use std::time::Duration;

use drawsphere::auth::SessionKeys;
use drawsphere::config::Config;
use drawsphere::error::AppError;
use drawsphere::graph::GraphStore;
use drawsphere::models::{Inbox, NotificationKind, ReactionCounts, ReactionKind};
use drawsphere::services::{NewComment, NewUser, NotificationService, Services};
use tempfile::TempDir;

struct World {
    services: Services,
    store: GraphStore,
    _tmp: TempDir,
}

fn world() -> World {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    let store = GraphStore::open(&tmp.path().join("social.db"), &config.database).unwrap();
    let sessions = Arc::new(SessionKeys::new("flow-secret", 1));
    World {
        services: Services::new(store.clone(), sessions, &config),
        store,
        _tmp: tmp,
    }
}

async fn register(services: &Services, username: &str) -> String {
    services
        .users
        .register(NewUser {
            username: username.to_string(),
            name: username.to_string(),
            email: format!("{}@example.com", username),
            password: "pw".to_string(),
        })
        .await
        .unwrap()
        .user_id
}

async fn inbox_with(notifications: &NotificationService, user_id: &str, expected: usize) -> Inbox {
    for _ in 0..100 {
        let inbox = notifications.list_for_user(user_id, None).await.unwrap();
        if inbox.notifications.len() >= expected {
            return inbox;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    notifications.list_for_user(user_id, None).await.unwrap()
}

fn comment(post_id: &str, author_id: &str, content: &str) -> NewComment {
    NewComment {
        post_id: post_id.to_string(),
        author_id: author_id.to_string(),
        content: content.to_string(),
        image_url: None,
    }
}

#[tokio::test]
async fn comment_notification_round_trip() {
    let w = world();
    let a = register(&w.services, "author").await;
    let b = register(&w.services, "commenter").await;

    let post = w.services.posts.create(&a, "my drawing", None).await.unwrap();
    w.services
        .comments
        .create_comment(comment(&post.post_id, &b, "nice"))
        .await
        .unwrap();

    let inbox = inbox_with(&w.services.notifications, &a, 1).await;
    assert_eq!(inbox.unread_count, 1);
    let n = &inbox.notifications[0];
    assert_eq!(n.kind, NotificationKind::Comment);
    assert_eq!(n.user_id, a);
    assert_eq!(n.actor_id, b);
    assert!(!n.is_read);

    w.services
        .notifications
        .mark_read(&n.notification_id, &a)
        .await
        .unwrap();
    let after = w.services.notifications.list_for_user(&a, None).await.unwrap();
    assert_eq!(after.unread_count, 0);
}

#[tokio::test]
async fn repeated_reactions_leave_one_edge_with_latest_type() {
    let w = world();
    let a = register(&w.services, "author").await;
    let b = register(&w.services, "fan").await;
    let post = w.services.posts.create(&a, "post", None).await.unwrap();

    for kind in [ReactionKind::Like, ReactionKind::Care, ReactionKind::Love] {
        w.services
            .reactions
            .upsert_reaction(&b, &post.post_id, kind)
            .await
            .unwrap();
    }

    let all = w.services.reactions.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].kind, ReactionKind::Love);
    let summary = w.services.reactions.aggregate(&post.post_id, None).await.unwrap();
    assert_eq!(
        summary.counts,
        ReactionCounts {
            like: 0,
            love: 1,
            haha: 0,
            care: 0,
            total: 1
        }
    );
}

#[tokio::test]
async fn acting_on_own_content_never_notifies() {
    let w = world();
    let a = register(&w.services, "solo").await;
    let post = w.services.posts.create(&a, "talking to myself", None).await.unwrap();

    let c = w
        .services
        .comments
        .create_comment(comment(&post.post_id, &a, "first"))
        .await
        .unwrap();
    w.services
        .comments
        .create_reply(&c.comment_id, comment(&post.post_id, &a, "second"))
        .await
        .unwrap();
    w.services
        .reactions
        .upsert_reaction(&a, &post.post_id, ReactionKind::Haha)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let inbox = w.services.notifications.list_for_user(&a, None).await.unwrap();
    assert!(inbox.notifications.is_empty());
    assert_eq!(inbox.unread_count, 0);
}

#[tokio::test]
async fn mark_all_read_is_counted_once() {
    let w = world();
    let a = register(&w.services, "popular").await;
    let post = w.services.posts.create(&a, "post", None).await.unwrap();
    for name in ["b", "c", "d"] {
        let fan = register(&w.services, name).await;
        w.services
            .reactions
            .upsert_reaction(&fan, &post.post_id, ReactionKind::Like)
            .await
            .unwrap();
    }
    inbox_with(&w.services.notifications, &a, 3).await;

    assert_eq!(w.services.notifications.mark_all_read(&a).await.unwrap(), 3);
    assert_eq!(w.services.notifications.mark_all_read(&a).await.unwrap(), 0);
}

#[tokio::test]
async fn stranger_cannot_delete_comment_but_author_can() {
    let w = world();
    let a = register(&w.services, "owner").await;
    let b = register(&w.services, "writer").await;
    let post = w.services.posts.create(&a, "post", None).await.unwrap();
    let c = w
        .services
        .comments
        .create_comment(comment(&post.post_id, &b, "keep me"))
        .await
        .unwrap();

    let denied = w.services.comments.delete_comment(&c.comment_id, &a).await;
    assert!(matches!(denied, Err(AppError::Forbidden)));

    w.services
        .comments
        .delete_comment(&c.comment_id, &b)
        .await
        .unwrap();
    assert!(w
        .services
        .comments
        .get_thread(&post.post_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn closed_store_reports_upstream_failure() {
    let w = world();
    let a = register(&w.services, "late").await;
    w.store.close();

    let result = w.services.posts.create(&a, "too late", None).await;
    assert!(matches!(result, Err(AppError::Upstream(_))));
}
