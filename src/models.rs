use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize, Serializer};

use crate::graph::FromRecord;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FromRecord for User {
    fn from_record(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            user_id: row.get("user_id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            name: row.get("name")?,
            password_hash: row.get("password_hash")?,
            profile_picture: row.get("profile_picture")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub post_id: String,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Author, resolved through the `CREATED` relationship.
    pub user_id: String,
    pub username: String,
    pub profile_picture: Option<String>,
}

impl FromRecord for Post {
    fn from_record(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Post {
            post_id: row.get("post_id")?,
            content: row.get("content")?,
            image_url: row.get("image_url")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            user_id: row.get("user_id")?,
            username: row.get("username")?,
            profile_picture: row.get("profile_picture")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub total: usize,
    pub posts: Vec<Post>,
}

/// A comment or a reply. Top-level comments carry their replies; replies
/// always carry an empty list.
#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub comment_id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub username: String,
    pub profile_picture: Option<String>,
    pub replies: Vec<Comment>,
}

impl FromRecord for Comment {
    fn from_record(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Comment {
            comment_id: row.get("comment_id")?,
            post_id: row.get("post_id")?,
            parent_id: row.get("parent_id")?,
            content: row.get("content")?,
            image_url: row.get("image_url")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            user_id: row.get("user_id")?,
            username: row.get("username")?,
            profile_picture: row.get("profile_picture")?,
            replies: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Love,
    Haha,
    Care,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 4] = [
        ReactionKind::Like,
        ReactionKind::Love,
        ReactionKind::Haha,
        ReactionKind::Care,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Love => "love",
            ReactionKind::Haha => "haha",
            ReactionKind::Care => "care",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(ReactionKind::Like),
            "love" => Ok(ReactionKind::Love),
            "haha" => Ok(ReactionKind::Haha),
            "care" => Ok(ReactionKind::Care),
            other => Err(format!("unknown reaction type '{}'", other)),
        }
    }
}

impl ToSql for ReactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reaction {
    pub post_id: String,
    pub user_id: String,
    pub username: String,
    #[serde(rename = "type")]
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

impl FromRecord for Reaction {
    fn from_record(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Reaction {
            post_id: row.get("post_id")?,
            user_id: row.get("user_id")?,
            username: row.get("username")?,
            kind: row.get("kind")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReactionCounts {
    pub like: i64,
    pub love: i64,
    pub haha: i64,
    pub care: i64,
    pub total: i64,
}

impl ReactionCounts {
    pub fn add(&mut self, kind: ReactionKind, count: i64) {
        match kind {
            ReactionKind::Like => self.like += count,
            ReactionKind::Love => self.love += count,
            ReactionKind::Haha => self.haha += count,
            ReactionKind::Care => self.care += count,
        }
        self.total += count;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionSummary {
    pub counts: ReactionCounts,
    pub viewer_reaction: Option<ReactionKind>,
}

/// What a notification is about. Unknown stored types are kept verbatim and
/// rendered with the generic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Reaction(ReactionKind),
    Comment,
    Reply,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Reaction(kind) => kind.as_str(),
            NotificationKind::Comment => "comment",
            NotificationKind::Reply => "reply",
            NotificationKind::Other(other) => other,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "comment" => NotificationKind::Comment,
            "reply" => NotificationKind::Reply,
            other => match other.parse::<ReactionKind>() {
                Ok(kind) => NotificationKind::Reaction(kind),
                Err(_) => NotificationKind::Other(other.to_string()),
            },
        }
    }
}

impl Serialize for NotificationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl ToSql for NotificationKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for NotificationKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(NotificationKind::parse(value.as_str()?))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub notification_id: String,
    /// Recipient.
    pub user_id: String,
    pub actor_id: String,
    pub actor_username: Option<String>,
    pub actor_profile_picture: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl FromRecord for Notification {
    fn from_record(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Notification {
            notification_id: row.get("notification_id")?,
            user_id: row.get("user_id")?,
            actor_id: row.get("actor_id")?,
            actor_username: row.get("actor_username")?,
            actor_profile_picture: row.get("actor_profile_picture")?,
            kind: row.get("kind")?,
            post_id: row.get("post_id")?,
            comment_id: row.get("comment_id")?,
            message: row.get("message")?,
            is_read: row.get("is_read")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Inbox {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}
