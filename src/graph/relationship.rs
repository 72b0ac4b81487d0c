//! Node and relationship primitives: create, match, merge and
//! detach-delete. All functions take a connection (or a transaction, which
//! derefs to one) so callers compose them inside a single unit of work.

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params, Connection, OptionalExtension};

use super::record::{query_all, Id};
use super::StoreError;

/// Relationship types of the social graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rel {
    /// User → Post
    Created,
    /// User → Comment
    Commented,
    /// Comment → Post
    On,
    /// Comment → parent Comment
    RepliedTo,
    /// User → Post, carries the reaction kind
    Reacted,
    /// User → Notification
    HasNotification,
}

impl Rel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rel::Created => "CREATED",
            Rel::Commented => "COMMENTED",
            Rel::On => "ON",
            Rel::RepliedTo => "REPLIED_TO",
            Rel::Reacted => "REACTED",
            Rel::HasNotification => "HAS_NOTIFICATION",
        }
    }
}

impl fmt::Display for Rel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Rel {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// Node labels, each backed by its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    User,
    Post,
    Comment,
    Notification,
}

impl Label {
    fn table(&self) -> &'static str {
        match self {
            Label::User => "users",
            Label::Post => "posts",
            Label::Comment => "comments",
            Label::Notification => "notifications",
        }
    }
}

pub fn node_exists(conn: &Connection, label: Label, id: &str) -> Result<bool, StoreError> {
    let sql = format!("SELECT COUNT(*) > 0 FROM {} WHERE id = ?1", label.table());
    Ok(conn.query_row(&sql, params![id], |row| row.get(0))?)
}

/// Create a relationship. Structural uniqueness (one owner, one parent) is
/// enforced by the schema and surfaces as `StoreError::Duplicate`.
pub fn link(
    conn: &Connection,
    from_id: &str,
    rel: Rel,
    to_id: &str,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO relationships (rel_type, from_id, to_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![rel, from_id, to_id, at],
    )?;
    Ok(())
}

/// Merge the single `REACTED` edge for (user, post): create it if absent,
/// otherwise overwrite its kind and timestamp. One statement, so concurrent
/// merges converge on one edge.
pub fn merge_reaction(
    conn: &Connection,
    user_id: &str,
    post_id: &str,
    kind: &str,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO relationships (rel_type, from_id, to_id, kind, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(from_id, to_id) WHERE rel_type = 'REACTED' DO UPDATE SET
           kind = excluded.kind,
           created_at = excluded.created_at",
        params![Rel::Reacted, user_id, post_id, kind, at],
    )?;
    Ok(())
}

pub fn exists(conn: &Connection, from_id: &str, rel: Rel, to_id: &str) -> Result<bool, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM relationships
         WHERE rel_type = ?1 AND from_id = ?2 AND to_id = ?3",
        params![rel, from_id, to_id],
        |row| row.get(0),
    )?)
}

/// The node at the start of the single `rel` edge pointing at `to_id`.
pub fn source_of(conn: &Connection, rel: Rel, to_id: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT from_id FROM relationships WHERE rel_type = ?1 AND to_id = ?2
             ORDER BY id LIMIT 1",
            params![rel, to_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// The node at the end of the single `rel` edge leaving `from_id`.
pub fn target_of(conn: &Connection, from_id: &str, rel: Rel) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT to_id FROM relationships WHERE rel_type = ?1 AND from_id = ?2
             ORDER BY id LIMIT 1",
            params![rel, from_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Every node with a `rel` edge into `to_id`, oldest edge first.
pub fn sources(conn: &Connection, rel: Rel, to_id: &str) -> Result<Vec<String>, StoreError> {
    let ids: Vec<Id> = query_all(
        conn,
        "SELECT from_id AS id FROM relationships WHERE rel_type = ?1 AND to_id = ?2 ORDER BY relationships.id",
        params![rel, to_id],
    )?;
    Ok(ids.into_iter().map(|id| id.0).collect())
}

/// Every node reached by a `rel` edge from `from_id`, oldest edge first.
pub fn targets(conn: &Connection, from_id: &str, rel: Rel) -> Result<Vec<String>, StoreError> {
    let ids: Vec<Id> = query_all(
        conn,
        "SELECT to_id AS id FROM relationships WHERE rel_type = ?1 AND from_id = ?2 ORDER BY relationships.id",
        params![rel, from_id],
    )?;
    Ok(ids.into_iter().map(|id| id.0).collect())
}

/// Remove the `rel` edge between two nodes. Returns whether one existed.
pub fn unlink(conn: &Connection, from_id: &str, rel: Rel, to_id: &str) -> Result<bool, StoreError> {
    let removed = conn.execute(
        "DELETE FROM relationships WHERE rel_type = ?1 AND from_id = ?2 AND to_id = ?3",
        params![rel, from_id, to_id],
    )?;
    Ok(removed > 0)
}

/// Remove a node together with every relationship touching it.
/// Returns whether the node existed.
pub fn detach_delete(conn: &Connection, label: Label, id: &str) -> Result<bool, StoreError> {
    conn.execute(
        "DELETE FROM relationships WHERE from_id = ?1 OR to_id = ?1",
        params![id],
    )?;
    let sql = format!("DELETE FROM {} WHERE id = ?1", label.table());
    let removed = conn.execute(&sql, params![id])?;
    Ok(removed > 0)
}
