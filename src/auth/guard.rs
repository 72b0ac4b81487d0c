//! Ownership checks. The `CREATED` and `COMMENTED` relationships are the only
//! source of truth for who may mutate what.

use rusqlite::Connection;

use crate::error::{AppError, AppResult};
use crate::graph::relationship;
use crate::graph::{Rel, StoreError};

/// Whether `actor_id` is connected to `resource_id` through `rel`.
pub fn owns_resource(
    conn: &Connection,
    actor_id: &str,
    rel: Rel,
    resource_id: &str,
) -> Result<bool, StoreError> {
    relationship::exists(conn, actor_id, rel, resource_id)
}

/// Fail `Forbidden` unless `actor_id` owns `resource_id` through `rel`.
pub fn require_owner(
    conn: &Connection,
    actor_id: &str,
    rel: Rel,
    resource_id: &str,
) -> AppResult<()> {
    if owns_resource(conn, actor_id, rel, resource_id)? {
        Ok(())
    } else {
        tracing::warn!(
            "User {} denied mutation of {} (missing {})",
            actor_id,
            resource_id,
            rel
        );
        Err(AppError::Forbidden)
    }
}

/// Profile mutations are only allowed on one's own account. A User node has
/// no owning edge; its own identity is the ownership relation, so this is the
/// User counterpart of [`require_owner`].
pub fn require_self(actor_id: &str, user_id: &str) -> AppResult<()> {
    if actor_id == user_id {
        Ok(())
    } else {
        tracing::warn!("User {} denied mutation of account {}", actor_id, user_id);
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::migrations;
    use chrono::Utc;

    #[test]
    fn owner_passes_and_stranger_is_forbidden() {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run(&conn).unwrap();
        relationship::link(&conn, "alice", Rel::Created, "p1", Utc::now()).unwrap();

        assert!(owns_resource(&conn, "alice", Rel::Created, "p1").unwrap());
        assert!(require_owner(&conn, "alice", Rel::Created, "p1").is_ok());
        assert!(matches!(
            require_owner(&conn, "bob", Rel::Created, "p1"),
            Err(AppError::Forbidden)
        ));
        // the relationship type matters, not just adjacency
        assert!(!owns_resource(&conn, "alice", Rel::Commented, "p1").unwrap());
    }

    #[test]
    fn require_self_compares_ids() {
        assert!(require_self("u1", "u1").is_ok());
        assert!(matches!(require_self("u1", "u2"), Err(AppError::Forbidden)));
    }
}
