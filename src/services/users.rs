use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::auth::{password, require_self, Principal, SessionKeys};
use crate::error::{AppError, AppResult};
use crate::graph::relationship::{self, Label};
use crate::graph::{query_all, query_opt, GraphStore, Rel, StoreError};
use crate::models::User;
use crate::services::{comments, notifications, posts};

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    store: GraphStore,
    sessions: Arc<SessionKeys>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(store: GraphStore, sessions: Arc<SessionKeys>, bcrypt_cost: u32) -> Self {
        Self {
            store,
            sessions,
            bcrypt_cost,
        }
    }

    pub async fn register(&self, new: NewUser) -> AppResult<User> {
        let username = required(&new.username, "Username")?;
        let name = required(&new.name, "Name")?;
        let email = valid_email(&new.email)?;
        if new.password.is_empty() {
            return Err(AppError::BadRequest("Password is required".into()));
        }

        let password_hash = password::hash(new.password, self.bcrypt_cost).await?;
        let user_id = uuid::Uuid::now_v7().to_string();
        let now = Utc::now();

        let user = self
            .store
            .write(move |tx| -> AppResult<User> {
                ensure_unique(tx, Some(&username), Some(&email), None)?;
                tx.execute(
                    "INSERT INTO users (id, username, email, name, password_hash, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![user_id, username, email, name, password_hash, now],
                )?;
                fetch_user(tx, &user_id)?.ok_or(AppError::NotFound("User"))
            })
            .await?;

        tracing::info!("Registered user {} ({})", user.username, user.user_id);
        Ok(user)
    }

    /// Exchange credentials for a bearer token. An unknown email and a wrong
    /// password fail the same way.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginResponse> {
        let email = email.trim().to_string();
        let user = self
            .store
            .read(move |conn| -> AppResult<Option<User>> {
                Ok(query_opt(
                    conn,
                    "SELECT id AS user_id, username, email, name, password_hash,
                            profile_picture, created_at
                     FROM users WHERE email = ?1",
                    params![email],
                )?)
            })
            .await?
            .ok_or(AppError::Unauthenticated)?;

        if !password::verify(password.to_string(), user.password_hash.clone()).await? {
            tracing::debug!("Failed login for user {}", user.user_id);
            return Err(AppError::Unauthenticated);
        }

        Ok(LoginResponse {
            access_token: self.sessions.issue(&user.user_id, &user.username)?,
            token_type: "bearer",
        })
    }

    /// The account behind a session. A token for a deleted account no longer
    /// authenticates anyone.
    pub async fn me(&self, principal: &Principal) -> AppResult<User> {
        match self.get(&principal.user_id).await {
            Err(AppError::NotFound(_)) => Err(AppError::Unauthenticated),
            other => other,
        }
    }

    pub async fn get(&self, user_id: &str) -> AppResult<User> {
        let user_id = user_id.to_string();
        self.store
            .read(move |conn| -> AppResult<User> {
                fetch_user(conn, &user_id)?.ok_or(AppError::NotFound("User"))
            })
            .await
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        self.store
            .read(|conn| -> AppResult<Vec<User>> {
                Ok(query_all(
                    conn,
                    "SELECT id AS user_id, username, email, name, password_hash,
                            profile_picture, created_at
                     FROM users ORDER BY created_at ASC, rowid ASC",
                    [],
                )?)
            })
            .await
    }

    pub async fn update_profile(
        &self,
        actor_id: &str,
        user_id: &str,
        changes: ProfileChanges,
    ) -> AppResult<User> {
        require_self(actor_id, user_id)?;
        let username = changes.username.as_deref().map(|u| required(u, "Username")).transpose()?;
        let name = changes.name.as_deref().map(|n| required(n, "Name")).transpose()?;
        let email = changes.email.as_deref().map(valid_email).transpose()?;
        if username.is_none() && name.is_none() && email.is_none() {
            return Err(AppError::BadRequest("No changes supplied".into()));
        }
        let user_id = user_id.to_string();

        self.store
            .write(move |tx| -> AppResult<User> {
                if !relationship::node_exists(tx, Label::User, &user_id)? {
                    return Err(AppError::NotFound("User"));
                }
                ensure_unique(tx, username.as_deref(), email.as_deref(), Some(&user_id))?;
                tx.execute(
                    "UPDATE users SET
                       username = COALESCE(?2, username),
                       name = COALESCE(?3, name),
                       email = COALESCE(?4, email)
                     WHERE id = ?1",
                    params![user_id, username, name, email],
                )?;
                fetch_user(tx, &user_id)?.ok_or(AppError::NotFound("User"))
            })
            .await
    }

    pub async fn set_profile_picture(
        &self,
        actor_id: &str,
        user_id: &str,
        url: &str,
    ) -> AppResult<User> {
        require_self(actor_id, user_id)?;
        let user_id = user_id.to_string();
        let url = url.to_string();

        self.store
            .write(move |tx| -> AppResult<User> {
                let changed = tx.execute(
                    "UPDATE users SET profile_picture = ?2 WHERE id = ?1",
                    params![user_id, url],
                )?;
                if changed == 0 {
                    return Err(AppError::NotFound("User"));
                }
                fetch_user(tx, &user_id)?.ok_or(AppError::NotFound("User"))
            })
            .await
    }

    /// Remove an account with its posts, comments, reactions and inbox.
    pub async fn delete(&self, actor_id: &str, user_id: &str) -> AppResult<()> {
        require_self(actor_id, user_id)?;
        let user_id = user_id.to_string();
        let deleted = user_id.clone();

        self.store
            .write(move |tx| -> AppResult<()> {
                if !relationship::node_exists(tx, Label::User, &user_id)? {
                    return Err(AppError::NotFound("User"));
                }
                for post_id in relationship::targets(tx, &user_id, Rel::Created)? {
                    posts::purge_post(tx, &post_id)?;
                }
                for comment_id in relationship::targets(tx, &user_id, Rel::Commented)? {
                    comments::purge_comment(tx, &comment_id)?;
                }
                notifications::purge_for_user(tx, &user_id)?;
                relationship::detach_delete(tx, Label::User, &user_id)?;
                Ok(())
            })
            .await?;

        tracing::info!("Deleted user {}", deleted);
        Ok(())
    }
}

fn fetch_user(conn: &Connection, user_id: &str) -> Result<Option<User>, StoreError> {
    query_opt(
        conn,
        "SELECT id AS user_id, username, email, name, password_hash, profile_picture, created_at
         FROM users WHERE id = ?1",
        params![user_id],
    )
}

/// Fail `Conflict` if another account already holds `username` or `email`.
fn ensure_unique(
    conn: &Connection,
    username: Option<&str>,
    email: Option<&str>,
    except_id: Option<&str>,
) -> AppResult<()> {
    let taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users
         WHERE (username = ?1 OR email = ?2) AND id IS NOT ?3",
        params![username, email, except_id],
        |row| row.get(0),
    )?;
    if taken {
        return Err(AppError::Conflict("Username or email already exists".into()));
    }
    Ok(())
}

fn required(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn valid_email(value: &str) -> AppResult<String> {
    let email = required(value, "Email")?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::BadRequest("Email address is invalid".into())),
    }
}
