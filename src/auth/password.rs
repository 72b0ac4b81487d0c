use crate::error::{AppError, AppResult};

/// Hash a password off the async runtime.
pub async fn hash(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored hash. A corrupt hash counts as a
/// mismatch.
pub async fn verify(password: String, hash: String) -> AppResult<bool> {
    let matched = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(matched.unwrap_or_else(|e| {
        tracing::warn!("Stored password hash unreadable: {}", e);
        false
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hashed = hash("hunter2".into(), 4).await.unwrap();
        assert_ne!(hashed, "hunter2");
        assert!(verify("hunter2".into(), hashed.clone()).await.unwrap());
        assert!(!verify("wrong".into(), hashed).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_hash_is_a_mismatch() {
        assert!(!verify("pw".into(), "not-a-hash".into()).await.unwrap());
    }
}
