// src/keys.rs - Persisted signing-key material.
//
// The JWT secret can be supplied via configuration; when it is not, one is
// generated on first boot and stored in the app_keys table so restarts keep
// issued tokens valid.

use anyhow::Result;
use chrono::Utc;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use sqlx::SqlitePool;

const JWT_SECRET_KEY: &str = "jwt_secret";
const SECRET_LENGTH: usize = 64;

pub fn generate_jwt_secret() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

/// Resolves the signing secret: configured value wins, otherwise the
/// persisted one, otherwise generate-and-persist.
pub async fn ensure_jwt_secret(pool: &SqlitePool, configured: &str) -> Result<String> {
    if !configured.is_empty() {
        return Ok(configured.to_string());
    }

    let stored: Option<(String,)> = sqlx::query_as("SELECT value FROM app_keys WHERE key = ?")
        .bind(JWT_SECRET_KEY)
        .fetch_optional(pool)
        .await?;

    if let Some((secret,)) = stored {
        return Ok(secret);
    }

    let secret = generate_jwt_secret();
    sqlx::query("INSERT INTO app_keys (key, value, created_at) VALUES (?, ?, ?)")
        .bind(JWT_SECRET_KEY)
        .bind(&secret)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    log::info!("Generated and persisted a new JWT signing secret");

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn test_generated_secret_shape() {
        let secret = generate_jwt_secret();
        assert_eq!(secret.len(), SECRET_LENGTH);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[actix_rt::test]
    async fn test_configured_secret_wins() {
        let pool = test_pool().await;
        let secret = ensure_jwt_secret(&pool, "configured_secret_1234567890123456")
            .await
            .unwrap();
        assert_eq!(secret, "configured_secret_1234567890123456");
    }

    #[actix_rt::test]
    async fn test_generated_secret_is_stable_across_calls() {
        let pool = test_pool().await;
        let first = ensure_jwt_secret(&pool, "").await.unwrap();
        let second = ensure_jwt_secret(&pool, "").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), SECRET_LENGTH);
    }
}
