// src/db.rs - Database migrations and setup

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    // Create users table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE CHECK(length(username) >= 3 AND length(username) <= 50),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'labo' CHECK(
                role IN ('admin', 'labo')
            ),
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            two_factor_enabled INTEGER NOT NULL DEFAULT 0 CHECK(two_factor_enabled IN (0, 1)),
            last_login DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until DATETIME
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Prepared solutions. Decimal quantities are kept as canonical decimal
    // strings: SQLite has no exact decimal type and REAL would drift.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS solutions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            preparation_date DATETIME NOT NULL,
            internal_code TEXT NOT NULL CHECK(length(internal_code) > 0 AND length(internal_code) <= 30),
            brand TEXT NOT NULL CHECK(length(brand) > 0 AND length(brand) <= 60),
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 120),
            base_quantity TEXT,
            final_volume TEXT NOT NULL,
            lot TEXT CHECK(lot IS NULL OR length(lot) <= 30),
            concentration_obtained TEXT NOT NULL CHECK(length(concentration_obtained) > 0 AND length(concentration_obtained) <= 50),
            reagent_id TEXT NOT NULL CHECK(length(reagent_id) > 0 AND length(reagent_id) <= 60),
            expiry_date DATE,
            row_version INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The listing filters and orders on preparation_date; balance groups on
    // internal_code within a date window.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_solutions_preparation_date
         ON solutions (preparation_date DESC, id DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_solutions_internal_code
         ON solutions (internal_code, preparation_date)",
    )
    .execute(pool)
    .await?;

    // Key-value table for persisted cryptographic material (JWT signing
    // secret), owned by the auth infrastructure.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS app_keys (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    log::info!("Database migrations completed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_migrations_are_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM solutions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}
