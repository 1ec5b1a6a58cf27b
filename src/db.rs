use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::auth::{hash_password, new_id};
use crate::models::ROLE_ADMIN;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_admin(pool).await?;
    seed_branch(pool).await?;
    Ok(())
}

/// Fire-and-forget activity log. Failures must never roll back or fail the
/// primary operation, so the result is dropped.
pub async fn log_activity(
    pool: &SqlitePool,
    action: &str,
    message: &str,
    branch_id: Option<&str>,
    user_id: Option<&str>,
    appointment_id: Option<&str>,
) {
    let _ = sqlx::query(
        r#"INSERT INTO activities (id, action, message, branch_id, user_id, appointment_id, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(action)
    .bind(message)
    .bind(branch_id)
    .bind(user_id)
    .bind(appointment_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await;
}

async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(ROLE_ADMIN)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let username = env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let display_name =
        env::var("ADMIN_DISPLAY_NAME").unwrap_or_else(|_| "Head Office".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;

    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(username)
    .bind(display_name)
    .bind(ROLE_ADMIN)
    .bind(password_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_branch(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    if env::var("SEED_BRANCH").unwrap_or_else(|_| "false".to_string()) != "true" {
        return Ok(());
    }

    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM branches LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let name = env::var("BRANCH_NAME").unwrap_or_else(|_| "Main Branch".to_string());
    let country = env::var("BRANCH_COUNTRY").unwrap_or_else(|_| "US".to_string());

    sqlx::query(
        r#"INSERT INTO branches (id, name, country_code, created_at)
           VALUES (?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(name)
    .bind(country)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}
