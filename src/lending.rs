use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::auth::new_id;
use crate::db::log_activity;
use crate::error::{AppError, AppResult};
use crate::models::{LendingRequestRow, LendingStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct LendingInput {
    /// None means "any stylist, provider's choice"; the approver names one.
    pub stylist_id: Option<String>,
    pub from_branch_id: String,
    pub to_branch_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

pub async fn fetch_request(pool: &SqlitePool, request_id: &str) -> AppResult<LendingRequestRow> {
    sqlx::query_as::<_, LendingRequestRow>(
        r#"SELECT id, stylist_id, from_branch_id, to_branch_id, start_date, end_date,
                  reason, status, requested_by, requested_at, approved_by, approved_at,
                  rejection_reason, cancelled_by, cancelled_at
           FROM lending_requests WHERE id = ?"#,
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Lending request"))
}

/// Creates a pending request. No availability cross-check happens here;
/// the stylist's own schedule and any concurrent requests are only examined
/// at approval time.
pub async fn request_lending(
    pool: &SqlitePool,
    input: &LendingInput,
    requester: &str,
) -> AppResult<String> {
    if input.from_branch_id.trim().is_empty() || input.to_branch_id.trim().is_empty() {
        return Err(AppError::validation("Both branches are required."));
    }
    if input.end_date < input.start_date {
        return Err(AppError::validation("End date must not precede start date."));
    }

    let id = new_id();
    sqlx::query(
        r#"INSERT INTO lending_requests
           (id, stylist_id, from_branch_id, to_branch_id, start_date, end_date,
            reason, status, requested_by, requested_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&input.stylist_id)
    .bind(&input.from_branch_id)
    .bind(&input.to_branch_id)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(&input.reason)
    .bind(LendingStatus::Pending.as_str())
    .bind(requester)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    log_activity(
        pool,
        "lending_requested",
        &format!(
            "Lending requested from branch {} for {} to {}.",
            input.from_branch_id, input.start_date, input.end_date
        ),
        Some(&input.to_branch_id),
        Some(requester),
        None,
    )
    .await;

    Ok(id)
}

/// Approves a pending request. A provider's-choice request gets its stylist
/// backfilled from `stylist_override`; "who is being lent" is only fixed
/// from this point on. The stylist must not already be lent out over an
/// overlapping approved range.
pub async fn approve_lending(
    pool: &SqlitePool,
    request_id: &str,
    approver: &str,
    stylist_override: Option<&str>,
) -> AppResult<LendingRequestRow> {
    let request = fetch_request(pool, request_id).await?;
    if request.status() != Some(LendingStatus::Pending) {
        return Err(AppError::state(format!(
            "Only pending requests can be approved; this one is {}.",
            request.status
        )));
    }

    let stylist = stylist_override
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .or_else(|| request.stylist_id.clone())
        .ok_or_else(|| {
            AppError::validation("A stylist must be named before the request can be approved.")
        })?;

    let mut tx = pool.begin().await?;
    let overlapping: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM lending_requests
           WHERE stylist_id = ? AND id != ?
             AND status IN ('approved', 'active')
             AND start_date <= ? AND end_date >= ?"#,
    )
    .bind(&stylist)
    .bind(request_id)
    .bind(request.end_date)
    .bind(request.start_date)
    .fetch_one(&mut *tx)
    .await?;
    if overlapping > 0 {
        return Err(AppError::conflict(
            "Stylist is already lent out over an overlapping date range.",
        ));
    }

    sqlx::query(
        r#"UPDATE lending_requests
           SET status = ?, stylist_id = ?, approved_by = ?, approved_at = ?
           WHERE id = ?"#,
    )
    .bind(LendingStatus::Approved.as_str())
    .bind(&stylist)
    .bind(approver)
    .bind(Utc::now().to_rfc3339())
    .bind(request_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    log_activity(
        pool,
        "lending_approved",
        &format!("Lending request {request_id} approved."),
        Some(&request.from_branch_id),
        Some(approver),
        None,
    )
    .await;

    fetch_request(pool, request_id).await
}

pub async fn reject_lending(
    pool: &SqlitePool,
    request_id: &str,
    reason: &str,
    approver: &str,
) -> AppResult<LendingRequestRow> {
    let request = fetch_request(pool, request_id).await?;
    if request.status() != Some(LendingStatus::Pending) {
        return Err(AppError::state(format!(
            "Only pending requests can be rejected; this one is {}.",
            request.status
        )));
    }

    sqlx::query(
        r#"UPDATE lending_requests
           SET status = ?, rejection_reason = ?, approved_by = ?, approved_at = ?
           WHERE id = ?"#,
    )
    .bind(LendingStatus::Rejected.as_str())
    .bind(reason)
    .bind(approver)
    .bind(Utc::now().to_rfc3339())
    .bind(request_id)
    .execute(pool)
    .await?;

    log_activity(
        pool,
        "lending_rejected",
        &format!("Lending request {request_id} rejected."),
        Some(&request.from_branch_id),
        Some(approver),
        None,
    )
    .await;

    fetch_request(pool, request_id).await
}

/// Cancellable from pending or approved; terminal afterwards.
pub async fn cancel_lending(
    pool: &SqlitePool,
    request_id: &str,
    actor: &str,
) -> AppResult<LendingRequestRow> {
    let request = fetch_request(pool, request_id).await?;
    if !matches!(
        request.status(),
        Some(LendingStatus::Pending) | Some(LendingStatus::Approved)
    ) {
        return Err(AppError::state(format!(
            "Only pending or approved requests can be cancelled; this one is {}.",
            request.status
        )));
    }

    sqlx::query(
        r#"UPDATE lending_requests
           SET status = ?, cancelled_by = ?, cancelled_at = ?
           WHERE id = ?"#,
    )
    .bind(LendingStatus::Cancelled.as_str())
    .bind(actor)
    .bind(Utc::now().to_rfc3339())
    .bind(request_id)
    .execute(pool)
    .await?;

    log_activity(
        pool,
        "lending_cancelled",
        &format!("Lending request {request_id} cancelled."),
        Some(&request.to_branch_id),
        Some(actor),
        None,
    )
    .await;

    fetch_request(pool, request_id).await
}

/// Approved (or legacy "active") lendings into a branch. With a date, only
/// requests whose inclusive range contains it; without one, every approved
/// request regardless of range, since staff-listing views want lent-in staff
/// whether or not the loan covers today.
pub async fn lendings_into(
    pool: &SqlitePool,
    branch_id: &str,
    on_date: Option<NaiveDate>,
) -> AppResult<Vec<LendingRequestRow>> {
    derived_lendings(pool, "to_branch_id", branch_id, on_date).await
}

/// Symmetric query keyed on the provider branch.
pub async fn lendings_out_of(
    pool: &SqlitePool,
    branch_id: &str,
    on_date: Option<NaiveDate>,
) -> AppResult<Vec<LendingRequestRow>> {
    derived_lendings(pool, "from_branch_id", branch_id, on_date).await
}

async fn derived_lendings(
    pool: &SqlitePool,
    key_column: &str,
    branch_id: &str,
    on_date: Option<NaiveDate>,
) -> AppResult<Vec<LendingRequestRow>> {
    // key_column is one of two fixed identifiers, never caller input.
    let base = format!(
        r#"SELECT id, stylist_id, from_branch_id, to_branch_id, start_date, end_date,
                  reason, status, requested_by, requested_at, approved_by, approved_at,
                  rejection_reason, cancelled_by, cancelled_at
           FROM lending_requests
           WHERE {key_column} = ? AND status IN ('approved', 'active')"#
    );

    let rows = if let Some(date) = on_date {
        sqlx::query_as::<_, LendingRequestRow>(&format!(
            "{base} AND start_date <= ? AND end_date >= ? ORDER BY start_date"
        ))
        .bind(branch_id)
        .bind(date)
        .bind(date)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, LendingRequestRow>(&format!("{base} ORDER BY start_date"))
            .bind(branch_id)
            .fetch_all(pool)
            .await?
    };
    Ok(rows)
}

pub async fn requests_for_branch(
    pool: &SqlitePool,
    branch_id: &str,
) -> AppResult<Vec<LendingRequestRow>> {
    let rows = sqlx::query_as::<_, LendingRequestRow>(
        r#"SELECT id, stylist_id, from_branch_id, to_branch_id, start_date, end_date,
                  reason, status, requested_by, requested_at, approved_by, approved_at,
                  rejection_reason, cancelled_by, cancelled_at
           FROM lending_requests
           WHERE from_branch_id = ? OR to_branch_id = ?
           ORDER BY requested_at DESC"#,
    )
    .bind(branch_id)
    .bind(branch_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
