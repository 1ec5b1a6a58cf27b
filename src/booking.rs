use chrono::{Duration, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::auth::new_id;
use crate::availability::{
    is_stylist_free, intervals_overlap, DEFAULT_DURATION_MINUTES, MAX_DURATION_MINUTES,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    assigned_stylists, AppointmentRow, AppointmentStatus, ServiceAssignmentRow,
};

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub service_id: String,
    pub stylist_id: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub adjustment: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    pub branch_id: String,
    pub client_id: Option<String>,
    pub guest_name: Option<String>,
    pub stylist_id: Option<String>,
    pub services: Vec<ServiceInput>,
    pub scheduled_for: NaiveDateTime,
    pub duration_minutes: Option<i64>,
    pub notes: Option<String>,
}

impl NewAppointment {
    fn validate(&self) -> AppResult<()> {
        if self.branch_id.trim().is_empty() {
            return Err(AppError::validation("A branch is required."));
        }
        if self.services.is_empty() {
            return Err(AppError::validation("At least one service is required."));
        }
        if self.services.iter().any(|s| s.service_id.trim().is_empty()) {
            return Err(AppError::validation("Every assignment needs a service."));
        }
        if self.client_id.is_none()
            && self
                .guest_name
                .as_deref()
                .map_or(true, |name| name.trim().is_empty())
        {
            return Err(AppError::validation(
                "A registered client or a guest name is required.",
            ));
        }
        if matches!(self.duration_minutes, Some(d) if d <= 0) {
            return Err(AppError::validation("Duration must be positive."));
        }
        if matches!(self.duration_minutes, Some(d) if d > MAX_DURATION_MINUTES) {
            return Err(AppError::validation("Duration must not exceed 24 hours."));
        }
        Ok(())
    }

    fn duration(&self) -> i64 {
        self.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES)
    }

    /// Every distinct stylist across the legacy field and the per-service
    /// assignments; each one gets its own availability check.
    fn distinct_stylists(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        if let Some(id) = self.stylist_id.as_deref() {
            if !id.is_empty() {
                out.push(id.to_string());
            }
        }
        for svc in &self.services {
            if let Some(id) = svc.stylist_id.as_deref() {
                if !id.is_empty() && !out.iter().any(|e| e == id) {
                    out.push(id.to_string());
                }
            }
        }
        out
    }
}

pub async fn fetch_appointment(
    pool: &SqlitePool,
    appointment_id: &str,
) -> AppResult<AppointmentRow> {
    sqlx::query_as::<_, AppointmentRow>(
        r#"SELECT id, branch_id, client_id, guest_name, stylist_id, scheduled_for,
                  duration_minutes, status, notes, paid, created_at
           FROM appointments WHERE id = ?"#,
    )
    .bind(appointment_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Appointment"))
}

pub async fn service_assignments(
    pool: &SqlitePool,
    appointment_id: &str,
) -> AppResult<Vec<ServiceAssignmentRow>> {
    let rows = sqlx::query_as::<_, ServiceAssignmentRow>(
        r#"SELECT id, appointment_id, service_id, stylist_id, price, adjustment
           FROM appointment_services WHERE appointment_id = ?"#,
    )
    .bind(appointment_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Stricter, client-centric guard layered on top of the stylist check: a
/// registered client may not hold two non-terminal bookings for the same
/// service + stylist pairing at overlapping times.
async fn duplicate_booking_exists(
    conn: &mut SqliteConnection,
    client_id: &str,
    service_id: &str,
    stylist_id: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> AppResult<bool> {
    let day_start = start.date().and_time(NaiveTime::MIN);
    let day_end = day_start + Duration::days(1);

    #[derive(sqlx::FromRow)]
    struct Candidate {
        scheduled_for: NaiveDateTime,
        duration_minutes: i64,
    }

    let rows = sqlx::query_as::<_, Candidate>(
        r#"SELECT a.scheduled_for, a.duration_minutes
           FROM appointments a
           JOIN appointment_services s ON s.appointment_id = a.id
           WHERE a.client_id = ?
             AND a.status IN ('pending', 'confirmed', 'in_service')
             AND s.service_id = ? AND s.stylist_id = ?
             AND a.scheduled_for >= ? AND a.scheduled_for < ?"#,
    )
    .bind(client_id)
    .bind(service_id)
    .bind(stylist_id)
    .bind(day_start)
    .bind(day_end)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().any(|row| {
        let duration = if row.duration_minutes > 0 {
            row.duration_minutes
        } else {
            DEFAULT_DURATION_MINUTES
        };
        intervals_overlap(
            start,
            end,
            row.scheduled_for,
            row.scheduled_for + Duration::minutes(duration),
        )
    }))
}

async fn append_history(
    conn: &mut SqliteConnection,
    appointment_id: &str,
    action: &str,
    performed_by: Option<&str>,
    detail: Option<String>,
) -> AppResult<()> {
    sqlx::query(
        r#"INSERT INTO appointment_history (id, appointment_id, action, performed_by, detail, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(appointment_id)
    .bind(action)
    .bind(performed_by)
    .bind(detail)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Creates an appointment. The duplicate guard, the per-stylist availability
/// checks and the insert all run on one transaction, so the whole operation
/// either commits or leaves nothing behind, and a concurrent booking attempt
/// cannot slip between the check and the write.
pub async fn create_appointment(
    pool: &SqlitePool,
    input: &NewAppointment,
    actor: Option<&str>,
) -> AppResult<AppointmentRow> {
    input.validate()?;

    let duration = input.duration();
    let start = input.scheduled_for;
    let end = start + Duration::minutes(duration);

    let mut tx = pool.begin().await?;

    if let Some(client_id) = input.client_id.as_deref() {
        for svc in &input.services {
            let stylist = svc
                .stylist_id
                .as_deref()
                .or(input.stylist_id.as_deref())
                .unwrap_or("");
            if stylist.is_empty() {
                continue;
            }
            if duplicate_booking_exists(&mut tx, client_id, &svc.service_id, stylist, start, end)
                .await?
            {
                return Err(AppError::conflict(
                    "Client already has a booking for this service and stylist at that time.",
                ));
            }
        }
    }

    for stylist in input.distinct_stylists() {
        if !is_stylist_free(&mut *tx, &stylist, start, duration, None).await? {
            return Err(AppError::conflict("Time slot unavailable."));
        }
    }

    let id = new_id();
    let created_at = Utc::now().to_rfc3339();
    sqlx::query(
        r#"INSERT INTO appointments
           (id, branch_id, client_id, guest_name, stylist_id, scheduled_for,
            duration_minutes, status, notes, paid, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, 0, ?)"#,
    )
    .bind(&id)
    .bind(&input.branch_id)
    .bind(&input.client_id)
    .bind(&input.guest_name)
    .bind(&input.stylist_id)
    .bind(start)
    .bind(duration)
    .bind(&input.notes)
    .bind(&created_at)
    .execute(&mut *tx)
    .await?;

    for svc in &input.services {
        sqlx::query(
            r#"INSERT INTO appointment_services (id, appointment_id, service_id, stylist_id, price, adjustment)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(new_id())
        .bind(&id)
        .bind(&svc.service_id)
        .bind(&svc.stylist_id)
        .bind(svc.price)
        .bind(svc.adjustment)
        .execute(&mut *tx)
        .await?;
    }

    append_history(&mut tx, &id, "created", actor, None).await?;
    tx.commit().await?;

    fetch_appointment(pool, &id).await
}

/// Rescheduling is allowed only while pending or confirmed and before any
/// payment is recorded, and must not conflict with anything but itself.
pub async fn reschedule_appointment(
    pool: &SqlitePool,
    appointment_id: &str,
    new_start: NaiveDateTime,
    new_duration_minutes: Option<i64>,
    actor: Option<&str>,
) -> AppResult<AppointmentRow> {
    if matches!(new_duration_minutes, Some(d) if d <= 0) {
        return Err(AppError::validation("Duration must be positive."));
    }
    if matches!(new_duration_minutes, Some(d) if d > MAX_DURATION_MINUTES) {
        return Err(AppError::validation("Duration must not exceed 24 hours."));
    }

    let current = fetch_appointment(pool, appointment_id).await?;
    let status = current.status();
    if !matches!(
        status,
        AppointmentStatus::Pending | AppointmentStatus::Confirmed
    ) {
        return Err(AppError::state(format!(
            "Cannot reschedule an appointment in status {}.",
            status.as_str()
        )));
    }
    if current.paid != 0 {
        return Err(AppError::state(
            "Cannot reschedule after payment has been recorded.",
        ));
    }

    let duration = new_duration_minutes.unwrap_or(current.duration_minutes);
    let assignments = service_assignments(pool, appointment_id).await?;
    let stylists = assigned_stylists(current.stylist_id.as_deref(), &assignments);

    let mut tx = pool.begin().await?;
    for stylist in &stylists {
        if !is_stylist_free(&mut *tx, stylist, new_start, duration, Some(appointment_id)).await? {
            return Err(AppError::conflict("Time slot unavailable."));
        }
    }

    sqlx::query("UPDATE appointments SET scheduled_for = ?, duration_minutes = ? WHERE id = ?")
        .bind(new_start)
        .bind(duration)
        .bind(appointment_id)
        .execute(&mut *tx)
        .await?;
    append_history(
        &mut tx,
        appointment_id,
        "rescheduled",
        actor,
        Some(
            serde_json::json!({
                "from": current.scheduled_for.format("%Y-%m-%d %H:%M").to_string(),
                "to": new_start.format("%Y-%m-%d %H:%M").to_string(),
            })
            .to_string(),
        ),
    )
    .await?;
    tx.commit().await?;

    fetch_appointment(pool, appointment_id).await
}

/// Applies a lifecycle transition, appending to the append-only history log.
pub async fn transition_status(
    pool: &SqlitePool,
    appointment_id: &str,
    next: AppointmentStatus,
    actor: Option<&str>,
    reason: Option<&str>,
) -> AppResult<AppointmentRow> {
    let current = fetch_appointment(pool, appointment_id).await?;
    let status = current.status();
    if !status.can_transition_to(next) {
        return Err(AppError::state(format!(
            "Cannot move an appointment from {} to {}.",
            status.as_str(),
            next.as_str()
        )));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(next.as_str())
        .bind(appointment_id)
        .execute(&mut *tx)
        .await?;
    append_history(
        &mut tx,
        appointment_id,
        next.as_str(),
        actor,
        reason.map(|r| serde_json::json!({ "reason": r }).to_string()),
    )
    .await?;
    tx.commit().await?;

    fetch_appointment(pool, appointment_id).await
}

pub async fn record_payment(
    pool: &SqlitePool,
    appointment_id: &str,
    actor: Option<&str>,
) -> AppResult<AppointmentRow> {
    let current = fetch_appointment(pool, appointment_id).await?;
    if current.paid != 0 {
        return Err(AppError::state("Payment already recorded."));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE appointments SET paid = 1 WHERE id = ?")
        .bind(appointment_id)
        .execute(&mut *tx)
        .await?;
    append_history(&mut tx, appointment_id, "payment_recorded", actor, None).await?;
    tx.commit().await?;

    fetch_appointment(pool, appointment_id).await
}

/// Moves an appointment to another branch. Allowed while non-terminal; the
/// stylist assignments travel with it, so the stylist's calendar is
/// unchanged and no availability re-check is needed.
pub async fn transfer_appointment(
    pool: &SqlitePool,
    appointment_id: &str,
    to_branch_id: &str,
    actor: Option<&str>,
) -> AppResult<AppointmentRow> {
    if to_branch_id.trim().is_empty() {
        return Err(AppError::validation("A destination branch is required."));
    }

    let current = fetch_appointment(pool, appointment_id).await?;
    let status = current.status();
    if status.is_terminal() {
        return Err(AppError::state(format!(
            "Cannot transfer an appointment in status {}.",
            status.as_str()
        )));
    }
    if current.branch_id == to_branch_id {
        return Err(AppError::validation(
            "Appointment is already at that branch.",
        ));
    }

    let branch_exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM branches WHERE id = ?")
        .bind(to_branch_id)
        .fetch_one(pool)
        .await?;
    if branch_exists == 0 {
        return Err(AppError::NotFound("Branch"));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE appointments SET branch_id = ? WHERE id = ?")
        .bind(to_branch_id)
        .bind(appointment_id)
        .execute(&mut *tx)
        .await?;
    append_history(
        &mut tx,
        appointment_id,
        "transferred",
        actor,
        Some(
            serde_json::json!({
                "from": current.branch_id,
                "to": to_branch_id,
            })
            .to_string(),
        ),
    )
    .await?;
    tx.commit().await?;

    fetch_appointment(pool, appointment_id).await
}

/// Admin delete bypasses the status machine; service rows and history go
/// with the appointment via cascade.
pub async fn delete_appointment(pool: &SqlitePool, appointment_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM appointments WHERE id = ?")
        .bind(appointment_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Appointment"));
    }
    Ok(())
}

pub async fn history(
    pool: &SqlitePool,
    appointment_id: &str,
) -> AppResult<Vec<crate::models::AppointmentHistoryRow>> {
    let rows = sqlx::query_as::<_, crate::models::AppointmentHistoryRow>(
        r#"SELECT id, appointment_id, action, performed_by, detail, created_at
           FROM appointment_history
           WHERE appointment_id = ?
           ORDER BY created_at"#,
    )
    .bind(appointment_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
