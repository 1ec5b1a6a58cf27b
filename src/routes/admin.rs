use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{admin_validator, hash_password, new_id, AuthUser},
    booking,
    db::log_activity,
    error::{AppError, AppResult},
    models::{
        ActivityRow, AppointmentRow, AppointmentStatus, BranchRow, ClientRow, ServiceRow,
        UserRow, ROLE_ADMIN, ROLE_MANAGER, ROLE_STYLIST,
    },
    notify, schedule,
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .service(
                web::resource("/staff")
                    .route(web::get().to(list_staff))
                    .route(web::post().to(create_staff)),
            )
            .service(web::resource("/staff/export.csv").route(web::get().to(export_staff_csv)))
            .service(web::resource("/staff/import").route(web::post().to(import_staff_csv)))
            .service(web::resource("/staff/{id}").route(web::put().to(update_staff)))
            .service(
                web::resource("/branches")
                    .route(web::get().to(list_branches))
                    .route(web::post().to(create_branch)),
            )
            .service(web::resource("/branches/{id}/hours").route(web::put().to(set_hours)))
            .service(
                web::resource("/services")
                    .route(web::get().to(list_services))
                    .route(web::post().to(create_service)),
            )
            .service(
                web::resource("/clients")
                    .route(web::get().to(list_clients))
                    .route(web::post().to(create_client)),
            )
            .service(web::resource("/activities").route(web::get().to(list_activities)))
            .service(web::resource("/schedules").route(web::post().to(create_schedule)))
            .service(web::resource("/shift-overrides").route(web::post().to(create_override)))
            .service(
                web::resource("/calendar")
                    .route(web::get().to(list_calendar))
                    .route(web::post().to(create_calendar_entry)),
            )
            .service(web::resource("/calendar/{id}").route(web::delete().to(delete_calendar_entry)))
            .service(web::resource("/appointments").route(web::get().to(list_appointments)))
            .service(
                web::resource("/appointments/{id}")
                    .route(web::get().to(appointment_detail))
                    .route(web::delete().to(delete_appointment)),
            )
            .service(
                web::resource("/appointments/{id}/status").route(web::post().to(update_status)),
            )
            .service(
                web::resource("/appointments/{id}/reschedule").route(web::post().to(reschedule)),
            )
            .service(
                web::resource("/appointments/{id}/payment").route(web::post().to(record_payment)),
            )
            .service(
                web::resource("/appointments/{id}/transfer").route(web::post().to(transfer)),
            )
            .service(web::resource("/reports/daily").route(web::get().to(daily_report)))
            .service(web::resource("/stats").route(web::get().to(stats))),
    );
}

#[derive(Debug, Serialize)]
struct StaffView {
    id: String,
    username: String,
    display_name: String,
    email: Option<String>,
    role: String,
    branch_id: Option<String>,
    active: bool,
}

impl From<UserRow> for StaffView {
    fn from(user: UserRow) -> Self {
        StaffView {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            email: user.email,
            role: user.role,
            branch_id: user.branch_id,
            active: user.active == 1,
        }
    }
}

#[derive(Deserialize)]
struct StaffFilter {
    branch_id: Option<String>,
}

async fn list_staff(
    state: web::Data<AppState>,
    query: web::Query<StaffFilter>,
) -> AppResult<HttpResponse> {
    let rows = fetch_staff(&state, query.branch_id.as_deref()).await?;
    let staff: Vec<StaffView> = rows.into_iter().map(StaffView::from).collect();
    Ok(HttpResponse::Ok().json(staff))
}

async fn fetch_staff(
    state: &AppState,
    branch_id: Option<&str>,
) -> AppResult<Vec<UserRow>> {
    let rows = if let Some(branch) = branch_id {
        sqlx::query_as::<_, UserRow>(
            r#"SELECT id, username, display_name, email, role, branch_id, password_hash, active, created_at
               FROM users WHERE branch_id = ? ORDER BY display_name"#,
        )
        .bind(branch)
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, UserRow>(
            r#"SELECT id, username, display_name, email, role, branch_id, password_hash, active, created_at
               FROM users ORDER BY display_name"#,
        )
        .fetch_all(&state.db)
        .await?
    };
    Ok(rows)
}

#[derive(Deserialize)]
struct StaffCreateForm {
    username: String,
    display_name: String,
    email: Option<String>,
    role: String,
    branch_id: Option<String>,
    password: String,
}

async fn create_staff(
    state: web::Data<AppState>,
    form: web::Json<StaffCreateForm>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    if form.username.trim().is_empty() {
        return Err(AppError::validation("Username is required."));
    }
    if form.display_name.trim().is_empty() {
        return Err(AppError::validation("Display name is required."));
    }
    if form.password.trim().len() < 6 {
        return Err(AppError::validation(
            "Password must be at least 6 characters.",
        ));
    }
    if ![ROLE_ADMIN, ROLE_MANAGER, ROLE_STYLIST].contains(&form.role.as_str()) {
        return Err(AppError::validation("Unknown role."));
    }

    let password_hash = hash_password(&form.password)
        .map_err(|_| AppError::validation("Password could not be hashed."))?;
    let id = new_id();

    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, email, role, branch_id, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&id)
    .bind(form.username.trim())
    .bind(form.display_name.trim())
    .bind(&form.email)
    .bind(&form.role)
    .bind(&form.branch_id)
    .bind(password_hash)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    log_activity(
        &state.db,
        "staff_created",
        &format!("{} created staff member {}.", auth.display_name, form.display_name),
        form.branch_id.as_deref(),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

/// Keeps a JSON null distinct from an absent field: absent deserializes to
/// `None` via the field default, null to `Some(None)`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct StaffUpdateForm {
    display_name: Option<String>,
    // Absent leaves the stored value; an explicit null clears it.
    #[serde(default, deserialize_with = "double_option")]
    email: Option<Option<String>>,
    role: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    branch_id: Option<Option<String>>,
    active: Option<bool>,
}

async fn update_staff(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<StaffUpdateForm>,
) -> AppResult<HttpResponse> {
    apply_staff_update(&state.db, &path.into_inner(), form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn apply_staff_update(
    pool: &sqlx::SqlitePool,
    staff_id: &str,
    form: StaffUpdateForm,
) -> AppResult<()> {
    let existing = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, email, role, branch_id, password_hash, active, created_at
           FROM users WHERE id = ?"#,
    )
    .bind(staff_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Staff member"))?;

    if let Some(role) = form.role.as_deref() {
        if ![ROLE_ADMIN, ROLE_MANAGER, ROLE_STYLIST].contains(&role) {
            return Err(AppError::validation("Unknown role."));
        }
    }

    sqlx::query(
        r#"UPDATE users SET display_name = ?, email = ?, role = ?, branch_id = ?, active = ?
           WHERE id = ?"#,
    )
    .bind(form.display_name.unwrap_or(existing.display_name))
    .bind(form.email.unwrap_or(existing.email))
    .bind(form.role.unwrap_or(existing.role))
    .bind(form.branch_id.unwrap_or(existing.branch_id))
    .bind(form.active.map(i64::from).unwrap_or(existing.active))
    .bind(staff_id)
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct StaffCsvRecord {
    username: String,
    display_name: String,
    email: Option<String>,
    role: String,
    branch_id: Option<String>,
    active: bool,
}

async fn export_staff_csv(
    state: web::Data<AppState>,
    query: web::Query<StaffFilter>,
) -> AppResult<HttpResponse> {
    let rows = fetch_staff(&state, query.branch_id.as_deref()).await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    for user in rows {
        let record = StaffCsvRecord {
            username: user.username,
            display_name: user.display_name,
            email: user.email,
            role: user.role,
            branch_id: user.branch_id,
            active: user.active == 1,
        };
        writer
            .serialize(record)
            .map_err(|e| AppError::validation(format!("CSV write failed: {e}")))?;
    }
    let body = writer
        .into_inner()
        .map_err(|e| AppError::validation(format!("CSV write failed: {e}")))?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .body(body))
}

#[derive(Deserialize)]
struct StaffImportRecord {
    username: String,
    display_name: String,
    email: Option<String>,
    role: String,
    branch_id: Option<String>,
    password: String,
}

async fn import_staff_csv(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let mut reader = csv::Reader::from_reader(body.as_ref());
    let mut imported = 0usize;
    let mut skipped = Vec::new();

    for (line, result) in reader.deserialize::<StaffImportRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                skipped.push(format!("row {}: {err}", line + 1));
                continue;
            }
        };
        if ![ROLE_ADMIN, ROLE_MANAGER, ROLE_STYLIST].contains(&record.role.as_str()) {
            skipped.push(format!("row {}: unknown role {}", line + 1, record.role));
            continue;
        }
        let Ok(password_hash) = hash_password(&record.password) else {
            skipped.push(format!("row {}: password hash failed", line + 1));
            continue;
        };

        let inserted = sqlx::query(
            r#"INSERT OR IGNORE INTO users
               (id, username, display_name, email, role, branch_id, password_hash, active, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)"#,
        )
        .bind(new_id())
        .bind(record.username.trim())
        .bind(record.display_name.trim())
        .bind(&record.email)
        .bind(&record.role)
        .bind(&record.branch_id)
        .bind(password_hash)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&state.db)
        .await?;

        if inserted.rows_affected() > 0 {
            imported += 1;
        } else {
            skipped.push(format!("row {}: username taken", line + 1));
        }
    }

    log_activity(
        &state.db,
        "staff_imported",
        &format!("{} imported {imported} staff record(s).", auth.display_name),
        None,
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "imported": imported, "skipped": skipped })))
}

#[derive(Deserialize)]
struct BranchCreateForm {
    name: String,
    address: Option<String>,
    phone: Option<String>,
    country_code: Option<String>,
}

async fn list_branches(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let rows = sqlx::query_as::<_, BranchRow>(
        "SELECT id, name, address, phone, country_code, created_at FROM branches ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn create_branch(
    state: web::Data<AppState>,
    form: web::Json<BranchCreateForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    if form.name.trim().is_empty() {
        return Err(AppError::validation("Branch name is required."));
    }
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO branches (id, name, address, phone, country_code, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(form.name.trim())
    .bind(&form.address)
    .bind(&form.phone)
    .bind(form.country_code.unwrap_or_else(|| "US".to_string()))
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[derive(Deserialize)]
struct HoursForm {
    weekday: i64,
    open_time: Option<NaiveTime>,
    close_time: Option<NaiveTime>,
    #[serde(default)]
    closed: bool,
}

async fn set_hours(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<Vec<HoursForm>>,
) -> AppResult<HttpResponse> {
    let branch_id = path.into_inner();
    for entry in form.into_inner() {
        schedule::set_branch_hours(
            &state.db,
            &branch_id,
            entry.weekday,
            entry.open_time,
            entry.close_time,
            entry.closed,
        )
        .await?;
    }
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

#[derive(Deserialize)]
struct ServiceCreateForm {
    name: String,
    branch_id: Option<String>,
    duration_minutes: Option<i64>,
    price: Option<f64>,
}

async fn create_service(
    state: web::Data<AppState>,
    form: web::Json<ServiceCreateForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    if form.name.trim().is_empty() {
        return Err(AppError::validation("Service name is required."));
    }
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO services (id, branch_id, name, duration_minutes, price, active)
           VALUES (?, ?, ?, ?, ?, 1)"#,
    )
    .bind(&id)
    .bind(&form.branch_id)
    .bind(form.name.trim())
    .bind(form.duration_minutes.unwrap_or(60))
    .bind(form.price.unwrap_or(0.0))
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[derive(Deserialize)]
struct ShiftForm {
    staff_id: String,
    weekday: i64,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

#[derive(Deserialize)]
struct ScheduleForm {
    branch_id: String,
    start_date: NaiveDate,
    shifts: Vec<ShiftForm>,
}

async fn create_schedule(
    state: web::Data<AppState>,
    form: web::Json<ScheduleForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    let shifts: Vec<schedule::ShiftInput> = form
        .shifts
        .into_iter()
        .map(|s| schedule::ShiftInput {
            staff_id: s.staff_id,
            weekday: s.weekday,
            start_time: s.start_time,
            end_time: s.end_time,
        })
        .collect();
    let id = schedule::create_schedule_config(&state.db, &form.branch_id, form.start_date, &shifts)
        .await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[derive(Deserialize)]
struct OverrideForm {
    staff_id: String,
    date: NaiveDate,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    #[serde(default)]
    day_off: bool,
}

async fn create_override(
    state: web::Data<AppState>,
    form: web::Json<OverrideForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    let id = schedule::set_shift_override(
        &state.db,
        &form.staff_id,
        form.date,
        form.start_time,
        form.end_time,
        form.day_off,
    )
    .await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[derive(Deserialize)]
struct CalendarQuery {
    branch_id: String,
    date: NaiveDate,
}

/// Branch calendar entries for a date, with the country's public holidays
/// merged in for display. Public holidays never block booking on their own.
async fn list_calendar(
    state: web::Data<AppState>,
    query: web::Query<CalendarQuery>,
) -> AppResult<HttpResponse> {
    let entries = schedule::calendar_entries_for(&state.db, &query.branch_id, query.date).await?;

    let branch = sqlx::query_as::<_, BranchRow>(
        "SELECT id, name, address, phone, country_code, created_at FROM branches WHERE id = ?",
    )
    .bind(&query.branch_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Branch"))?;

    let holidays: Vec<_> = state
        .holidays
        .holidays_for(&branch.country_code, query.date.year())
        .await
        .into_iter()
        .filter(|holiday| holiday.date == query.date)
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "entries": entries,
        "public_holidays": holidays,
    })))
}

#[derive(Deserialize)]
struct CalendarEntryForm {
    branch_id: String,
    date: NaiveDate,
    title: String,
    description: Option<String>,
    entry_type: String,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
}

async fn create_calendar_entry(
    state: web::Data<AppState>,
    form: web::Json<CalendarEntryForm>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    let id = schedule::create_calendar_entry(
        &state.db,
        &form.branch_id,
        form.date,
        &form.title,
        form.description.as_deref(),
        &form.entry_type,
        form.start_time,
        form.end_time,
        Some(&auth.id),
    )
    .await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

async fn delete_calendar_entry(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    schedule::delete_calendar_entry(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

#[derive(Deserialize)]
struct AppointmentFilter {
    branch_id: Option<String>,
    status: Option<String>,
}

async fn list_appointments(
    state: web::Data<AppState>,
    query: web::Query<AppointmentFilter>,
) -> AppResult<HttpResponse> {
    let mut sql = String::from(
        r#"SELECT id, branch_id, client_id, guest_name, stylist_id, scheduled_for,
                  duration_minutes, status, notes, paid, created_at
           FROM appointments WHERE 1 = 1"#,
    );
    if query.branch_id.is_some() {
        sql.push_str(" AND branch_id = ?");
    }
    if query.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY scheduled_for DESC");

    let mut q = sqlx::query_as::<_, AppointmentRow>(&sql);
    if let Some(branch) = &query.branch_id {
        q = q.bind(branch);
    }
    if let Some(status) = &query.status {
        q = q.bind(status);
    }
    let rows = q.fetch_all(&state.db).await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn appointment_detail(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let appointment_id = path.into_inner();
    let row = booking::fetch_appointment(&state.db, &appointment_id).await?;
    let services = booking::service_assignments(&state.db, &appointment_id).await?;
    let history = booking::history(&state.db, &appointment_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "appointment": row,
        "services": services,
        "history": history,
    })))
}

#[derive(Deserialize)]
struct StatusForm {
    status: AppointmentStatus,
    reason: Option<String>,
}

async fn update_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<StatusForm>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let appointment_id = path.into_inner();
    let form = form.into_inner();

    let row = booking::transition_status(
        &state.db,
        &appointment_id,
        form.status,
        Some(&auth.id),
        form.reason.as_deref(),
    )
    .await?;

    log_activity(
        &state.db,
        "appointment_status_changed",
        &format!(
            "{} moved appointment {} to {}.",
            auth.display_name,
            appointment_id,
            form.status.as_str()
        ),
        Some(&row.branch_id),
        Some(&auth.id),
        Some(&appointment_id),
    )
    .await;

    let subject = match form.status {
        AppointmentStatus::Confirmed => "Appointment confirmed",
        AppointmentStatus::InService => "Your appointment is underway",
        AppointmentStatus::Completed => "Thanks for visiting",
        AppointmentStatus::Cancelled => "Appointment cancelled",
        _ => "Appointment updated",
    };
    notify::notify_appointment(
        &state,
        &appointment_id,
        subject,
        &format!("Your appointment status is now {}.", form.status.as_str()),
    )
    .await;

    let _ = state
        .events
        .send(ServerEvent::appointment("appointment_updated", &row, None));

    Ok(HttpResponse::Ok().json(row))
}

#[derive(Deserialize)]
struct RescheduleForm {
    scheduled_for: NaiveDateTime,
    duration_minutes: Option<i64>,
}

async fn reschedule(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<RescheduleForm>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let appointment_id = path.into_inner();
    let form = form.into_inner();

    let row = booking::reschedule_appointment(
        &state.db,
        &appointment_id,
        form.scheduled_for,
        form.duration_minutes,
        Some(&auth.id),
    )
    .await?;

    notify::notify_appointment(
        &state,
        &appointment_id,
        "Appointment rescheduled",
        &format!(
            "Your appointment was moved to {}.",
            row.scheduled_for.format("%Y-%m-%d %H:%M")
        ),
    )
    .await;

    let _ = state
        .events
        .send(ServerEvent::appointment("appointment_rescheduled", &row, None));

    Ok(HttpResponse::Ok().json(row))
}

#[derive(Deserialize)]
struct TransferForm {
    branch_id: String,
}

async fn transfer(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<TransferForm>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let appointment_id = path.into_inner();
    let row = booking::transfer_appointment(
        &state.db,
        &appointment_id,
        &form.branch_id,
        Some(&auth.id),
    )
    .await?;

    log_activity(
        &state.db,
        "appointment_transferred",
        &format!(
            "{} transferred appointment {} to branch {}.",
            auth.display_name, appointment_id, row.branch_id
        ),
        Some(&row.branch_id),
        Some(&auth.id),
        Some(&appointment_id),
    )
    .await;

    notify::notify_appointment(
        &state,
        &appointment_id,
        "Appointment transferred",
        &format!(
            "Your appointment on {} now takes place at a different branch.",
            row.scheduled_for.format("%Y-%m-%d %H:%M")
        ),
    )
    .await;

    let _ = state
        .events
        .send(ServerEvent::appointment("appointment_transferred", &row, None));

    Ok(HttpResponse::Ok().json(row))
}

async fn record_payment(
    state: web::Data<AppState>,
    path: web::Path<String>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let row = booking::record_payment(&state.db, &path.into_inner(), Some(&auth.id)).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn delete_appointment(
    state: web::Data<AppState>,
    path: web::Path<String>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let appointment_id = path.into_inner();
    booking::delete_appointment(&state.db, &appointment_id).await?;

    log_activity(
        &state.db,
        "appointment_deleted",
        &format!("{} deleted appointment {}.", auth.display_name, appointment_id),
        None,
        Some(&auth.id),
        Some(&appointment_id),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

#[derive(Deserialize)]
struct ReportQuery {
    branch_id: String,
    date: NaiveDate,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct ReportRow {
    id: String,
    scheduled_for: NaiveDateTime,
    duration_minutes: i64,
    status: String,
    client_name: Option<String>,
    guest_name: Option<String>,
    stylist_name: Option<String>,
}

/// Structured data for a printable daily schedule; layout is the caller's
/// concern.
async fn daily_report(
    state: web::Data<AppState>,
    query: web::Query<ReportQuery>,
) -> AppResult<HttpResponse> {
    let day_start = query.date.and_time(NaiveTime::MIN);
    let day_end = day_start + chrono::Duration::days(1);

    let rows = sqlx::query_as::<_, ReportRow>(
        r#"SELECT a.id, a.scheduled_for, a.duration_minutes, a.status, a.guest_name,
                  c.name AS client_name, u.display_name AS stylist_name
           FROM appointments a
           LEFT JOIN clients c ON a.client_id = c.id
           LEFT JOIN users u ON a.stylist_id = u.id
           WHERE a.branch_id = ? AND a.scheduled_for >= ? AND a.scheduled_for < ?
           ORDER BY a.scheduled_for"#,
    )
    .bind(&query.branch_id)
    .bind(day_start)
    .bind(day_end)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "branch_id": query.branch_id,
        "date": query.date,
        "appointments": rows,
    })))
}

#[derive(Deserialize)]
struct StatsQuery {
    branch_id: String,
}

async fn stats(
    state: web::Data<AppState>,
    query: web::Query<StatsQuery>,
) -> AppResult<HttpResponse> {
    let mut counts = serde_json::Map::new();
    for status in ["pending", "confirmed", "in_service", "completed", "cancelled", "no_show"] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM appointments WHERE branch_id = ? AND status = ?",
        )
        .bind(&query.branch_id)
        .bind(status)
        .fetch_one(&state.db)
        .await?;
        counts.insert(status.to_string(), json!(count));
    }
    Ok(HttpResponse::Ok().json(counts))
}

async fn list_clients(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let rows = sqlx::query_as::<_, ClientRow>(
        "SELECT id, name, phone, email, created_at FROM clients ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[derive(Deserialize)]
struct ClientCreateForm {
    name: String,
    phone: Option<String>,
    email: Option<String>,
}

async fn create_client(
    state: web::Data<AppState>,
    form: web::Json<ClientCreateForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    if form.name.trim().is_empty() {
        return Err(AppError::validation("Client name is required."));
    }
    let id = new_id();
    sqlx::query(
        "INSERT INTO clients (id, name, phone, email, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(form.name.trim())
    .bind(&form.phone)
    .bind(&form.email)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[derive(Deserialize)]
struct ActivityFilter {
    branch_id: Option<String>,
    limit: Option<i64>,
}

async fn list_activities(
    state: web::Data<AppState>,
    query: web::Query<ActivityFilter>,
) -> AppResult<HttpResponse> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let rows = if let Some(branch) = &query.branch_id {
        sqlx::query_as::<_, ActivityRow>(
            r#"SELECT action, message, branch_id, created_at
               FROM activities WHERE branch_id = ?
               ORDER BY created_at DESC LIMIT ?"#,
        )
        .bind(branch)
        .bind(limit)
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, ActivityRow>(
            r#"SELECT action, message, branch_id, created_at
               FROM activities ORDER BY created_at DESC LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&state.db)
        .await?
    };
    Ok(HttpResponse::Ok().json(rows))
}

async fn list_services(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let rows = sqlx::query_as::<_, ServiceRow>(
        "SELECT id, branch_id, name, duration_minutes, price, active FROM services WHERE active = 1 ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;

    async fn seed_user(pool: &sqlx::SqlitePool) {
        sqlx::query(
            "INSERT INTO branches (id, name, country_code, created_at) VALUES ('b1', 'Main', 'US', '')",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            r#"INSERT INTO users (id, username, display_name, email, role, branch_id, password_hash, active, created_at)
               VALUES ('u1', 'sam', 'Sam', 'sam@example.com', 'stylist', 'b1', 'x', 1, '')"#,
        )
        .execute(pool)
        .await
        .unwrap();
    }

    async fn fetch_user(pool: &sqlx::SqlitePool) -> UserRow {
        sqlx::query_as::<_, UserRow>(
            r#"SELECT id, username, display_name, email, role, branch_id, password_hash, active, created_at
               FROM users WHERE id = 'u1'"#,
        )
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[test]
    fn staff_update_form_distinguishes_absent_from_null() {
        let form: StaffUpdateForm = serde_json::from_str(r#"{"email": null}"#).unwrap();
        assert_eq!(form.email, Some(None));
        assert_eq!(form.branch_id, None);

        let form: StaffUpdateForm = serde_json::from_str(r#"{"email": "a@b.example"}"#).unwrap();
        assert_eq!(form.email, Some(Some("a@b.example".to_string())));
    }

    #[tokio::test]
    async fn update_with_null_clears_and_absent_keeps() {
        let pool = test_pool().await;
        seed_user(&pool).await;

        // Absent fields leave the stored values untouched.
        let keep: StaffUpdateForm =
            serde_json::from_str(r#"{"display_name": "Sam R."}"#).unwrap();
        apply_staff_update(&pool, "u1", keep).await.unwrap();
        let user = fetch_user(&pool).await;
        assert_eq!(user.display_name, "Sam R.");
        assert_eq!(user.email.as_deref(), Some("sam@example.com"));
        assert_eq!(user.branch_id.as_deref(), Some("b1"));

        // Explicit nulls clear them.
        let clear: StaffUpdateForm =
            serde_json::from_str(r#"{"email": null, "branch_id": null}"#).unwrap();
        apply_staff_update(&pool, "u1", clear).await.unwrap();
        let user = fetch_user(&pool).await;
        assert_eq!(user.email, None);
        assert_eq!(user.branch_id, None);
    }
}
