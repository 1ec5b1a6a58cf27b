use actix_web::{web, HttpResponse};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;

use crate::{
    availability,
    booking::{self, NewAppointment},
    db::log_activity,
    error::{AppError, AppResult},
    notify,
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/slots").route(web::get().to(list_slots)))
        .service(web::resource("/appointments").route(web::post().to(create_booking)))
        .service(web::resource("/appointments/{id}").route(web::get().to(appointment_status)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

#[derive(Deserialize)]
struct SlotQuery {
    branch_id: String,
    stylist_id: Option<String>,
    date: NaiveDate,
    duration_minutes: Option<i64>,
}

async fn list_slots(
    state: web::Data<AppState>,
    query: web::Query<SlotQuery>,
) -> AppResult<HttpResponse> {
    if query.branch_id.trim().is_empty() {
        return Err(AppError::validation("A branch is required."));
    }
    let duration = query
        .duration_minutes
        .unwrap_or(availability::DEFAULT_DURATION_MINUTES);

    let day = availability::generate_time_slots(
        &state.db,
        &query.branch_id,
        query.stylist_id.as_deref().filter(|s| !s.is_empty()),
        query.date,
        duration,
        Local::now().naive_local(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(day))
}

async fn create_booking(
    state: web::Data<AppState>,
    payload: web::Json<NewAppointment>,
) -> AppResult<HttpResponse> {
    let input = payload.into_inner();
    let row = booking::create_appointment(&state.db, &input, None).await?;

    log_activity(
        &state.db,
        "appointment_created",
        &format!("New appointment requested for {}.", row.scheduled_for),
        Some(&row.branch_id),
        None,
        Some(&row.id),
    )
    .await;

    notify::notify_appointment(
        &state,
        &row.id,
        "Appointment request received",
        "We received your booking request. We'll confirm shortly.",
    )
    .await;

    let _ = state
        .events
        .send(ServerEvent::appointment("appointment_created", &row, None));

    Ok(HttpResponse::Created().json(row))
}

async fn appointment_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let appointment_id = path.into_inner();
    let row = booking::fetch_appointment(&state.db, &appointment_id).await?;
    let services = booking::service_assignments(&state.db, &appointment_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "id": row.id,
        "status": row.status,
        "scheduled_for": row.scheduled_for,
        "ends_at": row.end(),
        "duration_minutes": row.duration_minutes,
        "services": services,
    })))
}
