use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{manager_validator, AuthUser},
    error::AppResult,
    lending::{self, LendingInput},
    notify,
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/lending")
            .wrap(HttpAuthentication::basic(manager_validator))
            .service(web::resource("").route(web::post().to(request)))
            .service(web::resource("/branch/{id}").route(web::get().to(branch_requests)))
            .service(web::resource("/into/{id}").route(web::get().to(into_branch)))
            .service(web::resource("/out-of/{id}").route(web::get().to(out_of_branch)))
            .service(web::resource("/{id}/approve").route(web::post().to(approve)))
            .service(web::resource("/{id}/reject").route(web::post().to(reject)))
            .service(web::resource("/{id}/cancel").route(web::post().to(cancel))),
    );
}

async fn request(
    state: web::Data<AppState>,
    form: web::Json<LendingInput>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let input = form.into_inner();
    let id = lending::request_lending(&state.db, &input, &auth.id).await?;

    let _ = state.events.send(ServerEvent::lending(
        "lending_requested",
        &id,
        &input.from_branch_id,
        "pending",
    ));

    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[derive(Deserialize)]
struct ApproveForm {
    stylist_id: Option<String>,
}

async fn approve(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<ApproveForm>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let request_id = path.into_inner();
    let row = lending::approve_lending(
        &state.db,
        &request_id,
        &auth.id,
        form.stylist_id.as_deref(),
    )
    .await?;

    // Tell the requesting manager their loan is confirmed.
    if let Some(address) = requester_email(&state, &row.requested_by).await {
        notify::notify_address(
            &state,
            &address,
            "Stylist lending approved",
            &format!(
                "Your lending request for {} to {} has been approved.",
                row.start_date, row.end_date
            ),
        )
        .await;
    }

    let _ = state.events.send(ServerEvent::lending(
        "lending_approved",
        &row.id,
        &row.to_branch_id,
        &row.status,
    ));

    Ok(HttpResponse::Ok().json(row))
}

#[derive(Deserialize)]
struct RejectForm {
    reason: String,
}

async fn reject(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Json<RejectForm>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let row = lending::reject_lending(&state.db, &path.into_inner(), &form.reason, &auth.id).await?;

    let _ = state.events.send(ServerEvent::lending(
        "lending_rejected",
        &row.id,
        &row.to_branch_id,
        &row.status,
    ));

    Ok(HttpResponse::Ok().json(row))
}

async fn cancel(
    state: web::Data<AppState>,
    path: web::Path<String>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let row = lending::cancel_lending(&state.db, &path.into_inner(), &auth.id).await?;

    let _ = state.events.send(ServerEvent::lending(
        "lending_cancelled",
        &row.id,
        &row.to_branch_id,
        &row.status,
    ));

    Ok(HttpResponse::Ok().json(row))
}

#[derive(Deserialize)]
struct DateFilter {
    date: Option<NaiveDate>,
}

async fn branch_requests(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let rows = lending::requests_for_branch(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn into_branch(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DateFilter>,
) -> AppResult<HttpResponse> {
    let rows = lending::lendings_into(&state.db, &path.into_inner(), query.date).await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn out_of_branch(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DateFilter>,
) -> AppResult<HttpResponse> {
    let rows = lending::lendings_out_of(&state.db, &path.into_inner(), query.date).await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn requester_email(state: &AppState, user_id: &str) -> Option<String> {
    let row = sqlx::query_as::<_, (Option<String>,)>("SELECT email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await
        .ok()??;
    row.0.filter(|address| !address.trim().is_empty())
}
