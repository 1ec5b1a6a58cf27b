use sqlx::SqlitePool;

use crate::state::AppState;

/// Email provider settings. When unset the service runs without outbound
/// mail; every send becomes a no-op.
#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub api_url: String,
    pub from_address: String,
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("EMAIL_API_URL").unwrap_or_default(),
            from_address: std::env::var("EMAIL_FROM").unwrap_or_default(),
        }
    }

    pub fn enabled(&self) -> bool {
        !(self.api_url.trim().is_empty() || self.from_address.trim().is_empty())
    }
}

/// Emails the client attached to an appointment, if one is registered with
/// an address. Fire-and-forget: any failure is logged and never propagates
/// to the operation that triggered it.
pub async fn notify_appointment(state: &AppState, appointment_id: &str, subject: &str, body: &str) {
    if !state.notify.enabled() {
        return;
    }

    let Some(address) = client_email(&state.db, appointment_id).await else {
        return;
    };

    if let Err(err) = send_email(&state.notify, &address, subject, body).await {
        log::warn!("email send failed for appointment {appointment_id}: {err}");
    }
}

/// Emails one explicit recipient; used by the lending approval path where
/// the addressee is the requesting manager rather than a client.
pub async fn notify_address(state: &AppState, address: &str, subject: &str, body: &str) {
    if !state.notify.enabled() || address.trim().is_empty() {
        return;
    }
    if let Err(err) = send_email(&state.notify, address, subject, body).await {
        log::warn!("email send failed for {address}: {err}");
    }
}

async fn client_email(pool: &SqlitePool, appointment_id: &str) -> Option<String> {
    let row = sqlx::query_as::<_, (Option<String>,)>(
        r#"SELECT c.email
           FROM appointments a
           JOIN clients c ON a.client_id = c.id
           WHERE a.id = ?"#,
    )
    .bind(appointment_id)
    .fetch_optional(pool)
    .await
    .ok()??;

    row.0.filter(|address| !address.trim().is_empty())
}

async fn send_email(
    config: &NotifyConfig,
    to: &str,
    subject: &str,
    body: &str,
) -> Result<(), reqwest::Error> {
    let payload = serde_json::json!({
        "from": config.from_address,
        "to": to,
        "subject": subject,
        "text": body,
    });

    reqwest::Client::new()
        .post(&config.api_url)
        .json(&payload)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}
