use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::holidays::HolidayCache;
use crate::models::AppointmentRow;
use crate::notify::NotifyConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
    pub notify: NotifyConfig,
    pub holidays: HolidayCache,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    pub kind: String,
    pub appointment_id: Option<String>,
    pub branch_id: Option<String>,
    pub status: Option<String>,
    pub client_name: Option<String>,
    pub stylist_id: Option<String>,
    pub scheduled_for: Option<String>,
    pub lending_id: Option<String>,
}

impl ServerEvent {
    pub fn appointment(kind: &str, row: &AppointmentRow, client_name: Option<String>) -> Self {
        Self {
            kind: kind.to_string(),
            appointment_id: Some(row.id.clone()),
            branch_id: Some(row.branch_id.clone()),
            status: Some(row.status.clone()),
            client_name,
            stylist_id: row.stylist_id.clone(),
            scheduled_for: Some(row.scheduled_for.format("%Y-%m-%d %H:%M").to_string()),
            lending_id: None,
        }
    }

    pub fn lending(kind: &str, lending_id: &str, branch_id: &str, status: &str) -> Self {
        Self {
            kind: kind.to_string(),
            appointment_id: None,
            branch_id: Some(branch_id.to_string()),
            status: Some(status.to_string()),
            client_name: None,
            stylist_id: None,
            scheduled_for: None,
            lending_id: Some(lending_id.to_string()),
        }
    }
}
