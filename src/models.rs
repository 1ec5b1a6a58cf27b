use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MANAGER: &str = "manager";
pub const ROLE_STYLIST: &str = "stylist";

/// Appointment lifecycle. `Cancelled` and `NoShow` are terminal and reachable
/// from any non-terminal state; the forward path is
/// pending -> confirmed -> in_service -> completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InService,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InService => "in_service",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "in_service" => Some(AppointmentStatus::InService),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "no_show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }

    /// A non-terminal appointment still occupies the stylist's calendar.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::NoShow
        )
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        match (self, next) {
            (Pending, Confirmed)
            | (Confirmed, InService)
            | (InService, Completed) => true,
            (from, Cancelled) | (from, NoShow) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: String,
    pub branch_id: String,
    pub client_id: Option<String>,
    pub guest_name: Option<String>,
    pub stylist_id: Option<String>,
    pub scheduled_for: NaiveDateTime,
    pub duration_minutes: i64,
    pub status: String,
    pub notes: Option<String>,
    pub paid: i64,
    pub created_at: String,
}

impl AppointmentRow {
    pub fn status(&self) -> AppointmentStatus {
        AppointmentStatus::parse(&self.status).unwrap_or(AppointmentStatus::Pending)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.scheduled_for + chrono::Duration::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceAssignmentRow {
    pub id: String,
    pub appointment_id: String,
    pub service_id: String,
    pub stylist_id: Option<String>,
    pub price: f64,
    pub adjustment: f64,
}

/// Merges the two shapes a stylist assignment can take, the legacy flat
/// column and the per-service rows, into one deduplicated list. This is the
/// single normalizing accessor; nothing else inspects the shapes separately.
pub fn assigned_stylists(
    legacy: Option<&str>,
    services: &[ServiceAssignmentRow],
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(id) = legacy {
        if !id.is_empty() {
            out.push(id.to_string());
        }
    }
    for svc in services {
        if let Some(id) = svc.stylist_id.as_deref() {
            if !id.is_empty() && !out.iter().any(|existing| existing == id) {
                out.push(id.to_string());
            }
        }
    }
    out
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: String,
    pub branch_id: Option<String>,
    pub password_hash: String,
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BranchRow {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub country_code: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BranchHoursRow {
    pub branch_id: String,
    pub weekday: i64,
    pub open_time: Option<NaiveTime>,
    pub close_time: Option<NaiveTime>,
    pub closed: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleConfigRow {
    pub id: String,
    pub branch_id: String,
    pub start_date: NaiveDate,
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleShiftRow {
    pub config_id: String,
    pub staff_id: String,
    pub weekday: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShiftOverrideRow {
    pub id: String,
    pub staff_id: String,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub day_off: i64,
}

pub const ENTRY_REMINDER: &str = "reminder";
pub const ENTRY_HOLIDAY: &str = "holiday";
pub const ENTRY_CLOSURE: &str = "closure";
pub const ENTRY_SPECIAL_HOURS: &str = "special_hours";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CalendarEntryRow {
    pub id: String,
    pub branch_id: String,
    pub date: NaiveDate,
    pub title: String,
    pub description: Option<String>,
    pub entry_type: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub status: String,
    pub created_by: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LendingStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LendingStatus::Pending => "pending",
            LendingStatus::Approved => "approved",
            LendingStatus::Rejected => "rejected",
            LendingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LendingStatus::Pending),
            "approved" => Some(LendingStatus::Approved),
            "rejected" => Some(LendingStatus::Rejected),
            "cancelled" => Some(LendingStatus::Cancelled),
            // Legacy rows may still carry an explicit "active" marker;
            // read them as approved, never write it back.
            "active" => Some(LendingStatus::Approved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LendingRequestRow {
    pub id: String,
    pub stylist_id: Option<String>,
    pub from_branch_id: String,
    pub to_branch_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    pub status: String,
    pub requested_by: String,
    pub requested_at: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<String>,
}

impl LendingRequestRow {
    pub fn status(&self) -> Option<LendingStatus> {
        LendingStatus::parse(&self.status)
    }

    /// "Currently in effect" is always derived, never stored: an approved
    /// request whose inclusive date range contains `date`.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.status() == Some(LendingStatus::Approved)
            && self.start_date <= date
            && date <= self.end_date
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub branch_id: Option<String>,
    pub name: String,
    pub duration_minutes: i64,
    pub price: f64,
    pub active: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActivityRow {
    pub action: String,
    pub message: String,
    pub branch_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentHistoryRow {
    pub id: String,
    pub appointment_id: String,
    pub action: String,
    pub performed_by: Option<String>,
    pub detail: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClientRow {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_follow_lifecycle() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(InService));
        assert!(InService.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(InService));
        assert!(!Completed.can_transition_to(Confirmed));
    }

    #[test]
    fn cancel_and_no_show_reachable_from_any_non_terminal() {
        use AppointmentStatus::*;
        for from in [Pending, Confirmed, InService] {
            assert!(from.can_transition_to(Cancelled));
            assert!(from.can_transition_to(NoShow));
        }
        for from in [Completed, Cancelled, NoShow] {
            assert!(!from.can_transition_to(Cancelled));
            assert!(!from.can_transition_to(NoShow));
        }
    }

    #[test]
    fn assigned_stylists_merges_both_shapes_without_duplicates() {
        let services = vec![
            ServiceAssignmentRow {
                id: "sa1".into(),
                appointment_id: "a1".into(),
                service_id: "svc1".into(),
                stylist_id: Some("s1".into()),
                price: 30.0,
                adjustment: 0.0,
            },
            ServiceAssignmentRow {
                id: "sa2".into(),
                appointment_id: "a1".into(),
                service_id: "svc2".into(),
                stylist_id: Some("s2".into()),
                price: 20.0,
                adjustment: 0.0,
            },
            ServiceAssignmentRow {
                id: "sa3".into(),
                appointment_id: "a1".into(),
                service_id: "svc3".into(),
                stylist_id: None,
                price: 10.0,
                adjustment: 0.0,
            },
        ];
        let merged = assigned_stylists(Some("s1"), &services);
        assert_eq!(merged, vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn legacy_active_status_reads_as_approved() {
        assert_eq!(LendingStatus::parse("active"), Some(LendingStatus::Approved));
    }

    #[test]
    fn lending_activity_is_derived_from_range() {
        let row = LendingRequestRow {
            id: "l1".into(),
            stylist_id: Some("s1".into()),
            from_branch_id: "b1".into(),
            to_branch_id: "b2".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
            reason: None,
            status: "approved".into(),
            requested_by: "m1".into(),
            requested_at: String::new(),
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            cancelled_by: None,
            cancelled_at: None,
        };
        assert!(row.is_active_on(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()));
        assert!(row.is_active_on(NaiveDate::from_ymd_opt(2026, 3, 6).unwrap()));
        assert!(!row.is_active_on(NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()));

        let pending = LendingRequestRow {
            status: "pending".into(),
            ..row
        };
        assert!(!pending.is_active_on(NaiveDate::from_ymd_opt(2026, 3, 3).unwrap()));
    }
}
