use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::{ENTRY_CLOSURE, ENTRY_HOLIDAY, ENTRY_SPECIAL_HOURS};
use crate::schedule::{self, StylistWindow};

pub const DEFAULT_DURATION_MINUTES: i64 = 60;
pub const SLOT_STRIDE_MINUTES: i64 = 30;
/// Upper bound on a requested duration; anything longer than a day is a
/// caller error, and unchecked values would overflow the interval math.
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;

/// Strict half-open interval overlap on [start, end).
pub fn intervals_overlap(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

#[derive(Debug, Clone, Serialize)]
pub struct Slot {
    pub time: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotDay {
    pub slots: Vec<Slot>,
    pub message: Option<String>,
}

impl SlotDay {
    fn closed(message: impl Into<String>) -> Self {
        SlotDay {
            slots: Vec::new(),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct BusyRow {
    id: String,
    scheduled_for: NaiveDateTime,
    duration_minutes: i64,
}

/// Same-calendar-day appointments that occupy the stylist's time, through
/// either assignment shape. The day window is midnight to midnight, not a
/// rolling 24 hours; an appointment spilling past midnight is only checked
/// against its own day.
async fn busy_intervals<'a, E>(
    executor: E,
    stylist_id: &str,
    day: NaiveDate,
    exclude_appointment_id: Option<&str>,
) -> AppResult<Vec<(NaiveDateTime, NaiveDateTime)>>
where
    E: sqlx::SqliteExecutor<'a>,
{
    let day_start = day.and_time(NaiveTime::MIN);
    let day_end = day_start + Duration::days(1);

    let rows = sqlx::query_as::<_, BusyRow>(
        r#"SELECT a.id, a.scheduled_for, a.duration_minutes
           FROM appointments a
           WHERE a.scheduled_for >= ? AND a.scheduled_for < ?
             AND a.status IN ('pending', 'confirmed', 'in_service')
             AND (a.stylist_id = ?
                  OR EXISTS (SELECT 1 FROM appointment_services s
                             WHERE s.appointment_id = a.id AND s.stylist_id = ?))"#,
    )
    .bind(day_start)
    .bind(day_end)
    .bind(stylist_id)
    .bind(stylist_id)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .filter(|row| exclude_appointment_id != Some(row.id.as_str()))
        .map(|row| {
            let duration = if row.duration_minutes > 0 {
                row.duration_minutes
            } else {
                DEFAULT_DURATION_MINUTES
            };
            (row.scheduled_for, row.scheduled_for + Duration::minutes(duration))
        })
        .collect())
}

/// Point check used by create and reschedule: can `stylist_id` take an
/// appointment of `duration_minutes` starting at `start`?
/// `exclude_appointment_id` keeps the appointment being edited from
/// conflicting with itself.
pub async fn is_stylist_free<'a, E>(
    executor: E,
    stylist_id: &str,
    start: NaiveDateTime,
    duration_minutes: i64,
    exclude_appointment_id: Option<&str>,
) -> AppResult<bool>
where
    E: sqlx::SqliteExecutor<'a>,
{
    let duration = if duration_minutes > 0 {
        duration_minutes
    } else {
        DEFAULT_DURATION_MINUTES
    };
    let end = start + Duration::minutes(duration);

    let busy = busy_intervals(executor, stylist_id, start.date(), exclude_appointment_id).await?;
    for (busy_start, busy_end) in busy {
        if intervals_overlap(start, end, busy_start, busy_end) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Bookable slots for one branch/date at a 30-minute stride. Unavailable
/// slots are returned tagged rather than omitted so callers can render a
/// disabled state. `now` scopes the past-slot rule to "today" only.
pub async fn generate_time_slots(
    pool: &SqlitePool,
    branch_id: &str,
    stylist_id: Option<&str>,
    date: NaiveDate,
    service_duration_minutes: i64,
    now: NaiveDateTime,
) -> AppResult<SlotDay> {
    if service_duration_minutes > MAX_DURATION_MINUTES {
        return Err(AppError::validation("Duration must not exceed 24 hours."));
    }
    let duration = if service_duration_minutes > 0 {
        service_duration_minutes
    } else {
        DEFAULT_DURATION_MINUTES
    };

    // Calendar pass first: a holiday or closure suppresses the whole day no
    // matter what the schedules say.
    let entries = schedule::calendar_entries_for(pool, branch_id, date).await?;
    if let Some(entry) = entries
        .iter()
        .find(|e| e.entry_type == ENTRY_HOLIDAY || e.entry_type == ENTRY_CLOSURE)
    {
        return Ok(SlotDay::closed(format!("Branch is closed: {}", entry.title)));
    }

    let mut window = match stylist_id {
        Some(stylist) => match schedule::stylist_window(pool, branch_id, stylist, date).await? {
            StylistWindow::Window(start, end) => Some((start, end)),
            StylistWindow::DayOff => {
                return Ok(SlotDay::closed(format!(
                    "Stylist is not scheduled on {date}"
                )));
            }
            StylistWindow::Unscheduled => {
                schedule::branch_window(pool, branch_id, schedule::weekday_index(date)).await?
            }
        },
        None => schedule::branch_window(pool, branch_id, schedule::weekday_index(date)).await?,
    };

    // Special-hours entries override whatever window the schedules produced.
    if let Some(special) = entries
        .iter()
        .find(|e| e.entry_type == ENTRY_SPECIAL_HOURS)
    {
        if let (Some(start), Some(end)) = (special.start_time, special.end_time) {
            window = Some((start, end));
        }
    }

    let Some((open, close)) = window else {
        return Ok(SlotDay::closed(format!(
            "Branch is closed on {}s",
            schedule::weekday_name(date)
        )));
    };

    let busy = match stylist_id {
        Some(stylist) => busy_intervals(pool, stylist, date, None).await?,
        None => Vec::new(),
    };

    let slots = build_slots(date, open, close, duration, &busy, now);
    Ok(SlotDay { slots, message: None })
}

/// Pure slot construction over a resolved window. A candidate is kept only
/// when it fits entirely before the window end; today's already-elapsed
/// starts and busy overlaps are tagged unavailable.
fn build_slots(
    date: NaiveDate,
    open: NaiveTime,
    close: NaiveTime,
    duration_minutes: i64,
    busy: &[(NaiveDateTime, NaiveDateTime)],
    now: NaiveDateTime,
) -> Vec<Slot> {
    let mut slots = Vec::new();
    let is_today = date == now.date();
    let mut cursor = date.and_time(open);
    let window_end = date.and_time(close);

    while cursor + Duration::minutes(duration_minutes) <= window_end {
        let slot_end = cursor + Duration::minutes(duration_minutes);
        let past = is_today && cursor <= now;
        let taken = busy
            .iter()
            .any(|(busy_start, busy_end)| intervals_overlap(cursor, slot_end, *busy_start, *busy_end));

        slots.push(Slot {
            time: cursor.format("%H:%M").to_string(),
            available: !past && !taken,
        });
        cursor += Duration::minutes(SLOT_STRIDE_MINUTES);
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;
    use crate::schedule::{create_schedule_config, set_branch_hours, ShiftInput};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn dt(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        date.and_time(t(h, m))
    }

    // 2026-03-02 is a Monday.
    fn monday() -> NaiveDate {
        d(2026, 3, 2)
    }

    // A reference "now" far from the queried dates, so nothing counts as today.
    fn far_now() -> NaiveDateTime {
        dt(d(2026, 1, 1), 8, 0)
    }

    async fn seed_branch(pool: &SqlitePool, id: &str) {
        sqlx::query(
            "INSERT INTO branches (id, name, country_code, created_at) VALUES (?, 'Main', 'US', '')",
        )
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn seed_stylist(pool: &SqlitePool, id: &str, branch_id: &str) {
        sqlx::query(
            r#"INSERT INTO users (id, username, display_name, role, branch_id, password_hash, active, created_at)
               VALUES (?, ?, 'Stylist', 'stylist', ?, 'x', 1, '')"#,
        )
        .bind(id)
        .bind(format!("user-{id}"))
        .bind(branch_id)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn seed_appointment(
        pool: &SqlitePool,
        id: &str,
        branch_id: &str,
        stylist_id: Option<&str>,
        start: NaiveDateTime,
        duration: i64,
        status: &str,
    ) {
        sqlx::query(
            r#"INSERT INTO appointments
               (id, branch_id, stylist_id, scheduled_for, duration_minutes, status, paid, created_at)
               VALUES (?, ?, ?, ?, ?, ?, 0, '')"#,
        )
        .bind(id)
        .bind(branch_id)
        .bind(stylist_id)
        .bind(start)
        .bind(duration)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn seed_service_assignment(
        pool: &SqlitePool,
        id: &str,
        appointment_id: &str,
        stylist_id: &str,
    ) {
        sqlx::query(
            "INSERT OR IGNORE INTO services (id, name, duration_minutes, price, active) VALUES ('svc', 'Cut', 60, 40, 1)",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            r#"INSERT INTO appointment_services (id, appointment_id, service_id, stylist_id, price, adjustment)
               VALUES (?, ?, 'svc', ?, 0, 0)"#,
        )
        .bind(id)
        .bind(appointment_id)
        .bind(stylist_id)
        .execute(pool)
        .await
        .unwrap();
    }

    #[test]
    fn overlap_is_strict_half_open() {
        let day = monday();
        // Touching intervals do not overlap.
        assert!(!intervals_overlap(
            dt(day, 9, 0),
            dt(day, 10, 0),
            dt(day, 10, 0),
            dt(day, 11, 0)
        ));
        // Contained and partial overlaps do.
        assert!(intervals_overlap(
            dt(day, 9, 0),
            dt(day, 11, 0),
            dt(day, 10, 0),
            dt(day, 10, 30)
        ));
        assert!(intervals_overlap(
            dt(day, 9, 30),
            dt(day, 10, 30),
            dt(day, 10, 0),
            dt(day, 11, 0)
        ));
    }

    #[tokio::test]
    async fn double_booking_is_detected_in_both_assignment_shapes() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        seed_stylist(&pool, "s1", "b1").await;

        // Legacy flat assignment.
        seed_appointment(&pool, "a1", "b1", Some("s1"), dt(monday(), 10, 0), 60, "confirmed").await;
        assert!(!is_stylist_free(&pool, "s1", dt(monday(), 10, 30), 60, None)
            .await
            .unwrap());
        assert!(is_stylist_free(&pool, "s1", dt(monday(), 11, 0), 60, None)
            .await
            .unwrap());

        // Per-service assignment, no legacy column.
        seed_appointment(&pool, "a2", "b1", None, dt(monday(), 14, 0), 60, "pending").await;
        seed_service_assignment(&pool, "sa1", "a2", "s1").await;
        assert!(!is_stylist_free(&pool, "s1", dt(monday(), 14, 30), 30, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn terminal_appointments_never_conflict() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        seed_stylist(&pool, "s1", "b1").await;

        for (id, status) in [("a1", "completed"), ("a2", "cancelled"), ("a3", "no_show")] {
            seed_appointment(&pool, id, "b1", Some("s1"), dt(monday(), 10, 0), 60, status).await;
        }
        assert!(is_stylist_free(&pool, "s1", dt(monday(), 10, 0), 60, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn excluded_appointment_does_not_conflict_with_itself() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        seed_stylist(&pool, "s1", "b1").await;
        seed_appointment(&pool, "a1", "b1", Some("s1"), dt(monday(), 10, 0), 60, "confirmed").await;

        assert!(!is_stylist_free(&pool, "s1", dt(monday(), 10, 0), 60, None)
            .await
            .unwrap());
        assert!(is_stylist_free(&pool, "s1", dt(monday(), 10, 0), 60, Some("a1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn open_monday_yields_sixteen_available_slots() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        seed_stylist(&pool, "s1", "b1").await;
        set_branch_hours(&pool, "b1", 0, Some(t(9, 0)), Some(t(17, 0)), false)
            .await
            .unwrap();

        let day = generate_time_slots(&pool, "b1", Some("s1"), monday(), 60, far_now())
            .await
            .unwrap();
        assert!(day.message.is_none());
        assert_eq!(day.slots.len(), 16);
        assert_eq!(day.slots.first().unwrap().time, "09:00");
        assert_eq!(day.slots.last().unwrap().time, "16:00");
        assert!(day.slots.iter().all(|slot| slot.available));
    }

    #[tokio::test]
    async fn existing_booking_disables_overlapping_slots() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        seed_stylist(&pool, "s1", "b1").await;
        set_branch_hours(&pool, "b1", 0, Some(t(9, 0)), Some(t(17, 0)), false)
            .await
            .unwrap();
        seed_appointment(&pool, "a1", "b1", Some("s1"), dt(monday(), 10, 0), 60, "confirmed").await;

        let day = generate_time_slots(&pool, "b1", Some("s1"), monday(), 60, far_now())
            .await
            .unwrap();
        let availability: std::collections::HashMap<&str, bool> = day
            .slots
            .iter()
            .map(|slot| (slot.time.as_str(), slot.available))
            .collect();

        assert_eq!(availability["09:00"], true);
        assert_eq!(availability["09:30"], false); // ends 10:30, overlaps
        assert_eq!(availability["10:00"], false);
        assert_eq!(availability["10:30"], false);
        assert_eq!(availability["11:00"], true);
    }

    #[tokio::test]
    async fn closure_entry_suppresses_all_slots() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        set_branch_hours(&pool, "b1", 0, Some(t(9, 0)), Some(t(17, 0)), false)
            .await
            .unwrap();
        schedule::create_calendar_entry(
            &pool,
            "b1",
            monday(),
            "Renovation day",
            None,
            ENTRY_CLOSURE,
            None,
            None,
            None,
        )
        .await
        .unwrap();

        let day = generate_time_slots(&pool, "b1", None, monday(), 60, far_now())
            .await
            .unwrap();
        assert!(day.slots.is_empty());
        assert!(day.message.as_deref().unwrap().contains("Renovation day"));
    }

    #[tokio::test]
    async fn special_hours_entry_overrides_window() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        set_branch_hours(&pool, "b1", 0, Some(t(9, 0)), Some(t(17, 0)), false)
            .await
            .unwrap();
        schedule::create_calendar_entry(
            &pool,
            "b1",
            monday(),
            "Late opening",
            None,
            ENTRY_SPECIAL_HOURS,
            Some(t(12, 0)),
            Some(t(15, 0)),
            None,
        )
        .await
        .unwrap();

        let day = generate_time_slots(&pool, "b1", None, monday(), 60, far_now())
            .await
            .unwrap();
        assert_eq!(day.slots.first().unwrap().time, "12:00");
        assert_eq!(day.slots.last().unwrap().time, "14:00");
    }

    #[tokio::test]
    async fn oversized_duration_is_rejected_not_overflowed() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        set_branch_hours(&pool, "b1", 0, Some(t(9, 0)), Some(t(17, 0)), false)
            .await
            .unwrap();

        let err = generate_time_slots(&pool, "b1", None, monday(), i64::MAX, far_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = generate_time_slots(
            &pool,
            "b1",
            None,
            monday(),
            MAX_DURATION_MINUTES + 1,
            far_now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn closed_weekday_returns_message() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        set_branch_hours(&pool, "b1", 0, None, None, true).await.unwrap();

        let day = generate_time_slots(&pool, "b1", None, monday(), 60, far_now())
            .await
            .unwrap();
        assert!(day.slots.is_empty());
        assert_eq!(day.message.as_deref(), Some("Branch is closed on Mondays"));
    }

    #[tokio::test]
    async fn past_slot_rule_applies_only_to_today() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        set_branch_hours(&pool, "b1", 0, Some(t(9, 0)), Some(t(17, 0)), false)
            .await
            .unwrap();

        // "Now" is 11:05 on the queried Monday: 09:00-11:00 starts are gone.
        let day = generate_time_slots(&pool, "b1", None, monday(), 60, dt(monday(), 11, 5))
            .await
            .unwrap();
        let unavailable: Vec<&str> = day
            .slots
            .iter()
            .filter(|slot| !slot.available)
            .map(|slot| slot.time.as_str())
            .collect();
        assert_eq!(unavailable, vec!["09:00", "09:30", "10:00", "10:30", "11:00"]);

        // Same clock time, but the query is for the following Monday.
        let next_monday = d(2026, 3, 9);
        let day = generate_time_slots(&pool, "b1", None, next_monday, 60, dt(monday(), 11, 5))
            .await
            .unwrap();
        assert!(day.slots.iter().all(|slot| slot.available));
    }

    #[tokio::test]
    async fn stylist_shift_narrows_the_branch_window() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        seed_stylist(&pool, "s1", "b1").await;
        set_branch_hours(&pool, "b1", 0, Some(t(9, 0)), Some(t(17, 0)), false)
            .await
            .unwrap();
        create_schedule_config(
            &pool,
            "b1",
            d(2026, 1, 1),
            &[ShiftInput {
                staff_id: "s1".into(),
                weekday: 0,
                start_time: t(11, 0),
                end_time: t(15, 0),
            }],
        )
        .await
        .unwrap();

        let day = generate_time_slots(&pool, "b1", Some("s1"), monday(), 60, far_now())
            .await
            .unwrap();
        assert_eq!(day.slots.first().unwrap().time, "11:00");
        assert_eq!(day.slots.last().unwrap().time, "14:00");

        // Without a stylist the branch window applies untouched.
        let day = generate_time_slots(&pool, "b1", None, monday(), 60, far_now())
            .await
            .unwrap();
        assert_eq!(day.slots.first().unwrap().time, "09:00");
    }
}
