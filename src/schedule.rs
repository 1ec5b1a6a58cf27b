use chrono::{Datelike, NaiveDate, NaiveTime};
use sqlx::SqlitePool;

use crate::auth::new_id;
use crate::error::{AppError, AppResult};
use crate::models::{
    BranchHoursRow, CalendarEntryRow, ScheduleConfigRow, ScheduleShiftRow, ShiftOverrideRow,
    ENTRY_CLOSURE, ENTRY_HOLIDAY, ENTRY_SPECIAL_HOURS,
};

/// Weekdays are stored 0 = Monday .. 6 = Sunday.
pub fn weekday_index(date: NaiveDate) -> i64 {
    i64::from(date.weekday().num_days_from_monday())
}

pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

/// The configuration in force on `date`: the one with the latest start date
/// that is <= `date`. Inactive configurations still qualify: selection is
/// by effective date, not by creation order or the active flag.
pub async fn applicable_config(
    pool: &SqlitePool,
    branch_id: &str,
    date: NaiveDate,
) -> AppResult<Option<ScheduleConfigRow>> {
    let row = sqlx::query_as::<_, ScheduleConfigRow>(
        r#"SELECT id, branch_id, start_date, active, created_at
           FROM schedule_configs
           WHERE branch_id = ? AND start_date <= ?
           ORDER BY start_date DESC
           LIMIT 1"#,
    )
    .bind(branch_id)
    .bind(date)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

async fn weekly_shift(
    pool: &SqlitePool,
    config_id: &str,
    staff_id: &str,
    weekday: i64,
) -> AppResult<Option<ScheduleShiftRow>> {
    let row = sqlx::query_as::<_, ScheduleShiftRow>(
        r#"SELECT config_id, staff_id, weekday, start_time, end_time
           FROM schedule_shifts
           WHERE config_id = ? AND staff_id = ? AND weekday = ?"#,
    )
    .bind(config_id)
    .bind(staff_id)
    .bind(weekday)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

async fn shift_override(
    pool: &SqlitePool,
    staff_id: &str,
    date: NaiveDate,
) -> AppResult<Option<ShiftOverrideRow>> {
    let row = sqlx::query_as::<_, ShiftOverrideRow>(
        r#"SELECT id, staff_id, date, start_time, end_time, day_off
           FROM shift_overrides
           WHERE staff_id = ? AND date = ?"#,
    )
    .bind(staff_id)
    .bind(date)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Resolution of a stylist's working window for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StylistWindow {
    /// A date-specific override or a weekly shift applies.
    Window(NaiveTime, NaiveTime),
    /// A date-specific override marks the stylist off for the day.
    DayOff,
    /// No shift is configured; callers fall back to branch hours.
    Unscheduled,
}

/// Date-specific overrides win over the applicable weekly configuration.
pub async fn stylist_window(
    pool: &SqlitePool,
    branch_id: &str,
    stylist_id: &str,
    date: NaiveDate,
) -> AppResult<StylistWindow> {
    if let Some(ov) = shift_override(pool, stylist_id, date).await? {
        if ov.day_off != 0 {
            return Ok(StylistWindow::DayOff);
        }
        if let (Some(start), Some(end)) = (ov.start_time, ov.end_time) {
            return Ok(StylistWindow::Window(start, end));
        }
    }

    if let Some(config) = applicable_config(pool, branch_id, date).await? {
        if let Some(shift) =
            weekly_shift(pool, &config.id, stylist_id, weekday_index(date)).await?
        {
            return Ok(StylistWindow::Window(shift.start_time, shift.end_time));
        }
    }

    Ok(StylistWindow::Unscheduled)
}

/// Branch operating hours for one weekday; `None` when the day is marked
/// closed or no record exists.
pub async fn branch_window(
    pool: &SqlitePool,
    branch_id: &str,
    weekday: i64,
) -> AppResult<Option<(NaiveTime, NaiveTime)>> {
    let row = sqlx::query_as::<_, BranchHoursRow>(
        r#"SELECT branch_id, weekday, open_time, close_time, closed
           FROM branch_hours
           WHERE branch_id = ? AND weekday = ?"#,
    )
    .bind(branch_id)
    .bind(weekday)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|hours| {
        if hours.closed != 0 {
            return None;
        }
        match (hours.open_time, hours.close_time) {
            (Some(open), Some(close)) => Some((open, close)),
            _ => None,
        }
    }))
}

pub async fn set_branch_hours(
    pool: &SqlitePool,
    branch_id: &str,
    weekday: i64,
    open_time: Option<NaiveTime>,
    close_time: Option<NaiveTime>,
    closed: bool,
) -> AppResult<()> {
    if !(0..=6).contains(&weekday) {
        return Err(AppError::validation("Weekday must be between 0 and 6."));
    }
    sqlx::query(
        r#"INSERT INTO branch_hours (branch_id, weekday, open_time, close_time, closed)
           VALUES (?, ?, ?, ?, ?)
           ON CONFLICT(branch_id, weekday) DO UPDATE SET
             open_time = excluded.open_time,
             close_time = excluded.close_time,
             closed = excluded.closed"#,
    )
    .bind(branch_id)
    .bind(weekday)
    .bind(open_time)
    .bind(close_time)
    .bind(closed as i64)
    .execute(pool)
    .await?;
    Ok(())
}

pub struct ShiftInput {
    pub staff_id: String,
    pub weekday: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

pub async fn create_schedule_config(
    pool: &SqlitePool,
    branch_id: &str,
    start_date: NaiveDate,
    shifts: &[ShiftInput],
) -> AppResult<String> {
    for shift in shifts {
        if !(0..=6).contains(&shift.weekday) {
            return Err(AppError::validation("Weekday must be between 0 and 6."));
        }
        if shift.start_time >= shift.end_time {
            return Err(AppError::validation("Shift start must be before shift end."));
        }
    }

    let config_id = new_id();
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"INSERT INTO schedule_configs (id, branch_id, start_date, active, created_at)
           VALUES (?, ?, ?, 1, ?)"#,
    )
    .bind(&config_id)
    .bind(branch_id)
    .bind(start_date)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;

    for shift in shifts {
        sqlx::query(
            r#"INSERT INTO schedule_shifts (config_id, staff_id, weekday, start_time, end_time)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&config_id)
        .bind(&shift.staff_id)
        .bind(shift.weekday)
        .bind(shift.start_time)
        .bind(shift.end_time)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(config_id)
}

pub async fn set_shift_override(
    pool: &SqlitePool,
    staff_id: &str,
    date: NaiveDate,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    day_off: bool,
) -> AppResult<String> {
    if !day_off {
        match (start_time, end_time) {
            (Some(start), Some(end)) if start < end => {}
            _ => {
                return Err(AppError::validation(
                    "An override needs a valid start and end time, or the day-off flag.",
                ))
            }
        }
    }
    // RETURNING yields the stored row's id; on the update path that is the
    // existing id, not the freshly generated one.
    let id: String = sqlx::query_scalar(
        r#"INSERT INTO shift_overrides (id, staff_id, date, start_time, end_time, day_off)
           VALUES (?, ?, ?, ?, ?, ?)
           ON CONFLICT(staff_id, date) DO UPDATE SET
             start_time = excluded.start_time,
             end_time = excluded.end_time,
             day_off = excluded.day_off
           RETURNING id"#,
    )
    .bind(new_id())
    .bind(staff_id)
    .bind(date)
    .bind(start_time)
    .bind(end_time)
    .bind(day_off as i64)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Active calendar entries for one branch and date. Entries are active by
/// default and only disappear through explicit deletion.
pub async fn calendar_entries_for(
    pool: &SqlitePool,
    branch_id: &str,
    date: NaiveDate,
) -> AppResult<Vec<CalendarEntryRow>> {
    let rows = sqlx::query_as::<_, CalendarEntryRow>(
        r#"SELECT id, branch_id, date, title, description, entry_type, start_time,
                  end_time, status, created_by, created_at
           FROM calendar_entries
           WHERE branch_id = ? AND date = ? AND status = 'active'
           ORDER BY created_at"#,
    )
    .bind(branch_id)
    .bind(date)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn create_calendar_entry(
    pool: &SqlitePool,
    branch_id: &str,
    date: NaiveDate,
    title: &str,
    description: Option<&str>,
    entry_type: &str,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    created_by: Option<&str>,
) -> AppResult<String> {
    if title.trim().is_empty() {
        return Err(AppError::validation("A calendar entry needs a title."));
    }
    const TYPES: [&str; 4] = [
        crate::models::ENTRY_REMINDER,
        ENTRY_HOLIDAY,
        ENTRY_CLOSURE,
        ENTRY_SPECIAL_HOURS,
    ];
    if !TYPES.contains(&entry_type) {
        return Err(AppError::validation("Unknown calendar entry type."));
    }
    if entry_type == ENTRY_SPECIAL_HOURS {
        match (start_time, end_time) {
            (Some(start), Some(end)) if start < end => {}
            _ => {
                return Err(AppError::validation(
                    "Special hours need a valid start and end time.",
                ))
            }
        }
    }

    let id = new_id();
    sqlx::query(
        r#"INSERT INTO calendar_entries
           (id, branch_id, date, title, description, entry_type, start_time, end_time,
            status, created_by, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)"#,
    )
    .bind(&id)
    .bind(branch_id)
    .bind(date)
    .bind(title.trim())
    .bind(description)
    .bind(entry_type)
    .bind(start_time)
    .bind(end_time)
    .bind(created_by)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn delete_calendar_entry(pool: &SqlitePool, entry_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM calendar_entries WHERE id = ?")
        .bind(entry_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Calendar entry"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;

    async fn seed_branch(pool: &SqlitePool, id: &str) {
        sqlx::query(
            "INSERT INTO branches (id, name, country_code, created_at) VALUES (?, ?, 'US', '')",
        )
        .bind(id)
        .bind("Test Branch")
        .execute(pool)
        .await
        .unwrap();
    }

    async fn seed_stylist(pool: &SqlitePool, id: &str, branch_id: &str) {
        sqlx::query(
            r#"INSERT INTO users (id, username, display_name, role, branch_id, password_hash, active, created_at)
               VALUES (?, ?, ?, 'stylist', ?, 'x', 1, '')"#,
        )
        .bind(id)
        .bind(format!("user-{id}"))
        .bind("Stylist")
        .bind(branch_id)
        .execute(pool)
        .await
        .unwrap();
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn applicable_config_picks_latest_start_date_not_latest_created() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        seed_stylist(&pool, "s1", "b1").await;

        // Created later but effective earlier.
        let older = create_schedule_config(
            &pool,
            "b1",
            d(2026, 1, 1),
            &[ShiftInput {
                staff_id: "s1".into(),
                weekday: 0,
                start_time: t(8, 0),
                end_time: t(14, 0),
            }],
        )
        .await
        .unwrap();
        let newer = create_schedule_config(
            &pool,
            "b1",
            d(2026, 2, 1),
            &[ShiftInput {
                staff_id: "s1".into(),
                weekday: 0,
                start_time: t(10, 0),
                end_time: t(18, 0),
            }],
        )
        .await
        .unwrap();
        // Deactivate the newer config; it must still win by effective date.
        sqlx::query("UPDATE schedule_configs SET active = 0 WHERE id = ?")
            .bind(&newer)
            .execute(&pool)
            .await
            .unwrap();

        let config = applicable_config(&pool, "b1", d(2026, 3, 1)).await.unwrap().unwrap();
        assert_eq!(config.id, newer);

        let config = applicable_config(&pool, "b1", d(2026, 1, 15)).await.unwrap().unwrap();
        assert_eq!(config.id, older);

        assert!(applicable_config(&pool, "b1", d(2025, 12, 31))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn override_beats_weekly_shift() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        seed_stylist(&pool, "s1", "b1").await;

        create_schedule_config(
            &pool,
            "b1",
            d(2026, 1, 1),
            &[ShiftInput {
                staff_id: "s1".into(),
                weekday: 0, // Monday
                start_time: t(9, 0),
                end_time: t(17, 0),
            }],
        )
        .await
        .unwrap();

        // 2026-03-02 is a Monday.
        let monday = d(2026, 3, 2);
        assert_eq!(
            stylist_window(&pool, "b1", "s1", monday).await.unwrap(),
            StylistWindow::Window(t(9, 0), t(17, 0))
        );

        set_shift_override(&pool, "s1", monday, Some(t(12, 0)), Some(t(16, 0)), false)
            .await
            .unwrap();
        assert_eq!(
            stylist_window(&pool, "b1", "s1", monday).await.unwrap(),
            StylistWindow::Window(t(12, 0), t(16, 0))
        );

        set_shift_override(&pool, "s1", monday, None, None, true)
            .await
            .unwrap();
        assert_eq!(
            stylist_window(&pool, "b1", "s1", monday).await.unwrap(),
            StylistWindow::DayOff
        );

        // Tuesday has no shift at all.
        assert_eq!(
            stylist_window(&pool, "b1", "s1", d(2026, 3, 3)).await.unwrap(),
            StylistWindow::Unscheduled
        );
    }

    #[tokio::test]
    async fn override_upsert_returns_the_stored_row_id() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;
        seed_stylist(&pool, "s1", "b1").await;

        let monday = d(2026, 3, 2);
        let first = set_shift_override(&pool, "s1", monday, Some(t(9, 0)), Some(t(13, 0)), false)
            .await
            .unwrap();
        let second = set_shift_override(&pool, "s1", monday, Some(t(12, 0)), Some(t(16, 0)), false)
            .await
            .unwrap();
        assert_eq!(first, second);

        // The update itself still lands.
        assert_eq!(
            stylist_window(&pool, "b1", "s1", monday).await.unwrap(),
            StylistWindow::Window(t(12, 0), t(16, 0))
        );
    }

    #[tokio::test]
    async fn branch_window_respects_closed_flag() {
        let pool = test_pool().await;
        seed_branch(&pool, "b1").await;

        set_branch_hours(&pool, "b1", 0, Some(t(9, 0)), Some(t(17, 0)), false)
            .await
            .unwrap();
        set_branch_hours(&pool, "b1", 6, None, None, true).await.unwrap();

        assert_eq!(
            branch_window(&pool, "b1", 0).await.unwrap(),
            Some((t(9, 0), t(17, 0)))
        );
        assert_eq!(branch_window(&pool, "b1", 6).await.unwrap(), None);
        assert_eq!(branch_window(&pool, "b1", 3).await.unwrap(), None);
    }
}
