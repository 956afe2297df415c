use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::model::{Recurrence, TodoReminder};

/// Time-of-day assumed when a task has a due date but no due time.
pub fn default_due_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).expect("09:00 is a valid time")
}

pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Accepts `HH:MM` and `HH:MM:SS`; anything else is treated as absent.
pub fn parse_due_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .ok()
}

/// Compute the trigger instant of the current occurrence, if any.
///
/// Pure over `(todo, now)` in local wall-clock space. Returns `None` when
/// the entity does not notify, is completed, has no due date, the recurrence
/// predicate does not hold for `now`'s date, or a stored date/time string is
/// malformed. Parse failures fail closed on purpose: a panic here would halt
/// evaluation for every other entity in the same pass.
pub fn resolve_trigger(todo: &TodoReminder, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if !todo.notify || todo.completed {
        return None;
    }
    let due_date = parse_due_date(todo.due_date.as_deref()?)?;
    let due_time = match todo.due_time.as_deref() {
        Some(raw) => parse_due_time(raw)?,
        None => default_due_time(),
    };

    let occurrence_date = match todo.recurrence {
        // The one occurrence is fixed; staleness is the poll loop's problem.
        Recurrence::None => due_date,
        Recurrence::Daily => now.date(),
        Recurrence::Weekly => {
            if now.date().weekday() != due_date.weekday() {
                return None;
            }
            now.date()
        }
        Recurrence::Monthly => {
            if now.date().day() != due_date.day() {
                return None;
            }
            now.date()
        }
    };

    let occurrence = occurrence_date.and_time(due_time);
    Some(occurrence - Duration::minutes(todo.notify_before.lead_minutes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotifyBefore;

    fn todo(due_date: &str, due_time: Option<&str>) -> TodoReminder {
        TodoReminder {
            id: "t1".into(),
            user_id: "u1".into(),
            title: "Stretch".into(),
            notify: true,
            due_date: Some(due_date.into()),
            due_time: due_time.map(str::to_string),
            recurrence: Recurrence::None,
            notify_before: NotifyBefore::AtTime,
            completed: false,
            notification_sent: false,
        }
    }

    fn at(date: &str, time: &str) -> NaiveDateTime {
        let d = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        let t = NaiveTime::parse_from_str(time, "%H:%M").unwrap();
        d.and_time(t)
    }

    #[test]
    fn one_shot_trigger_ignores_now() {
        let task = todo("2024-03-01", Some("09:00"));
        let expected = at("2024-03-01", "09:00");
        assert_eq!(resolve_trigger(&task, at("2024-02-01", "12:00")), Some(expected));
        assert_eq!(resolve_trigger(&task, at("2024-03-01", "08:00")), Some(expected));
        assert_eq!(resolve_trigger(&task, at("2024-06-30", "23:59")), Some(expected));
    }

    #[test]
    fn notify_off_or_completed_yields_none() {
        let mut task = todo("2024-03-01", Some("09:00"));
        task.notify = false;
        assert_eq!(resolve_trigger(&task, at("2024-03-01", "09:00")), None);

        let mut task = todo("2024-03-01", Some("09:00"));
        task.completed = true;
        assert_eq!(resolve_trigger(&task, at("2024-03-01", "09:00")), None);

        let mut task = todo("2024-03-01", Some("09:00"));
        task.due_date = None;
        assert_eq!(resolve_trigger(&task, at("2024-03-01", "09:00")), None);
    }

    #[test]
    fn missing_due_time_defaults_to_nine() {
        let task = todo("2024-03-01", None);
        assert_eq!(
            resolve_trigger(&task, at("2024-03-01", "08:00")),
            Some(at("2024-03-01", "09:00"))
        );
    }

    #[test]
    fn malformed_strings_fail_closed() {
        let task = todo("not-a-date", Some("09:00"));
        assert_eq!(resolve_trigger(&task, at("2024-03-01", "09:00")), None);

        let task = todo("2024-03-01", Some("25:99"));
        assert_eq!(resolve_trigger(&task, at("2024-03-01", "09:00")), None);

        let task = todo("2024-03-01", Some("soon"));
        assert_eq!(resolve_trigger(&task, at("2024-03-01", "09:00")), None);
    }

    #[test]
    fn daily_uses_todays_date() {
        let mut task = todo("2024-03-01", Some("07:30"));
        task.recurrence = Recurrence::Daily;
        assert_eq!(
            resolve_trigger(&task, at("2024-05-20", "06:00")),
            Some(at("2024-05-20", "07:30"))
        );
    }

    #[test]
    fn weekly_fires_only_on_matching_weekday() {
        // 2024-03-01 is a Friday.
        let mut task = todo("2024-03-01", Some("18:00"));
        task.recurrence = Recurrence::Weekly;

        // 2024-03-08 is the following Friday.
        assert_eq!(
            resolve_trigger(&task, at("2024-03-08", "12:00")),
            Some(at("2024-03-08", "18:00"))
        );
        // 2024-03-09 is a Saturday.
        assert_eq!(resolve_trigger(&task, at("2024-03-09", "12:00")), None);
    }

    #[test]
    fn monthly_on_the_31st_skips_short_months() {
        let mut task = todo("2024-01-31", Some("10:00"));
        task.recurrence = Recurrence::Monthly;

        // April has 30 days; no day-of-month ever matches.
        for day in 1..=30 {
            let now = NaiveDate::from_ymd_opt(2024, 4, day)
                .unwrap()
                .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap());
            assert_eq!(resolve_trigger(&task, now), None);
        }
        // May has a 31st.
        assert_eq!(
            resolve_trigger(&task, at("2024-05-31", "09:00")),
            Some(at("2024-05-31", "10:00"))
        );
    }

    #[test]
    fn lead_time_shifts_trigger_backwards() {
        let mut task = todo("2024-03-01", Some("14:00"));
        task.notify_before = NotifyBefore::Hour1;
        assert_eq!(
            resolve_trigger(&task, at("2024-03-01", "12:00")),
            Some(at("2024-03-01", "13:00"))
        );

        let mut task = todo("2024-03-02", Some("09:00"));
        task.notify_before = NotifyBefore::Day1;
        assert_eq!(
            resolve_trigger(&task, at("2024-03-01", "08:00")),
            Some(at("2024-03-01", "09:00"))
        );
    }

    #[test]
    fn ten_minute_lead_matches_documented_scenario() {
        let mut task = todo("2024-03-01", Some("09:00"));
        task.notify_before = NotifyBefore::Min10;
        assert_eq!(
            resolve_trigger(&task, at("2024-03-01", "08:50")),
            Some(at("2024-03-01", "08:50"))
        );
    }
}
