use chrono::{DateTime, Local, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current local wall-clock time. All due-date arithmetic happens in this
/// space; UTC only appears at the epoch-millisecond edge.
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Convert a local wall-clock instant to epoch milliseconds.
///
/// DST gaps and folds resolve to the earliest plausible instant so marker
/// keys stay stable across evaluators in the same timezone.
pub fn local_to_ms(naive: NaiveDateTime) -> i64 {
    let local: DateTime<Local> = match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(a, _b) => a,
        LocalResult::None => Local
            .offset_from_utc_datetime(&naive)
            .fix()
            .from_utc_datetime(&naive)
            .with_timezone(&Local),
    };
    local.timestamp_millis()
}
