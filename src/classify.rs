use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::fmt;

/// Health of a pipe as derived from its last run and its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeStatus {
    Ok,
    Failed,
    Over1h,
    Over24h,
}

impl PipeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipeStatus::Ok => "ok",
            PipeStatus::Failed => "failed",
            PipeStatus::Over1h => "over1h",
            PipeStatus::Over24h => "over24h",
        }
    }
}

impl fmt::Display for PipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a pipe. The first matching rule wins:
///
/// 1. no run yet (`success` absent) is `ok`
/// 2. a failed last run is `failed`
/// 3. a running pipe more than 24h (or 1h) past its scheduled run is `over24h` (or `over1h`)
/// 4. everything else is `ok`
///
/// An unparseable `next_run` is logged and treated as `ok`.
pub fn classify(
    success: Option<bool>,
    state: &str,
    next_run: Option<&str>,
    now: DateTime<Utc>,
) -> PipeStatus {
    match success {
        None => return PipeStatus::Ok,
        Some(false) => return PipeStatus::Failed,
        Some(true) => {}
    }

    if state != "running" {
        return PipeStatus::Ok;
    }

    let Some(raw) = next_run else {
        return PipeStatus::Ok;
    };

    let Some(next_run) = parse_timestamp(raw) else {
        log::warn!("Unparseable next-run timestamp '{}', assuming ok", raw);
        return PipeStatus::Ok;
    };

    if now > next_run + Duration::hours(24) {
        PipeStatus::Over24h
    } else if now > next_run + Duration::hours(1) {
        PipeStatus::Over1h
    } else {
        PipeStatus::Ok
    }
}

/// RFC 3339, or a zone-less ISO-8601 timestamp read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
