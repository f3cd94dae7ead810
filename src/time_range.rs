//! Pure comparisons over timestamps and facility times of day.

use chrono::NaiveTime;
use thiserror::Error;

use crate::model::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time of day {0:?}: expected HH:MM")]
pub struct TimeError(pub String);

pub fn parse_time_of_day(hhmm: &str) -> Result<NaiveTime, TimeError> {
    NaiveTime::parse_from_str(hhmm.trim(), "%H:%M").map_err(|_| TimeError(hhmm.to_string()))
}

/// Place an `"HH:MM"` time of day on the calendar date of `reference`.
/// `Ok(None)` when the time is unset or blank.
pub fn project_time_of_day(
    hhmm: Option<&str>,
    reference: Timestamp,
) -> Result<Option<Timestamp>, TimeError> {
    let Some(hhmm) = hhmm.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let time = parse_time_of_day(hhmm)?;
    Ok(Some(reference.date().and_time(time)))
}

/// Closed-interval intersection of `a` and `b`. Back-to-back intervals
/// (`a_to == b_from`) conflict.
pub fn overlaps(a_from: Timestamp, a_to: Timestamp, b_from: Timestamp, b_to: Timestamp) -> bool {
    a_from <= b_to && b_from <= a_to
}

/// Inclusive containment of `point` in `[window_start, window_end]`.
pub fn within(point: Timestamp, window_start: Timestamp, window_end: Timestamp) -> bool {
    window_start <= point && point <= window_end
}
