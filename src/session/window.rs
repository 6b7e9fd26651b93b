// src/session/window.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where "now" falls relative to an assessment's access window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    Upcoming,
    Active,
    Ended,
}

/// Evaluates the access window. Pure: no side effects, no clock reads.
///
/// Absent bounds do not constrain: with neither bound set the window is
/// always `Active`. Comparisons are on absolute instants.
pub fn evaluate(
    now: DateTime<Utc>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> WindowState {
    if let Some(start) = start_date {
        if now < start {
            return WindowState::Upcoming;
        }
    }
    if let Some(end) = end_date {
        if now > end {
            return WindowState::Ended;
        }
    }
    WindowState::Active
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn no_bounds_is_active() {
        assert_eq!(evaluate(t0(), None, None), WindowState::Active);
    }

    #[test]
    fn before_start_is_upcoming() {
        let start = t0() + Duration::days(1);
        assert_eq!(evaluate(t0(), Some(start), None), WindowState::Upcoming);
    }

    #[test]
    fn after_end_is_ended() {
        let end = t0() - Duration::hours(1);
        assert_eq!(evaluate(t0(), None, Some(end)), WindowState::Ended);
    }

    #[test]
    fn inside_both_bounds_is_active() {
        let start = t0() - Duration::hours(1);
        let end = t0() + Duration::hours(1);
        assert_eq!(evaluate(t0(), Some(start), Some(end)), WindowState::Active);
    }

    #[test]
    fn boundary_instants_are_active() {
        // now == start and now == end both count as inside the window.
        assert_eq!(evaluate(t0(), Some(t0()), None), WindowState::Active);
        assert_eq!(evaluate(t0(), None, Some(t0())), WindowState::Active);
    }
}
