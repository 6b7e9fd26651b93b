// src/session/clock.rs

use chrono::{DateTime, Duration, Utc};

use crate::models::assessment::Assessment;

/// Computes the wall-clock deadline of an attempt.
///
/// Fixed-duration mode wins over the window bound: a 60-minute assessment
/// grants the full 60 minutes even if `end_date` is later. Without a
/// duration the attempt runs until `end_date`. With neither, a hard cap
/// applies so no attempt is ever unbounded.
///
/// Remaining time is always recomputed from this instant, never from
/// accumulated ticks, so missed ticks (suspended tabs, stolen focus)
/// cannot introduce drift.
pub fn deadline(
    started_at: DateTime<Utc>,
    assessment: &Assessment,
    cap_minutes: i64,
) -> DateTime<Utc> {
    if let Some(minutes) = assessment.duration_minutes {
        return started_at + Duration::minutes(i64::from(minutes));
    }
    if let Some(end) = assessment.end_date {
        return end;
    }
    started_at + Duration::minutes(cap_minutes)
}

/// Seconds left until `deadline`, saturating at zero.
pub fn remaining_seconds(now: DateTime<Utc>, deadline: DateTime<Utc>) -> i64 {
    (deadline - now).num_seconds().max(0)
}

/// True once the deadline has passed and the attempt must be finalized
/// through the timeout path.
pub fn is_expired(now: DateTime<Utc>, deadline: DateTime<Utc>) -> bool {
    remaining_seconds(now, deadline) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(duration: Option<i32>, end: Option<DateTime<Utc>>) -> Assessment {
        Assessment {
            id: 1,
            name: "Unit Test".to_string(),
            branch: String::new(),
            kind: "quiz".to_string(),
            start_date: None,
            end_date: end,
            duration_minutes: duration,
            scoring_policy: "proportional".to_string(),
            is_active: true,
            created_by: None,
            created_at: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn fixed_duration_ignores_end_date() {
        let later_end = t0() + Duration::hours(10);
        let d = deadline(t0(), &assessment(Some(60), Some(later_end)), 180);
        assert_eq!(d, t0() + Duration::minutes(60));
    }

    #[test]
    fn window_bound_uses_end_date() {
        let end = t0() + Duration::minutes(45);
        let d = deadline(t0(), &assessment(None, Some(end)), 180);
        assert_eq!(d, end);
    }

    #[test]
    fn unbounded_gets_hard_cap() {
        let d = deadline(t0(), &assessment(None, None), 180);
        assert_eq!(d, t0() + Duration::minutes(180));
    }

    #[test]
    fn countdown_reaches_zero_exactly_at_the_hour() {
        let d = deadline(t0(), &assessment(Some(60), None), 180);

        let almost = t0() + Duration::minutes(59) + Duration::seconds(59);
        assert_eq!(remaining_seconds(almost, d), 1);
        assert!(!is_expired(almost, d));

        let exact = t0() + Duration::minutes(60);
        assert_eq!(remaining_seconds(exact, d), 0);
        assert!(is_expired(exact, d));
    }

    #[test]
    fn remaining_saturates_after_deadline() {
        let d = t0();
        assert_eq!(remaining_seconds(t0() + Duration::hours(2), d), 0);
    }
}
