use chrono::{DateTime, Utc};

const YEAR_SECS: i64 = 31_536_000;
const MONTH_SECS: i64 = 2_592_000;
const DAY_SECS: i64 = 86_400;
const HOUR_SECS: i64 = 3_600;
const MINUTE_SECS: i64 = 60;

/// Coarse relative age of `instant` as seen from `now`: `3y`, `2mo`, `5d`,
/// `2h`, `14m`, or `Just now`. A display approximation, not calendar
/// arithmetic; instants in the future degrade to `Just now`.
pub fn format(instant: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - instant).num_seconds();
    if elapsed >= YEAR_SECS {
        format!("{}y", elapsed / YEAR_SECS)
    } else if elapsed >= MONTH_SECS {
        format!("{}mo", elapsed / MONTH_SECS)
    } else if elapsed >= DAY_SECS {
        format!("{}d", elapsed / DAY_SECS)
    } else if elapsed >= HOUR_SECS {
        format!("{}h", elapsed / HOUR_SECS)
    } else if elapsed >= MINUTE_SECS {
        format!("{}m", elapsed / MINUTE_SECS)
    } else {
        "Just now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn two_hours_not_minutes() {
        let at = now();
        assert_eq!(format(at - Duration::seconds(7265), at), "2h");
    }

    #[test]
    fn under_a_minute_is_just_now() {
        let at = now();
        assert_eq!(format(at - Duration::seconds(30), at), "Just now");
        assert_eq!(format(at, at), "Just now");
    }

    #[test]
    fn future_instants_degrade_to_just_now() {
        let at = now();
        assert_eq!(format(at + Duration::seconds(500), at), "Just now");
    }

    #[test]
    fn band_boundaries_truncate() {
        let at = now();
        assert_eq!(format(at - Duration::seconds(MINUTE_SECS), at), "1m");
        assert_eq!(format(at - Duration::seconds(HOUR_SECS - 1), at), "59m");
        assert_eq!(format(at - Duration::seconds(DAY_SECS * 3 + 5), at), "3d");
        assert_eq!(format(at - Duration::seconds(MONTH_SECS * 2), at), "2mo");
        assert_eq!(format(at - Duration::seconds(YEAR_SECS + 1), at), "1y");
    }
}
