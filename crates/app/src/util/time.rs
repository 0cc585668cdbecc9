use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Floors `ts` to a multiple of `granularity` since the epoch.
/// A non-positive granularity returns `ts` unchanged.
pub fn round_down(ts: DateTime<Utc>, granularity: Duration) -> DateTime<Utc> {
    let step = granularity.num_milliseconds();
    if step <= 0 {
        return ts;
    }
    let millis = ts.timestamp_millis();
    let floored = millis - millis.rem_euclid(step);
    DateTime::from_timestamp_millis(floored).unwrap_or(ts)
}

/// `[now - window, now]`.
pub fn trailing_window(now: DateTime<Utc>, window: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - window, now)
}

pub fn to_rfc3339_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("parse")
            .with_timezone(&Utc)
    }

    #[test]
    fn rounds_down_to_the_minute() {
        let rounded = round_down(ts("2025-03-01T08:14:59.999Z"), Duration::seconds(60));
        assert_eq!(rounded, ts("2025-03-01T08:14:00Z"));
    }

    #[test]
    fn exact_boundary_is_unchanged() {
        let value = ts("2025-03-01T08:15:00Z");
        assert_eq!(round_down(value, Duration::minutes(5)), value);
    }

    #[test]
    fn zero_granularity_keeps_timestamp() {
        let value = ts("2025-03-01T08:15:07.250Z");
        assert_eq!(round_down(value, Duration::zero()), value);
    }

    #[test]
    fn formats_with_millis_and_z() {
        assert_eq!(
            to_rfc3339_millis(ts("2025-03-01T08:15:07Z")),
            "2025-03-01T08:15:07.000Z"
        );
    }
}
