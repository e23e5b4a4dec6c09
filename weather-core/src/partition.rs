//! Object-store key layout for raw observations.
//!
//! `raw-data/{City_With_Underscores}/{YYYY}/{MM}/{DD}/{timestamp}.json`, all fields in UTC.

use chrono::{DateTime, Utc};

/// Top-level prefix for raw payloads.
pub const RAW_PREFIX: &str = "raw-data";

/// Timestamp format shared by keys and records. Whole seconds, no offset.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Render a fetch time the way keys and records store it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Spaces become underscores so a city maps to a single path segment.
pub fn city_segment(city: &str) -> String {
    city.trim().replace(' ', "_")
}

/// Key under which the raw payload for `city` fetched at `at` is stored.
pub fn raw_key(city: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}/{}.json",
        RAW_PREFIX,
        city_segment(city),
        at.format("%Y/%m/%d"),
        format_timestamp(at)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_raw_key_cape_town() {
        let at = Utc.with_ymd_and_hms(2025, 8, 17, 16, 40, 41).unwrap();
        assert_eq!(raw_key("Cape Town", at), "raw-data/Cape_Town/2025/08/17/2025-08-17T16:40:41.json");
    }

    #[test]
    fn test_raw_key_zero_padding() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 3, 4, 5).unwrap();
        assert_eq!(raw_key("Durban", at), "raw-data/Durban/2024/01/05/2024-01-05T03:04:05.json");
    }

    #[test]
    fn test_raw_key_drops_subseconds() {
        let at = Utc.with_ymd_and_hms(2025, 8, 17, 16, 40, 41).unwrap().with_nanosecond(123_456_789).unwrap();
        assert_eq!(format_timestamp(at), "2025-08-17T16:40:41");
        assert!(raw_key("Pretoria", at).ends_with("/2025-08-17T16:40:41.json"));
    }

    #[test]
    fn test_raw_key_uses_utc_date() {
        // 23:30 UTC on the 31st stays on the 31st regardless of the city's local date.
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 30, 0).unwrap();
        assert_eq!(raw_key("Johannesburg", at), "raw-data/Johannesburg/2025/12/31/2025-12-31T23:30:00.json");
    }

    #[test]
    fn test_raw_key_distinct_across_ticks() {
        let first = Utc.with_ymd_and_hms(2025, 8, 17, 16, 40, 41).unwrap();
        let next = first + chrono::TimeDelta::minutes(15);
        assert_ne!(raw_key("Cape Town", first), raw_key("Cape Town", next));
        assert_eq!(raw_key("Cape Town", first), raw_key("Cape Town", first));
    }

    #[test]
    fn test_city_segment() {
        assert_eq!(city_segment("Port Elizabeth North"), "Port_Elizabeth_North");
        assert_eq!(city_segment(" Durban "), "Durban");
    }
}
