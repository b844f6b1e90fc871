//! Age-priority ordering for coarse relative-age buckets.
//!
//! Maps labels like `"3 years ago"` to an approximate day count where lower
//! means more recent. The ordering is only good enough to pick candidate
//! anchors; it is never treated as a real timeline.

use std::sync::LazyLock;

use regex::Regex;

/// Priority for a bucket that is present but cannot be parsed.
pub const UNKNOWN_AGE_PRIORITY: u32 = 5000;

/// Priority for an empty bucket. Sorts after every unknown bucket.
pub const EMPTY_AGE_PRIORITY: u32 = 9999;

static RE_AGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+(year|month|day|hour)").unwrap());

/// Convert an age bucket into a day-equivalent priority.
///
/// Uses the first `<integer> <unit>` pair where the unit starts with
/// `hour`, `day`, `month` or `year` (case-insensitive, e.g. `"5 Months ago"`).
/// Hours collapse to 0.
pub fn age_priority(bucket: &str) -> u32 {
    if bucket.trim().is_empty() {
        return EMPTY_AGE_PRIORITY;
    }
    let lower = bucket.to_lowercase();
    let Some(caps) = RE_AGE.captures(&lower) else {
        return UNKNOWN_AGE_PRIORITY;
    };
    let per_unit = match &caps[2] {
        "year" => 365,
        "month" => 30,
        "day" => 1,
        _ => 0,
    };
    let magnitude: u32 = caps[1].parse().unwrap_or(u32::MAX);
    magnitude.saturating_mul(per_unit)
}

/// Priority for an optional bucket; an absent bucket counts as unknown.
pub fn bucket_priority(bucket: Option<&str>) -> u32 {
    bucket.map(age_priority).unwrap_or(UNKNOWN_AGE_PRIORITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_buckets() {
        assert_eq!(age_priority("3 years ago"), 1095);
        assert_eq!(age_priority("5 months ago"), 150);
        assert_eq!(age_priority("2 days ago"), 2);
        assert_eq!(age_priority("1 hour ago"), 0);
        assert_eq!(age_priority(""), 9999);
        assert_eq!(age_priority("banana"), 5000);
    }

    #[test]
    fn case_and_surrounding_text() {
        assert_eq!(age_priority("About 4 Years ago"), 1460);
        assert_eq!(age_priority("posted 12  days ago"), 12);
        assert_eq!(age_priority("1 year"), 365);
    }

    #[test]
    fn number_without_known_unit_is_unknown() {
        assert_eq!(age_priority("3 weeks ago"), UNKNOWN_AGE_PRIORITY);
        assert_eq!(age_priority("3years ago"), UNKNOWN_AGE_PRIORITY);
        assert_eq!(age_priority("an hour ago"), UNKNOWN_AGE_PRIORITY);
    }

    #[test]
    fn skips_to_first_matching_pair() {
        assert_eq!(age_priority("2 weeks, 3 days ago"), 3);
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert_eq!(age_priority("   "), EMPTY_AGE_PRIORITY);
    }

    #[test]
    fn unit_prefix_matches_plural_and_singular() {
        assert_eq!(age_priority("1 month ago"), 30);
        assert_eq!(age_priority("7 Hours ago"), 0);
        assert_eq!(age_priority("10 YEARS AGO"), 3650);
    }

    #[test]
    fn huge_magnitude_saturates() {
        assert_eq!(age_priority("99999999999 years ago"), u32::MAX);
    }

    #[test]
    fn absent_bucket_is_unknown() {
        assert_eq!(bucket_priority(None), UNKNOWN_AGE_PRIORITY);
        assert_eq!(bucket_priority(Some("5 months ago")), 150);
    }
}
