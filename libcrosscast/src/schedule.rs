//! Schedule-time parsing
//!
//! Turns human-readable schedule expressions into absolute UTC times:
//!
//! - Relative durations: "1h", "30m", "2d"
//! - Natural language: "tomorrow", "next friday 10am"
//! - Random jitter windows: "random:10m-20m" (spaced from the previous
//!   scheduled post when one is given)

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::error::{CrosscastError, Result};

const MIN_RANDOM_SECONDS: i64 = 30;
const MAX_RANDOM_SECONDS: i64 = 30 * 24 * 3600;

/// Parse a schedule expression into an absolute time
///
/// `last_scheduled` anchors `random:` windows so consecutive queued posts
/// spread out instead of clustering around now.
///
/// # Errors
///
/// Returns `InvalidInput` when the expression cannot be parsed or a random
/// window is out of range.
pub fn parse_schedule(
    input: &str,
    last_scheduled: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>> {
    if input.is_empty() {
        return Err(CrosscastError::InvalidInput(
            "Schedule expression cannot be empty".to_string(),
        ));
    }

    if let Some(range) = input.strip_prefix("random:") {
        return parse_random_schedule(range, last_scheduled);
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(CrosscastError::InvalidInput(format!(
        "Could not parse schedule expression: {}",
        input
    )))
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input).map_err(|_| {
        CrosscastError::InvalidInput(format!("Could not parse duration: {}", input))
    })?;
    Duration::try_seconds(std_duration.as_secs() as i64)
        .ok_or_else(|| CrosscastError::InvalidInput("Duration out of range".to_string()))
}

fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| CrosscastError::InvalidInput(format!("Could not parse time: {}", e)))
}

/// Parse the "MIN-MAX" part of a random window
fn parse_random_schedule(
    range: &str,
    last_scheduled: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>> {
    let (min_str, max_str) = range.split_once('-').ok_or_else(|| {
        CrosscastError::InvalidInput("Random window must be MIN-MAX".to_string())
    })?;

    let min = parse_duration(min_str)?;
    let max = parse_duration(max_str)?;
    validate_random_range(min, max)?;

    let base = last_scheduled.unwrap_or_else(Utc::now);
    let offset = rand::thread_rng().gen_range(min.num_seconds()..=max.num_seconds());

    Ok(base + Duration::try_seconds(offset).unwrap_or(min))
}

fn validate_random_range(min: Duration, max: Duration) -> Result<()> {
    let min_secs = min.num_seconds();
    let max_secs = max.num_seconds();

    if min_secs < MIN_RANDOM_SECONDS {
        return Err(CrosscastError::InvalidInput(format!(
            "Minimum random interval must be at least {} seconds",
            MIN_RANDOM_SECONDS
        )));
    }

    if max_secs > MAX_RANDOM_SECONDS {
        return Err(CrosscastError::InvalidInput(format!(
            "Maximum random interval must be less than {} days",
            MAX_RANDOM_SECONDS / (24 * 3600)
        )));
    }

    if min_secs >= max_secs {
        return Err(CrosscastError::InvalidInput(
            "Minimum must be less than maximum".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_minutes() {
        let scheduled = parse_schedule("30m", None).unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!((29..=31).contains(&diff), "Expected ~30 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_duration_hours() {
        let scheduled = parse_schedule("2h", None).unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!((119..=121).contains(&diff), "Expected ~120 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_duration_days() {
        let scheduled = parse_schedule("1d", None).unwrap();
        let diff = (scheduled - Utc::now()).num_hours();
        assert!((23..=25).contains(&diff), "Expected ~24 hours, got {}", diff);
    }

    #[test]
    fn test_parse_tomorrow() {
        let scheduled = parse_schedule("tomorrow", None).unwrap();
        let diff = (scheduled - Utc::now()).num_hours();
        assert!((20..=28).contains(&diff), "Expected ~24 hours, got {}", diff);
    }

    #[test]
    fn test_parse_random_without_anchor() {
        let scheduled = parse_schedule("random:10m-20m", None).unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!((10..=20).contains(&diff), "Expected 10-20 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_random_anchored_to_last_scheduled() {
        let last = Utc::now() + Duration::hours(1);
        let scheduled = parse_schedule("random:10m-20m", Some(last)).unwrap();
        let diff = (scheduled - last).num_minutes();
        assert!(
            (10..=20).contains(&diff),
            "Expected 10-20 minutes after anchor, got {}",
            diff
        );
    }

    #[test]
    fn test_parse_random_mixed_units() {
        let scheduled = parse_schedule("random:30m-2h", None).unwrap();
        let diff = (scheduled - Utc::now()).num_minutes();
        assert!((30..=120).contains(&diff));
    }

    #[test]
    fn test_parse_empty_expression() {
        assert!(parse_schedule("", None).is_err());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_schedule("not a time", None).is_err());
    }

    #[test]
    fn test_parse_random_invalid_format() {
        assert!(parse_schedule("random:invalid", None).is_err());
    }

    #[test]
    fn test_parse_random_min_above_max() {
        assert!(parse_schedule("random:2h-1h", None).is_err());
    }

    #[test]
    fn test_parse_random_too_short() {
        assert!(parse_schedule("random:1s-10s", None).is_err());
    }

    #[test]
    fn test_parse_random_too_long() {
        assert!(parse_schedule("random:1d-40d", None).is_err());
    }
}
