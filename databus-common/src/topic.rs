//! Topic name validation and filter matching.
//!
//! Topics are `/`-delimited. Subscriber filters may use MQTT-style
//! wildcards: `+` matches exactly one segment and `#` (last segment only)
//! matches any number of trailing segments, including none.

use crate::error::{Error, Result};

/// Single-segment wildcard.
pub const SINGLE_WILDCARD: &str = "+";

/// Multi-segment wildcard.
pub const MULTI_WILDCARD: &str = "#";

/// Validate a concrete topic name (no wildcards).
pub fn validate_name(name: &str) -> Result<()> {
    validate_segments(name)?;
    if name
        .split('/')
        .any(|s| s == SINGLE_WILDCARD || s == MULTI_WILDCARD)
    {
        return Err(Error::invalid_topic(
            name,
            "wildcards are only allowed in subscriber topics",
        ));
    }
    Ok(())
}

/// Validate a subscriber filter.
pub fn validate_filter(filter: &str) -> Result<()> {
    validate_segments(filter)?;
    let segments: Vec<&str> = filter.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.len() > 1 && (segment.contains('+') || segment.contains('#')) {
            return Err(Error::invalid_topic(
                filter,
                "wildcards must occupy a whole segment",
            ));
        }
        if *segment == MULTI_WILDCARD && i != segments.len() - 1 {
            return Err(Error::invalid_topic(
                filter,
                "'#' is only allowed as the last segment",
            ));
        }
    }
    Ok(())
}

/// Returns `true` if `filter` contains a wildcard segment.
pub fn is_wildcard(filter: &str) -> bool {
    filter
        .split('/')
        .any(|s| s == SINGLE_WILDCARD || s == MULTI_WILDCARD)
}

/// Check whether a concrete `topic` matches a subscriber `filter`.
///
/// # Example
/// ```
/// use databus_common::topic::topic_matches;
///
/// assert!(topic_matches("sm/+/temp", "sm/boiler/temp"));
/// assert!(topic_matches("sm/#", "sm/boiler/temp"));
/// assert!(!topic_matches("sm/+", "sm/boiler/temp"));
/// ```
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_segments = filter.split('/');
    let mut topic_segments = topic.split('/');

    loop {
        match (filter_segments.next(), topic_segments.next()) {
            (Some(MULTI_WILDCARD), _) => return true,
            (Some(SINGLE_WILDCARD), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn validate_segments(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_topic(name, "topic name must not be empty"));
    }
    if name.contains('\0') {
        return Err(Error::invalid_topic(name, "topic name must not contain NUL"));
    }
    if name.split('/').any(|s| s.trim().is_empty()) {
        return Err(Error::invalid_topic(
            name,
            "topic segments must not be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(topic_matches("sm/topic1", "sm/topic1"));
        assert!(!topic_matches("sm/topic1", "sm/topic2"));
        assert!(!topic_matches("sm/topic1", "sm/topic1/extra"));
        assert!(!topic_matches("sm/topic1/extra", "sm/topic1"));
    }

    #[test]
    fn test_single_wildcard() {
        assert!(topic_matches("+/topic1", "sm/topic1"));
        assert!(!topic_matches("sm/+", "sm"));
    }

    #[test]
    fn test_multi_wildcard_matches_parent() {
        assert!(topic_matches("sm/#", "sm"));
        assert!(topic_matches("#", "anything/at/all"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("sm/topic1").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("sm//topic1").is_err());
        assert!(validate_name("/sm").is_err());
        assert!(validate_name("sm/#").is_err());
    }

    #[test]
    fn test_validate_filter() {
        assert!(validate_filter("sm/+/x/#").is_ok());
        assert!(validate_filter("sm/#/x").is_err());
        assert!(validate_filter("sm/a+").is_err());
    }

    #[test]
    fn test_is_wildcard() {
        assert!(is_wildcard("sm/+"));
        assert!(!is_wildcard("sm/plus"));
    }
}
