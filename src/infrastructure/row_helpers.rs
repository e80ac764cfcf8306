use crate::infrastructure::error::PlannerError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

pub fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>, PlannerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| PlannerError::Internal(format!("invalid {field} '{value}': {error}")))
}

pub fn parse_opt_timestamp(
    value: Option<&str>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, PlannerError> {
    value.map(|raw| parse_timestamp(raw, field)).transpose()
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate, PlannerError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|error| PlannerError::Internal(format!("invalid {field} '{value}': {error}")))
}

pub fn parse_time(value: &str, field: &str) -> Result<NaiveTime, PlannerError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|error| PlannerError::Internal(format!("invalid {field} '{value}': {error}")))
}

/// `?1, ?2, ..` placeholder list for dynamic `IN` clauses.
pub fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered() {
        assert_eq!(placeholders(3), "?1, ?2, ?3");
        assert_eq!(placeholders(0), "");
    }

    #[test]
    fn timestamp_parse_round_trips_rfc3339() {
        let now = Utc::now();
        let parsed = parse_timestamp(&now.to_rfc3339(), "test").expect("parse");
        assert_eq!(parsed, now);
    }

    #[test]
    fn bad_stored_values_are_internal_errors() {
        assert!(parse_timestamp("yesterday", "test").is_err());
        assert!(parse_date("03/02/2026", "test").is_err());
        assert!(parse_time("9am", "test").is_err());
    }
}
