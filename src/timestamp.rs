//! Normalization of the site's abbreviated timestamps.
//!
//! Feed and comment times are rendered in several short forms depending on
//! their age:
//! - `HH:MM` for today
//! - `今天 HH:MM` ("today")
//! - `MM-DD HH:MM` for the current year
//! - `YY-MM-DD HH:MM` or `YYYY-MM-DD HH:MM` for older items
//!
//! All of them are normalized to `YYYY-MM-DD HH:MM`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::HarvestError;

/// Output format for normalized timestamps.
pub const NORMALIZED_FORMAT: &str = "%Y-%m-%d %H:%M";

const TODAY_MARKER: &str = "今天";

/// Normalize a timestamp, resolving year-less and date-less forms against
/// `today`. Callers pass the local calendar date at the time the row was read.
///
/// # Errors
///
/// Returns `HarvestError::ParseMismatch` if the text is not one of the
/// recognised forms.
pub fn normalize_timestamp_on(raw: &str, today: NaiveDate) -> Result<String, HarvestError> {
    let mismatch = || HarvestError::ParseMismatch(raw.to_string());

    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix(TODAY_MARKER)
        .map_or(trimmed, str::trim_start);

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let (date, time) = match tokens.as_slice() {
        [time] => (today, *time),
        [date, time] => (parse_date(date, today).ok_or_else(mismatch)?, *time),
        _ => return Err(mismatch()),
    };
    let time = parse_time(time).ok_or_else(mismatch)?;

    Ok(NaiveDateTime::new(date, time)
        .format(NORMALIZED_FORMAT)
        .to_string())
}

fn parse_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts = token
        .split('-')
        .map(parse_component)
        .collect::<Option<Vec<u32>>>()?;

    match parts.as_slice() {
        [month, day] => NaiveDate::from_ymd_opt(today.year(), *month, *day),
        [year, month, day] => {
            let year = if *year < 100 { 2000 + year } else { *year };
            NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, *month, *day)
        }
        _ => None,
    }
}

fn parse_time(token: &str) -> Option<NaiveTime> {
    let (hour, minute) = token.split_once(':')?;
    NaiveTime::from_hms_opt(parse_component(hour)?, parse_component(minute)?, 0)
}

fn parse_component(part: &str) -> Option<u32> {
    if part.is_empty() || part.len() > 4 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_year_prefixed() {
        assert_eq!(
            normalize_timestamp_on("23-11-05 14:07", today()).unwrap(),
            "2023-11-05 14:07"
        );
        assert_eq!(
            normalize_timestamp_on("2022-1-5 9:03", today()).unwrap(),
            "2022-01-05 09:03"
        );
    }

    #[test]
    fn test_month_day_uses_current_year() {
        assert_eq!(
            normalize_timestamp_on("11-5 14:07", today()).unwrap(),
            "2024-11-05 14:07"
        );
    }

    #[test]
    fn test_time_only_uses_today() {
        assert_eq!(
            normalize_timestamp_on("8:30", today()).unwrap(),
            "2024-03-09 08:30"
        );
        assert_eq!(
            normalize_timestamp_on("今天 21:15", today()).unwrap(),
            "2024-03-09 21:15"
        );
    }

    #[test]
    fn test_wrong_token_count_is_mismatch() {
        let err = normalize_timestamp_on("23-11-05 14:07 extra", today()).unwrap_err();
        assert!(matches!(err, HarvestError::ParseMismatch(_)));
        assert!(matches!(
            normalize_timestamp_on("", today()),
            Err(HarvestError::ParseMismatch(_))
        ));
    }

    #[test]
    fn test_out_of_range_is_mismatch() {
        assert!(normalize_timestamp_on("23-13-05 14:07", today()).is_err());
        assert!(normalize_timestamp_on("23-11-05 25:07", today()).is_err());
        assert!(normalize_timestamp_on("1-2-3-4 14:07", today()).is_err());
        assert!(normalize_timestamp_on("ab-cd 14:07", today()).is_err());
    }
}
