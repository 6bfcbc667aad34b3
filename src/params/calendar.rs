//! calendar arithmetic for the params resolver: turns a (month, year,
//! date_type) tuple into the explicit list of calendar dates the pipeline
//! should request service for. grounded on the teacher's date-handling style
//! in `date::date_ops` (NaiveDate iteration, Datelike-based weekday checks,
//! RoveError-wrapped parse failures) though the computation itself (listing
//! a month's days by weekday class) has no direct analogue in the teacher.

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::config::DateType;
use crate::error::RoveError;

/// returns every date in `year`-`month` whose weekday matches `date_type`.
///
/// `month` and `year` are taken as "MM" / "YYYY" strings per the external
/// interface in §6.
pub fn resolve_date_list(
    month: &str,
    year: &str,
    date_type: DateType,
) -> Result<Vec<NaiveDate>, RoveError> {
    let month_num: u32 = month
        .parse()
        .map_err(|_| RoveError::InvalidConfig(format!("invalid month value '{month}'")))?;
    let year_num: i32 = year
        .parse()
        .map_err(|_| RoveError::InvalidConfig(format!("invalid year value '{year}'")))?;

    let first = NaiveDate::from_ymd_opt(year_num, month_num, 1).ok_or_else(|| {
        RoveError::InvalidConfig(format!("'{year}-{month}' is not a valid year/month pair"))
    })?;

    let mut dates = Vec::new();
    let mut current = first;
    while current.month() == month_num {
        if date_type_matches(date_type, current.weekday()) {
            dates.push(current);
        }
        current = match current.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
    }

    if dates.is_empty() {
        return Err(RoveError::InvalidConfig(format!(
            "no dates of type {date_type:?} found in {year}-{month}"
        )));
    }
    Ok(dates)
}

fn date_type_matches(date_type: DateType, weekday: Weekday) -> bool {
    match date_type {
        DateType::Workday => !matches!(weekday, Weekday::Sat | Weekday::Sun),
        DateType::Saturday => weekday == Weekday::Sat,
        DateType::Sunday => weekday == Weekday::Sun,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_date_list_workdays_march_2022() {
        // March 2022 has 23 weekdays (Mon-Fri).
        let dates = resolve_date_list("03", "2022", DateType::Workday).unwrap();
        assert_eq!(dates.len(), 23);
        assert!(dates.iter().all(|d| !matches!(
            d.weekday(),
            Weekday::Sat | Weekday::Sun
        )));
    }

    #[test]
    fn test_resolve_date_list_saturdays_march_2022() {
        let dates = resolve_date_list("03", "2022", DateType::Saturday).unwrap();
        assert_eq!(dates.len(), 4);
        assert!(dates.iter().all(|d| d.weekday() == Weekday::Sat));
    }

    #[test]
    fn test_resolve_date_list_invalid_month() {
        let result = resolve_date_list("13", "2022", DateType::Workday);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_date_list_invalid_year_string() {
        let result = resolve_date_list("03", "abcd", DateType::Workday);
        assert!(result.is_err());
    }
}
