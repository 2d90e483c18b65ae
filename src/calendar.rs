use crate::errors::{EngineError, EngineResult};
use chrono::{Datelike, NaiveDate, Weekday};

/// US equity trading-day conventions for time-to-expiry.
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Weekday that is not a fixed-date US market holiday.
/// Fixed-date holidays only; floating holidays are absorbed by the
/// 252-day year convention.
pub fn is_trading_day(date: NaiveDate) -> bool {
    if date.weekday() == Weekday::Sat || date.weekday() == Weekday::Sun {
        return false;
    }
    !matches!(
        (date.month(), date.day()),
        (1, 1) |   // New Year's Day
        (6, 19) |  // Juneteenth
        (7, 4) |   // Independence Day
        (12, 25) // Christmas Day
    )
}

/// Trading days in the half-open range (start, end].
pub fn trading_days_between(start: NaiveDate, end: NaiveDate) -> u32 {
    let mut count = 0;
    let mut date = start;
    while date < end {
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
        if is_trading_day(date) {
            count += 1;
        }
    }
    count
}

/// Time to expiry as a year fraction of trading days.
/// The expiry must be strictly after the valuation date; the tree needs
/// a positive tenor.
pub fn year_fraction(valuation: NaiveDate, expiry: NaiveDate) -> EngineResult<f64> {
    if expiry <= valuation {
        return Err(EngineError::InvalidParameter(format!(
            "expiry {expiry} is not after valuation date {valuation}"
        )));
    }
    let days = trading_days_between(valuation, expiry);
    if days == 0 {
        return Err(EngineError::InvalidParameter(format!(
            "no trading days between {valuation} and {expiry}"
        )));
    }
    Ok(f64::from(days) / TRADING_DAYS_PER_YEAR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekend_is_not_trading_day() {
        assert!(!is_trading_day(date(2026, 1, 10))); // Saturday
        assert!(!is_trading_day(date(2026, 1, 11))); // Sunday
        assert!(is_trading_day(date(2026, 1, 12))); // Monday
    }

    #[test]
    fn test_fixed_holidays() {
        assert!(!is_trading_day(date(2026, 1, 1)));
        assert!(!is_trading_day(date(2026, 6, 19)));
        assert!(!is_trading_day(date(2025, 12, 25)));
        assert!(is_trading_day(date(2026, 1, 2)));
    }

    #[test]
    fn test_friday_to_monday_is_one_trading_day() {
        let friday = date(2026, 2, 27);
        let monday = date(2026, 3, 2);
        assert_eq!(trading_days_between(friday, monday), 1);
    }

    #[test]
    fn test_full_week_is_five_trading_days() {
        assert_eq!(trading_days_between(date(2026, 2, 2), date(2026, 2, 9)), 5);
    }

    #[test]
    fn test_new_year_excluded_from_count() {
        // Dec 31 2025 (Wed) -> Jan 2 2026 (Fri): only Jan 2 counts.
        assert_eq!(trading_days_between(date(2025, 12, 31), date(2026, 1, 2)), 1);
    }

    #[test]
    fn test_year_fraction_single_day() {
        let t = year_fraction(date(2026, 2, 27), date(2026, 3, 2)).unwrap();
        assert!((t - 1.0 / 252.0).abs() < 1e-12);
    }

    #[test]
    fn test_year_fraction_rejects_past_expiry() {
        let err = year_fraction(date(2026, 3, 2), date(2026, 2, 27)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
        let err = year_fraction(date(2026, 3, 2), date(2026, 3, 2)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
    }

    #[test]
    fn test_year_fraction_rejects_weekend_only_span() {
        // Friday to Sunday: no trading days elapse.
        let err = year_fraction(date(2026, 2, 27), date(2026, 3, 1)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
    }
}
