//! Calendar-rule cash deposit schedules.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::Deserialize;

use crate::error::{AipError, AipResult};
use crate::types::CashDeposits;

/// Spacing between scheduled deposits.
///
/// Parsed from `"<n>d"`, `"<n>w"`, `"<n>mo"`, `"<n>q"` or `"<n>y"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DepositInterval {
    Days(u32),
    Weeks(u32),
    Months(u32),
}

impl DepositInterval {
    /// The `k`-th scheduled date counted from `start`.
    ///
    /// Month steps are always taken from `start`, so a schedule starting on
    /// the 31st lands on each month's last day rather than drifting.
    fn nth(&self, start: NaiveDate, k: u32) -> Option<NaiveDate> {
        match *self {
            DepositInterval::Days(n) => {
                start.checked_add_days(Days::new(u64::from(n) * u64::from(k)))
            }
            DepositInterval::Weeks(n) => {
                start.checked_add_days(Days::new(7 * u64::from(n) * u64::from(k)))
            }
            DepositInterval::Months(n) => start.checked_add_months(Months::new(n.checked_mul(k)?)),
        }
    }
}

impl FromStr for DepositInterval {
    type Err = AipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| AipError::Validation(format!("interval {:?} has no unit", s)))?;
        let (count, unit) = s.split_at(split);
        let count: u32 = count
            .parse()
            .map_err(|_| AipError::Validation(format!("interval {:?} has no count", s)))?;
        if count == 0 {
            return Err(AipError::Validation(format!(
                "interval {:?} must be at least 1",
                s
            )));
        }

        match unit {
            "d" => Ok(DepositInterval::Days(count)),
            "w" => Ok(DepositInterval::Weeks(count)),
            "mo" => Ok(DepositInterval::Months(count)),
            "q" => months(count, 3, &s),
            "y" => months(count, 12, &s),
            other => Err(AipError::Validation(format!(
                "unknown interval unit {:?}",
                other
            ))),
        }
    }
}

fn months(count: u32, per_unit: u32, raw: &str) -> AipResult<DepositInterval> {
    count
        .checked_mul(per_unit)
        .map(DepositInterval::Months)
        .ok_or_else(|| AipError::Validation(format!("interval {:?} is too long", raw)))
}

impl TryFrom<String> for DepositInterval {
    type Error = AipError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for DepositInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepositInterval::Days(n) => write!(f, "{}d", n),
            DepositInterval::Weeks(n) => write!(f, "{}w", n),
            DepositInterval::Months(n) => write!(f, "{}mo", n),
        }
    }
}

/// Moves Saturday and Sunday to the following Monday.
pub fn shift_off_weekend(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date + Days::new(2),
        Weekday::Sun => date + Days::new(1),
        _ => date,
    }
}

/// Generates a fixed-amount deposit on every interval step from `start` to `end` inclusive.
///
/// With `shift_weekends`, weekend dates move to the next Monday; deposits that
/// land on the same date are summed.
pub fn generate(
    start: NaiveDate,
    end: NaiveDate,
    interval: DepositInterval,
    amount: f64,
    shift_weekends: bool,
) -> AipResult<CashDeposits> {
    if end < start {
        return Err(AipError::Validation(format!(
            "schedule end {} is before start {}",
            end, start
        )));
    }

    let mut deposits = CashDeposits::default();
    let mut k = 0;
    while let Some(date) = interval.nth(start, k) {
        if date > end {
            break;
        }
        let date = if shift_weekends {
            shift_off_weekend(date)
        } else {
            date
        };
        deposits.add(date, amount)?;
        k += 1;
    }
    Ok(deposits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_intervals() {
        assert_eq!("7d".parse::<DepositInterval>().unwrap(), DepositInterval::Days(7));
        assert_eq!("2w".parse::<DepositInterval>().unwrap(), DepositInterval::Weeks(2));
        assert_eq!("1mo".parse::<DepositInterval>().unwrap(), DepositInterval::Months(1));
        assert_eq!("1Q".parse::<DepositInterval>().unwrap(), DepositInterval::Months(3));
        assert_eq!("1y".parse::<DepositInterval>().unwrap(), DepositInterval::Months(12));
        assert!("0d".parse::<DepositInterval>().is_err());
        assert!("mo".parse::<DepositInterval>().is_err());
        assert!("3".parse::<DepositInterval>().is_err());
        assert!("3h".parse::<DepositInterval>().is_err());
    }

    #[test]
    fn test_oversized_interval_is_rejected() {
        assert!(matches!(
            "2000000000y".parse::<DepositInterval>(),
            Err(AipError::Validation(_))
        ));
        assert!(matches!(
            "2000000000q".parse::<DepositInterval>(),
            Err(AipError::Validation(_))
        ));
        assert_eq!(
            "4000000000mo".parse::<DepositInterval>().unwrap(),
            DepositInterval::Months(4_000_000_000)
        );
    }

    #[test]
    fn test_weekend_shift() {
        // 2024-06-01 is a Saturday
        assert_eq!(shift_off_weekend(date(2024, 6, 1)), date(2024, 6, 3));
        assert_eq!(shift_off_weekend(date(2024, 6, 2)), date(2024, 6, 3));
        assert_eq!(shift_off_weekend(date(2024, 6, 4)), date(2024, 6, 4));
    }

    #[test]
    fn test_monthly_schedule() {
        let deposits = generate(
            date(2024, 1, 1),
            date(2024, 6, 30),
            DepositInterval::Months(1),
            500.0,
            true,
        )
        .unwrap();
        let dates: Vec<NaiveDate> = deposits.iter().map(|(d, _)| d).collect();
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 1),
                date(2024, 2, 1),
                date(2024, 3, 1),
                date(2024, 4, 1),
                date(2024, 5, 1),
                // June 1st is a Saturday
                date(2024, 6, 3),
            ]
        );
        assert_eq!(deposits.total(), 3000.0);
    }

    #[test]
    fn test_month_end_does_not_drift() {
        let deposits = generate(
            date(2023, 1, 31),
            date(2023, 4, 30),
            DepositInterval::Months(1),
            100.0,
            false,
        )
        .unwrap();
        let dates: Vec<NaiveDate> = deposits.iter().map(|(d, _)| d).collect();
        assert_eq!(
            dates,
            vec![
                date(2023, 1, 31),
                date(2023, 2, 28),
                date(2023, 3, 31),
                date(2023, 4, 30)
            ]
        );
    }

    #[test]
    fn test_shifted_collisions_are_summed() {
        // Sat and Sun both shift to Monday 2024-06-03
        let deposits = generate(
            date(2024, 6, 1),
            date(2024, 6, 2),
            DepositInterval::Days(1),
            100.0,
            true,
        )
        .unwrap();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits.get(date(2024, 6, 3)), 200.0);
    }

    #[test]
    fn test_end_before_start() {
        let result = generate(
            date(2024, 2, 1),
            date(2024, 1, 1),
            DepositInterval::Weeks(1),
            100.0,
            true,
        );
        assert!(matches!(result, Err(AipError::Validation(_))));
    }
}
