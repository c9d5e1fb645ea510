use chrono::{Duration, Months, NaiveDate};

use crate::errors::{LoanError, Result};
use crate::types::RepaymentFrequency;

/// date `periods * repay_every` frequency units after `anchor`.
/// month and year steps keep the anchor's day of month where it exists
/// and clamp to month end otherwise.
pub fn add_periods(
    anchor: NaiveDate,
    frequency: RepaymentFrequency,
    repay_every: u32,
    periods: u32,
) -> Result<NaiveDate> {
    let units = repay_every.checked_mul(periods).ok_or_else(overflow)?;

    let date = match frequency {
        RepaymentFrequency::Days => anchor.checked_add_signed(Duration::days(units as i64)),
        RepaymentFrequency::Weeks => anchor.checked_add_signed(Duration::weeks(units as i64)),
        RepaymentFrequency::Months => anchor.checked_add_months(Months::new(units)),
        RepaymentFrequency::Years => units
            .checked_mul(12)
            .and_then(|months| anchor.checked_add_months(Months::new(months))),
        RepaymentFrequency::Invalid => {
            return Err(LoanError::InvalidConfiguration {
                message: "cannot derive due dates for an invalid repayment frequency".to_string(),
            })
        }
    };

    date.ok_or_else(overflow)
}

/// (period start, due date) for every installment.
///
/// every due date is derived from the same anchor so month-end dates do not
/// drift (jan 31, feb 29, mar 31).
pub fn installment_periods(
    disbursement_date: NaiveDate,
    first_repayment_on: Option<NaiveDate>,
    frequency: RepaymentFrequency,
    repay_every: u32,
    number_of_installments: u32,
) -> Result<Vec<(NaiveDate, NaiveDate)>> {
    let mut periods = Vec::with_capacity(number_of_installments as usize);
    let mut from = disbursement_date;

    for n in 1..=number_of_installments {
        let due = match first_repayment_on {
            Some(first) => add_periods(first, frequency, repay_every, n - 1)?,
            None => add_periods(disbursement_date, frequency, repay_every, n)?,
        };

        if due <= from {
            return Err(LoanError::InvalidDate {
                message: format!("installment {} due {} is not after period start {}", n, due, from),
            });
        }

        periods.push((from, due));
        from = due;
    }

    Ok(periods)
}

/// whole days between two dates, negative when `to` is earlier
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

fn overflow() -> LoanError {
    LoanError::InvalidDate {
        message: "due date out of range".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_end_does_not_drift() {
        let periods = installment_periods(date(2024, 1, 31), None, RepaymentFrequency::Months, 1, 3).unwrap();
        let dues: Vec<_> = periods.iter().map(|(_, due)| *due).collect();
        assert_eq!(dues, vec![date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30)]);
        assert_eq!(periods[1].0, date(2024, 2, 29));
    }

    #[test]
    fn test_other_frequencies() {
        let start = date(2024, 1, 1);
        assert_eq!(add_periods(start, RepaymentFrequency::Days, 10, 2).unwrap(), date(2024, 1, 21));
        assert_eq!(add_periods(start, RepaymentFrequency::Weeks, 2, 1).unwrap(), date(2024, 1, 15));
        assert_eq!(add_periods(start, RepaymentFrequency::Years, 1, 2).unwrap(), date(2026, 1, 1));
        assert!(add_periods(start, RepaymentFrequency::Invalid, 1, 1).is_err());
    }

    #[test]
    fn test_first_repayment_date_anchor() {
        let periods = installment_periods(
            date(2024, 1, 10),
            Some(date(2024, 2, 15)),
            RepaymentFrequency::Months,
            1,
            2,
        )
        .unwrap();
        assert_eq!(periods[0], (date(2024, 1, 10), date(2024, 2, 15)));
        assert_eq!(periods[1], (date(2024, 2, 15), date(2024, 3, 15)));
    }

    #[test]
    fn test_first_repayment_before_disbursement_rejected() {
        let result = installment_periods(
            date(2024, 1, 10),
            Some(date(2024, 1, 5)),
            RepaymentFrequency::Months,
            1,
            2,
        );
        assert!(matches!(result, Err(LoanError::InvalidDate { .. })));
    }
}
