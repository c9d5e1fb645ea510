use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::types::RepaymentFrequency;

/// number of repayment periods in one year for a frequency unit
pub fn periods_per_year(frequency: RepaymentFrequency) -> u32 {
    match frequency {
        RepaymentFrequency::Days => 365,
        RepaymentFrequency::Weeks => 52,
        RepaymentFrequency::Months => 12,
        RepaymentFrequency::Years => 1,
        RepaymentFrequency::Invalid => 0,
    }
}

/// share of a period whose interest is waived because interest is only
/// charged from `interest_charged_from`.
///
/// returns 1 when the whole period ends on or before the charge start date,
/// a proportional share when the charge start falls strictly inside the
/// period, and 0 otherwise (including when no charge start date is set).
/// the result is always within [0, 1].
pub fn grace_period_fraction(
    period_start: NaiveDate,
    scheduled_due: NaiveDate,
    interest_charged_from: Option<NaiveDate>,
    frequency: RepaymentFrequency,
    repay_every: u32,
) -> Decimal {
    let Some(charged_from) = interest_charged_from else {
        return Decimal::ZERO;
    };

    // due < charged_from + 1 day
    if scheduled_due <= charged_from {
        return Decimal::ONE;
    }

    if period_start < charged_from && charged_from < scheduled_due {
        let days_in_grace = Decimal::from((charged_from - period_start).num_days());
        let every = Decimal::from(repay_every);

        let fraction = match frequency {
            RepaymentFrequency::Days => days_in_grace * every,
            RepaymentFrequency::Weeks => divide_or_zero(days_in_grace, Decimal::from(7) * every),
            RepaymentFrequency::Months => divide_or_zero(days_in_grace, Decimal::from(30) * every),
            RepaymentFrequency::Years => divide_or_zero(days_in_grace, Decimal::from(365) * every),
            RepaymentFrequency::Invalid => Decimal::ZERO,
        };

        return fraction.max(Decimal::ZERO).min(Decimal::ONE);
    }

    Decimal::ZERO
}

fn divide_or_zero(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_periods_per_year() {
        assert_eq!(periods_per_year(RepaymentFrequency::Days), 365);
        assert_eq!(periods_per_year(RepaymentFrequency::Weeks), 52);
        assert_eq!(periods_per_year(RepaymentFrequency::Months), 12);
        assert_eq!(periods_per_year(RepaymentFrequency::Years), 1);
        assert_eq!(periods_per_year(RepaymentFrequency::Invalid), 0);
        assert_eq!(periods_per_year(RepaymentFrequency::from_code(42)), 0);
    }

    #[test]
    fn test_no_charge_start_means_no_grace() {
        let fraction = grace_period_fraction(
            date(2024, 1, 1),
            date(2024, 2, 1),
            None,
            RepaymentFrequency::Months,
            1,
        );
        assert_eq!(fraction, Decimal::ZERO);
    }

    #[test]
    fn test_period_before_charge_start_is_fully_waived() {
        let start = date(2024, 1, 1);
        let due = date(2024, 2, 1);

        // charge start on the due date
        assert_eq!(
            grace_period_fraction(start, due, Some(due), RepaymentFrequency::Months, 1),
            Decimal::ONE
        );
        // charge start after the due date
        assert_eq!(
            grace_period_fraction(start, due, Some(date(2024, 3, 15)), RepaymentFrequency::Months, 1),
            Decimal::ONE
        );
    }

    #[test]
    fn test_partial_period_fraction() {
        let start = date(2024, 1, 1);
        let due = date(2024, 2, 1);
        let charged_from = date(2024, 1, 16);

        assert_eq!(
            grace_period_fraction(start, due, Some(charged_from), RepaymentFrequency::Months, 1),
            dec!(0.5)
        );
        assert_eq!(
            grace_period_fraction(start, due, Some(charged_from), RepaymentFrequency::Months, 3),
            dec!(15) / dec!(90)
        );

        let weekly_due = date(2024, 1, 15);
        assert_eq!(
            grace_period_fraction(start, weekly_due, Some(date(2024, 1, 8)), RepaymentFrequency::Weeks, 2),
            dec!(0.5)
        );

        let yearly_due = date(2025, 1, 1);
        assert_eq!(
            grace_period_fraction(start, yearly_due, Some(date(2024, 3, 1)), RepaymentFrequency::Years, 1),
            dec!(60) / dec!(365)
        );
    }

    #[test]
    fn test_day_frequency_is_clamped() {
        let fraction = grace_period_fraction(
            date(2024, 1, 1),
            date(2024, 1, 5),
            Some(date(2024, 1, 3)),
            RepaymentFrequency::Days,
            4,
        );
        assert_eq!(fraction, Decimal::ONE);
    }

    #[test]
    fn test_invalid_frequency_and_late_start() {
        let start = date(2024, 1, 1);
        let due = date(2024, 2, 1);
        assert_eq!(
            grace_period_fraction(start, due, Some(date(2024, 1, 10)), RepaymentFrequency::Invalid, 1),
            Decimal::ZERO
        );
        // interest already running when the period starts
        assert_eq!(
            grace_period_fraction(start, due, Some(date(2023, 12, 1)), RepaymentFrequency::Months, 1),
            Decimal::ZERO
        );
        assert_eq!(
            grace_period_fraction(start, due, Some(start), RepaymentFrequency::Months, 1),
            Decimal::ZERO
        );
    }

    proptest! {
        #[test]
        fn test_fraction_always_in_unit_range(
            start_offset in 0i64..2_000,
            length in 1i64..400,
            charge_offset in -500i64..2_500,
            every in 1u32..12,
            code in 0i32..5,
        ) {
            let base = date(2020, 1, 1);
            let start = base + chrono::Duration::days(start_offset);
            let due = start + chrono::Duration::days(length);
            let charged_from = base + chrono::Duration::days(charge_offset);

            let fraction = grace_period_fraction(
                start,
                due,
                Some(charged_from),
                RepaymentFrequency::from_code(code),
                every,
            );

            prop_assert!(fraction >= Decimal::ZERO);
            prop_assert!(fraction <= Decimal::ONE);
            if charged_from >= due {
                prop_assert_eq!(fraction, Decimal::ONE);
            }
        }
    }
}
