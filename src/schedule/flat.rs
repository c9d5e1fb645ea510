use rust_decimal::Decimal;

use crate::decimal::Money;
use crate::errors::Result;
use crate::types::InterestMethod;

use super::dates;
use super::generator::ScheduleGenerator;
use super::{Installment, LoanSchedule, ScheduleGenerationInput};

/// interest on the original principal, spread evenly over the
/// interest-bearing installments
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatScheduleGenerator;

impl ScheduleGenerator for FlatScheduleGenerator {
    fn interest_method(&self) -> InterestMethod {
        InterestMethod::Flat
    }

    fn generate(&self, input: &ScheduleGenerationInput) -> Result<LoanSchedule> {
        input.validate()?;

        let periods = dates::installment_periods(
            input.disbursement_date,
            input.first_repayment_on,
            input.frequency,
            input.repay_every,
            input.number_of_installments,
        )?;

        let rounding = input.rounding;
        let n = input.number_of_installments;
        let interest_free = input.grace.interest_free_periods.min(n);
        let bearing = n - interest_free;

        let total_interest = rounding.round_money(
            periods
                .iter()
                .skip(interest_free as usize)
                .map(|(from, due)| input.principal.as_decimal() * input.period_rate(*from, *due))
                .sum::<Decimal>(),
        );
        let per_period_interest = if bearing == 0 {
            Money::ZERO
        } else {
            rounding.round_money(total_interest.as_decimal() / Decimal::from(bearing))
        };
        let level_principal =
            rounding.round_money(input.principal.as_decimal() / Decimal::from(input.amortizing_periods()));

        let mut balance = input.principal;
        let mut interest_allotted = Money::ZERO;
        let mut installments = Vec::with_capacity(periods.len());

        for (index, (from, due)) in periods.into_iter().enumerate() {
            let number = index as u32 + 1;
            let is_last = number == n;

            let principal = if number <= input.grace.principal_periods {
                Money::ZERO
            } else if is_last {
                balance
            } else {
                level_principal.min(balance)
            };

            let interest_due = if number <= interest_free {
                Money::ZERO
            } else if is_last {
                // final installment absorbs rounding
                total_interest - interest_allotted
            } else {
                per_period_interest
            };
            interest_allotted += interest_due;

            let interest = input.charged_interest(number, from, due, interest_due.as_decimal());
            balance -= principal;

            installments.push(Installment::new(number, from, due, principal, interest, balance));
        }

        Ok(LoanSchedule {
            interest_method: InterestMethod::Flat,
            installments,
        })
    }
}
