use rust_decimal::Decimal;

use crate::decimal::{CurrencyRounding, Money};
use crate::errors::{LoanError, Result};
use crate::types::{AmortizationMethod, InterestMethod};

use super::dates;
use super::generator::ScheduleGenerator;
use super::{Installment, LoanSchedule, ScheduleGenerationInput};

/// interest on the outstanding balance of each period
#[derive(Debug, Clone, Copy, Default)]
pub struct DecliningBalanceScheduleGenerator;

impl ScheduleGenerator for DecliningBalanceScheduleGenerator {
    fn interest_method(&self) -> InterestMethod {
        InterestMethod::DecliningBalance
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
        let amortizing = input.amortizing_periods();
        let level_principal = match input.amortization {
            AmortizationMethod::EqualInstallments => None,
            AmortizationMethod::EqualPrincipal => Some(
                rounding.round_money(input.principal.as_decimal() / Decimal::from(amortizing)),
            ),
        };
        let emi = equal_installment_amount(input.principal, input.nominal_period_rate(), amortizing, &rounding)?;

        let mut balance = input.principal;
        let mut installments = Vec::with_capacity(periods.len());

        for (index, (from, due)) in periods.into_iter().enumerate() {
            let number = index as u32 + 1;
            let interest_due = balance
                .as_decimal()
                .checked_mul(input.period_rate(from, due))
                .map(|interest| rounding.round_money(interest))
                .ok_or_else(|| LoanError::CalculationError {
                    message: format!("interest overflows on installment {}", number),
                })?;

            let principal = if number <= input.grace.principal_periods {
                Money::ZERO
            } else if number == input.number_of_installments {
                // final installment absorbs rounding
                balance
            } else {
                let portion = level_principal.unwrap_or(emi - interest_due);
                portion.max(Money::ZERO).min(balance)
            };

            let interest = input.charged_interest(number, from, due, interest_due.as_decimal());
            balance -= principal;

            installments.push(Installment::new(number, from, due, principal, interest, balance));
        }

        Ok(LoanSchedule {
            interest_method: InterestMethod::DecliningBalance,
            installments,
        })
    }
}

/// level payment for `periods` installments: P * r / (1 - (1 + r)^-n)
///
/// the discount factor shrinks toward zero instead of growing, so long terms
/// at high rates stay inside decimal range
pub fn equal_installment_amount(
    principal: Money,
    period_rate: Decimal,
    periods: u32,
    rounding: &CurrencyRounding,
) -> Result<Money> {
    if periods == 0 {
        return Ok(principal);
    }

    if period_rate.is_zero() {
        return Ok(rounding.round_money(principal.as_decimal() / Decimal::from(periods)));
    }

    let overflow = || LoanError::CalculationError {
        message: format!("installment amount overflows at period rate {}", period_rate),
    };

    let base = Decimal::ONE.checked_add(period_rate).ok_or_else(overflow)?;
    let per_period = Decimal::ONE.checked_div(base).ok_or_else(overflow)?;
    let mut discount = Decimal::ONE;
    for _ in 0..periods {
        discount = discount.checked_mul(per_period).ok_or_else(overflow)?;
        if discount.is_zero() {
            break;
        }
    }

    // rate too small to register at decimal precision
    if discount == Decimal::ONE {
        return Ok(rounding.round_money(principal.as_decimal() / Decimal::from(periods)));
    }

    let numerator = principal.as_decimal().checked_mul(period_rate).ok_or_else(overflow)?;
    let amount = numerator
        .checked_div(Decimal::ONE - discount)
        .ok_or_else(overflow)?;

    Ok(rounding.round_money(amount))
}
