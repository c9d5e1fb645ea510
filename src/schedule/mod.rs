pub mod dates;
pub mod declining;
pub mod flat;
pub mod frequency;
pub mod generator;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{CurrencyRounding, Money, Rate};
use crate::errors::{LoanError, Result};
use crate::types::{AmortizationMethod, InterestCalculationPeriod, InterestMethod, RepaymentFrequency};

pub use declining::DecliningBalanceScheduleGenerator;
pub use flat::FlatScheduleGenerator;
pub use frequency::{grace_period_fraction, periods_per_year};
pub use generator::{ScheduleGenerator, ScheduleGeneratorFactory};

/// grace settings applied at the start of the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GraceSettings {
    /// leading installments with no principal due
    pub principal_periods: u32,
    /// leading installments with no interest charged
    pub interest_free_periods: u32,
}

/// everything a generator needs to build one schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleGenerationInput {
    pub principal: Money,
    pub annual_interest_rate: Rate,
    pub frequency: RepaymentFrequency,
    pub repay_every: u32,
    pub disbursement_date: NaiveDate,
    pub first_repayment_on: Option<NaiveDate>,
    pub interest_charged_from: Option<NaiveDate>,
    pub number_of_installments: u32,
    pub amortization: AmortizationMethod,
    pub interest_calculation_period: InterestCalculationPeriod,
    pub grace: GraceSettings,
    pub rounding: CurrencyRounding,
}

impl ScheduleGenerationInput {
    /// monthly equal-installment input with no grace, rounded to cents
    pub fn monthly(
        principal: Money,
        annual_interest_rate: Rate,
        number_of_installments: u32,
        disbursement_date: NaiveDate,
    ) -> Self {
        Self {
            principal,
            annual_interest_rate,
            frequency: RepaymentFrequency::Months,
            repay_every: 1,
            disbursement_date,
            first_repayment_on: None,
            interest_charged_from: None,
            number_of_installments,
            amortization: AmortizationMethod::EqualInstallments,
            interest_calculation_period: InterestCalculationPeriod::SameAsRepaymentPeriod,
            grace: GraceSettings::default(),
            rounding: CurrencyRounding::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(LoanError::InvalidConfiguration {
                message: message.to_string(),
            })
        };

        if !self.principal.is_positive() {
            return invalid("principal must be positive");
        }
        if self.annual_interest_rate.is_negative() {
            return invalid("interest rate cannot be negative");
        }
        if self.frequency == RepaymentFrequency::Invalid {
            return invalid("repayment frequency is invalid");
        }
        if self.repay_every == 0 {
            return invalid("repay every must be at least one period");
        }
        if self.number_of_installments == 0 {
            return invalid("number of installments must be at least one");
        }
        if self.grace.principal_periods >= self.number_of_installments {
            return invalid("principal grace must leave at least one amortizing installment");
        }
        Ok(())
    }

    /// installments that repay principal
    pub(crate) fn amortizing_periods(&self) -> u32 {
        self.number_of_installments - self.grace.principal_periods
    }

    /// nominal per-period rate (as a ratio) for the repayment frequency
    pub(crate) fn nominal_period_rate(&self) -> Decimal {
        let ppy = periods_per_year(self.frequency);
        if ppy == 0 {
            return Decimal::ZERO;
        }
        self.annual_interest_rate.as_fraction() / Decimal::from(ppy) * Decimal::from(self.repay_every)
    }

    /// rate (as a ratio) charged for one concrete period
    pub(crate) fn period_rate(&self, from: NaiveDate, due: NaiveDate) -> Decimal {
        match self.interest_calculation_period {
            InterestCalculationPeriod::SameAsRepaymentPeriod => self.nominal_period_rate(),
            InterestCalculationPeriod::Daily => {
                let days = dates::days_between(from, due).max(0);
                self.annual_interest_rate.as_fraction() / Decimal::from(365) * Decimal::from(days)
            }
        }
    }

    /// interest actually charged for period `number` after grace waivers
    pub(crate) fn charged_interest(
        &self,
        number: u32,
        from: NaiveDate,
        due: NaiveDate,
        interest: Decimal,
    ) -> Money {
        if number <= self.grace.interest_free_periods {
            return Money::ZERO;
        }

        let fraction = grace_period_fraction(
            from,
            due,
            self.interest_charged_from,
            self.frequency,
            self.repay_every,
        );
        self.rounding.round_money(interest * (Decimal::ONE - fraction))
    }
}

/// one repayment period of a schedule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Installment {
    pub number: u32,
    pub from_date: NaiveDate,
    pub due_date: NaiveDate,
    pub principal: Money,
    pub interest: Money,
    pub fee_charges: Money,
    pub penalty_charges: Money,
    /// principal still owed after this installment
    pub outstanding_balance: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub fee_charges_paid: Money,
    pub penalty_charges_paid: Money,
}

impl Installment {
    pub fn new(
        number: u32,
        from_date: NaiveDate,
        due_date: NaiveDate,
        principal: Money,
        interest: Money,
        outstanding_balance: Money,
    ) -> Self {
        Self {
            number,
            from_date,
            due_date,
            principal,
            interest,
            fee_charges: Money::ZERO,
            penalty_charges: Money::ZERO,
            outstanding_balance,
            principal_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            fee_charges_paid: Money::ZERO,
            penalty_charges_paid: Money::ZERO,
        }
    }

    pub fn total_due(&self) -> Money {
        self.principal + self.interest + self.fee_charges + self.penalty_charges
    }

    pub fn total_paid(&self) -> Money {
        self.principal_paid + self.interest_paid + self.fee_charges_paid + self.penalty_charges_paid
    }

    pub fn total_outstanding(&self) -> Money {
        self.total_due() - self.total_paid()
    }

    pub fn principal_outstanding(&self) -> Money {
        self.principal - self.principal_paid
    }

    pub fn interest_outstanding(&self) -> Money {
        self.interest - self.interest_paid
    }

    pub fn fee_charges_outstanding(&self) -> Money {
        self.fee_charges - self.fee_charges_paid
    }

    pub fn penalty_charges_outstanding(&self) -> Money {
        self.penalty_charges - self.penalty_charges_paid
    }

    pub fn is_fully_paid(&self) -> bool {
        !self.total_outstanding().is_positive()
    }

    /// period contains `date` (from exclusive, due inclusive; the first
    /// installment also covers its from date)
    pub fn covers(&self, date: NaiveDate) -> bool {
        (self.from_date < date || (self.number == 1 && self.from_date == date)) && date <= self.due_date
    }
}

/// generated repayment schedule; regenerated wholesale when terms change
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanSchedule {
    pub interest_method: InterestMethod,
    pub installments: Vec<Installment>,
}

/// derived schedule totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTotals {
    pub principal: Money,
    pub interest: Money,
    pub fee_charges: Money,
    pub penalty_charges: Money,
    pub repayment_expected: Money,
    pub paid: Money,
    pub outstanding: Money,
}

impl LoanSchedule {
    pub fn total_principal(&self) -> Money {
        self.installments.iter().map(|i| i.principal).sum()
    }

    pub fn total_interest(&self) -> Money {
        self.installments.iter().map(|i| i.interest).sum()
    }

    pub fn totals(&self) -> ScheduleTotals {
        let principal = self.total_principal();
        let interest = self.total_interest();
        let fee_charges = self.installments.iter().map(|i| i.fee_charges).sum();
        let penalty_charges = self.installments.iter().map(|i| i.penalty_charges).sum();
        let paid: Money = self.installments.iter().map(|i| i.total_paid()).sum();
        let repayment_expected = principal + interest + fee_charges + penalty_charges;

        ScheduleTotals {
            principal,
            interest,
            fee_charges,
            penalty_charges,
            repayment_expected,
            paid,
            outstanding: repayment_expected - paid,
        }
    }

    pub fn installment(&self, number: u32) -> Option<&Installment> {
        self.installments.iter().find(|i| i.number == number)
    }

    /// installment whose period contains `date`, or the last one when the
    /// date falls after maturity
    pub fn installment_for_date_mut(&mut self, date: NaiveDate) -> Option<&mut Installment> {
        let index = self
            .installments
            .iter()
            .position(|i| i.covers(date))
            .or_else(|| self.installments.len().checked_sub(1))?;
        self.installments.get_mut(index)
    }

    pub fn maturity_date(&self) -> Option<NaiveDate> {
        self.installments.last().map(|i| i.due_date)
    }

    /// oldest installment due on or before `as_of` with anything unpaid
    pub fn oldest_overdue(&self, as_of: NaiveDate) -> Option<&Installment> {
        self.installments
            .iter()
            .find(|i| i.due_date < as_of && !i.is_fully_paid())
    }
}
