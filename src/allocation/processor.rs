use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::{CurrencyRounding, Money};
use crate::errors::{LoanError, Result};
use crate::schedule::{Installment, LoanSchedule};

use super::rules::{
    AllocationType, CreditAllocationRule, CreditAllocationTransactionType, DueType, FutureInstallmentAllocationRule, PaymentAllocationRule, PaymentAllocationTransactionType,
    PaymentAllocationType,
};

/// amount applied to one component of one installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedPortion {
    pub installment_number: u32,
    pub allocation_type: PaymentAllocationType,
    pub amount: Money,
}

/// result of allocating a transaction against a schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentAllocation {
    pub transaction_type: PaymentAllocationTransactionType,
    pub transaction_date: NaiveDate,
    pub amount: Money,
    pub portions: Vec<AllocatedPortion>,
    pub to_principal: Money,
    pub to_interest: Money,
    pub to_fees: Money,
    pub to_penalties: Money,
    /// not absorbed by any installment
    pub excess: Money,
}

impl RepaymentAllocation {
    fn new(transaction_type: PaymentAllocationTransactionType, transaction_date: NaiveDate, amount: Money) -> Self {
        Self {
            transaction_type,
            transaction_date,
            amount,
            portions: Vec::new(),
            to_principal: Money::ZERO,
            to_interest: Money::ZERO,
            to_fees: Money::ZERO,
            to_penalties: Money::ZERO,
            excess: Money::ZERO,
        }
    }

    pub fn total_applied(&self) -> Money {
        self.to_principal + self.to_interest + self.to_fees + self.to_penalties
    }

    fn record(&mut self, installment_number: u32, allocation_type: PaymentAllocationType, amount: Money) {
        match allocation_type.allocation_type() {
            AllocationType::Principal => self.to_principal += amount,
            AllocationType::Interest => self.to_interest += amount,
            AllocationType::Fee => self.to_fees += amount,
            AllocationType::Penalty => self.to_penalties += amount,
        }
        self.portions.push(AllocatedPortion {
            installment_number,
            allocation_type,
            amount,
        });
    }
}

/// money per balance component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComponentAmounts {
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
    pub penalties: Money,
}

impl ComponentAmounts {
    pub fn get(&self, component: AllocationType) -> Money {
        match component {
            AllocationType::Principal => self.principal,
            AllocationType::Interest => self.interest,
            AllocationType::Fee => self.fees,
            AllocationType::Penalty => self.penalties,
        }
    }

    fn add(&mut self, component: AllocationType, amount: Money) {
        match component {
            AllocationType::Principal => self.principal += amount,
            AllocationType::Interest => self.interest += amount,
            AllocationType::Fee => self.fees += amount,
            AllocationType::Penalty => self.penalties += amount,
        }
    }

    pub fn total(&self) -> Money {
        self.principal + self.interest + self.fees + self.penalties
    }

    /// component-wise difference, floored at zero
    pub fn saturating_sub(&self, other: &ComponentAmounts) -> ComponentAmounts {
        let sub = |a: Money, b: Money| (a - b).max(Money::ZERO);
        ComponentAmounts {
            principal: sub(self.principal, other.principal),
            interest: sub(self.interest, other.interest),
            fees: sub(self.fees, other.fees),
            penalties: sub(self.penalties, other.penalties),
        }
    }
}

impl RepaymentAllocation {
    pub fn components(&self) -> ComponentAmounts {
        ComponentAmounts {
            principal: self.to_principal,
            interest: self.to_interest,
            fees: self.to_fees,
            penalties: self.to_penalties,
        }
    }
}

/// result of crediting a chargeback back onto the schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAllocation {
    pub transaction_type: CreditAllocationTransactionType,
    pub transaction_date: NaiveDate,
    pub amount: Money,
    /// installment whose dues were increased
    pub installment_number: u32,
    pub credited: ComponentAmounts,
}

/// re-opens amounts a repayment settled. the amount is split over the
/// components the repayment paid, in the order of the credit rule; the
/// standard component order applies when no rule is configured.
pub fn allocate_credit(
    schedule: &mut LoanSchedule,
    rule: Option<&CreditAllocationRule>,
    available: &ComponentAmounts,
    amount: Money,
    date: NaiveDate,
) -> Result<CreditAllocation> {
    if !amount.is_positive() || amount > available.total() {
        return Err(LoanError::InvalidTransactionAmount { amount });
    }

    let order = rule.map_or(&AllocationType::ALL[..], |r| r.allocation_types.as_slice());
    let installment = schedule
        .installment_for_date_mut(date)
        .ok_or_else(|| LoanError::CalculationError {
            message: "schedule has no installments".to_string(),
        })?;

    let mut credited = ComponentAmounts::default();
    let mut remaining = amount;
    for &component in order {
        let portion = remaining.min(available.get(component));
        if !portion.is_positive() {
            continue;
        }
        match component {
            AllocationType::Principal => installment.principal += portion,
            AllocationType::Interest => installment.interest += portion,
            AllocationType::Fee => installment.fee_charges += portion,
            AllocationType::Penalty => installment.penalty_charges += portion,
        }
        credited.add(component, portion);
        remaining -= portion;
    }

    debug!(installment = installment.number, %amount, "chargeback credited");
    Ok(CreditAllocation {
        transaction_type: CreditAllocationTransactionType::Chargeback,
        transaction_date: date,
        amount,
        installment_number: installment.number,
        credited,
    })
}

/// applies money to installments following the rule configured for the
/// transaction type
pub struct PaymentAllocator<'a> {
    rules: &'a [PaymentAllocationRule],
    rounding: CurrencyRounding,
}

impl<'a> PaymentAllocator<'a> {
    pub fn new(rules: &'a [PaymentAllocationRule], rounding: CurrencyRounding) -> Self {
        Self { rules, rounding }
    }

    /// rule for the transaction type, falling back to the default rule
    pub fn rule_for(&self, transaction_type: PaymentAllocationTransactionType) -> Result<&'a PaymentAllocationRule> {
        self.rules
            .iter()
            .find(|r| r.transaction_type == transaction_type)
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|r| r.transaction_type == PaymentAllocationTransactionType::Default)
            })
            .ok_or_else(|| LoanError::InvalidAllocationRules {
                message: format!("no allocation rule for {:?} and no DEFAULT rule", transaction_type),
            })
    }

    /// allocate `amount` paid on `date` against the schedule.
    ///
    /// steps are grouped by due type in first-appearance order; inside a
    /// group the steps are applied to one target installment at a time
    /// until the money, the targets or the group's balances run out.
    pub fn allocate(
        &self,
        schedule: &mut LoanSchedule,
        transaction_type: PaymentAllocationTransactionType,
        amount: Money,
        date: NaiveDate,
    ) -> Result<RepaymentAllocation> {
        if !amount.is_positive() {
            return Err(LoanError::InvalidTransactionAmount { amount });
        }

        let rule = self.rule_for(transaction_type)?;
        let mut allocation = RepaymentAllocation::new(transaction_type, date, amount);
        let mut remaining = amount;

        for (due_type, steps) in group_by_due_type(&rule.allocation_types) {
            remaining = self.allocate_group(
                schedule,
                due_type,
                &steps,
                rule.future_installment_allocation_rule,
                remaining,
                date,
                &mut allocation,
            );
            if remaining.is_zero() {
                break;
            }
        }

        allocation.excess = remaining;
        debug!(
            ?transaction_type,
            amount = %amount,
            applied = %allocation.total_applied(),
            excess = %allocation.excess,
            "allocated transaction"
        );
        Ok(allocation)
    }

    #[allow(clippy::too_many_arguments)]
    fn allocate_group(
        &self,
        schedule: &mut LoanSchedule,
        due_type: DueType,
        steps: &[PaymentAllocationType],
        future_rule: FutureInstallmentAllocationRule,
        mut remaining: Money,
        date: NaiveDate,
        allocation: &mut RepaymentAllocation,
    ) -> Money {
        while remaining.is_positive() {
            let targets = target_installments(schedule, due_type, future_rule, date);
            if targets.is_empty() {
                break;
            }

            let before = remaining;
            if due_type == DueType::InAdvance && future_rule == FutureInstallmentAllocationRule::Reamortization {
                remaining = self.spread_evenly(schedule, &targets, steps, remaining, allocation);
            } else {
                for &index in &targets {
                    for &step in steps {
                        let installment = &mut schedule.installments[index];
                        let paid = pay_component(installment, step.allocation_type(), remaining);
                        if paid.is_positive() {
                            allocation.record(installment.number, step, paid);
                            remaining -= paid;
                        }
                    }
                }
            }

            // nothing left in this group's components
            if remaining == before {
                break;
            }
        }
        remaining
    }

    fn spread_evenly(
        &self,
        schedule: &mut LoanSchedule,
        targets: &[usize],
        steps: &[PaymentAllocationType],
        mut remaining: Money,
        allocation: &mut RepaymentAllocation,
    ) -> Money {
        let count = Decimal::from(targets.len());
        let even = self.rounding.round_money(remaining.as_decimal() / count);
        let adjustment = remaining - even * count;

        for (position, &index) in targets.iter().enumerate() {
            let mut share = if position + 1 == targets.len() { even + adjustment } else { even };
            share = share.min(remaining);

            for &step in steps {
                let installment = &mut schedule.installments[index];
                let paid = pay_component(installment, step.allocation_type(), share);
                if paid.is_positive() {
                    allocation.record(installment.number, step, paid);
                    share -= paid;
                    remaining -= paid;
                }
            }
        }
        remaining
    }
}

/// steps grouped by due type, groups ordered by first appearance
fn group_by_due_type(steps: &[PaymentAllocationType]) -> Vec<(DueType, Vec<PaymentAllocationType>)> {
    let mut groups: Vec<(DueType, Vec<PaymentAllocationType>)> = Vec::new();
    for &step in steps {
        match groups.iter_mut().find(|(due_type, _)| *due_type == step.due_type()) {
            Some((_, group)) => group.push(step),
            None => groups.push((step.due_type(), vec![step])),
        }
    }
    groups
}

/// indexes of the installments a due type currently targets
fn target_installments(
    schedule: &LoanSchedule,
    due_type: DueType,
    future_rule: FutureInstallmentAllocationRule,
    date: NaiveDate,
) -> Vec<usize> {
    let open = |i: &&Installment| !i.is_fully_paid();
    let index_of = |number: u32| schedule.installments.iter().position(|i| i.number == number);

    let numbers: Vec<u32> = match due_type {
        DueType::PastDue => schedule
            .installments
            .iter()
            .filter(open)
            .filter(|i| i.due_date < date)
            .map(|i| i.number)
            .min()
            .into_iter()
            .collect(),
        DueType::Due => schedule
            .installments
            .iter()
            .filter(open)
            .filter(|i| i.due_date == date)
            .map(|i| i.number)
            .min()
            .into_iter()
            .collect(),
        DueType::InAdvance => {
            let future: Vec<&Installment> = schedule
                .installments
                .iter()
                .filter(open)
                .filter(|i| i.due_date > date)
                .collect();
            match future_rule {
                FutureInstallmentAllocationRule::Reamortization => future.iter().map(|i| i.number).collect(),
                FutureInstallmentAllocationRule::NextInstallment => {
                    future.iter().map(|i| i.number).min().into_iter().collect()
                }
                FutureInstallmentAllocationRule::LastInstallment => {
                    future.iter().map(|i| i.number).max().into_iter().collect()
                }
                FutureInstallmentAllocationRule::NextLastInstallment => future
                    .iter()
                    .find(|i| i.covers(date))
                    .map(|i| i.number)
                    .or_else(|| future.iter().map(|i| i.number).max())
                    .into_iter()
                    .collect(),
            }
        }
    };

    numbers.into_iter().filter_map(index_of).collect()
}

/// pay up to `available` of one component; returns the amount paid
fn pay_component(installment: &mut Installment, component: AllocationType, available: Money) -> Money {
    let (outstanding, paid) = match component {
        AllocationType::Principal => (installment.principal_outstanding(), &mut installment.principal_paid),
        AllocationType::Interest => (installment.interest_outstanding(), &mut installment.interest_paid),
        AllocationType::Fee => (installment.fee_charges_outstanding(), &mut installment.fee_charges_paid),
        AllocationType::Penalty => (installment.penalty_charges_outstanding(), &mut installment.penalty_charges_paid),
    };

    let payment = available.min(outstanding).max(Money::ZERO);
    *paid += payment;
    payment
}
