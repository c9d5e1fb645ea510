use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::allocation::{
    allocate_credit, merge_credit_allocation_rules, merge_payment_allocation_rules, validate_credit_allocation_rules,
    validate_payment_allocation_rules, ComponentAmounts, CreditAllocation, CreditAllocationRule,
    CreditAllocationTransactionType, PaymentAllocationRule, PaymentAllocationTransactionType, PaymentAllocator,
    RepaymentAllocation,
};
use crate::config::LoanProductConfig;
use crate::decimal::{CurrencyRounding, Money};
use crate::delinquency::{
    classify_loan, effective_periods, validate_delinquency_action, DelinquencyActionContext,
    DelinquencyClassification, EffectiveDelinquencyPeriod, LoanDelinquencyAction,
};
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventStore};
use crate::memo::{HashMode, MemoizedValue, Snapshot};
use crate::schedule::{LoanSchedule, ScheduleGenerationInput, ScheduleGeneratorFactory, ScheduleTotals};
use crate::types::{LoanId, LoanStatus};

/// kind of charge attached to an installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargeKind {
    Fee,
    Penalty,
}

/// charge due on a date; lands on the installment covering that date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanCharge {
    pub kind: ChargeKind,
    pub amount: Money,
    pub due_date: NaiveDate,
}

impl LoanCharge {
    pub fn fee(amount: Money, due_date: NaiveDate) -> Self {
        Self {
            kind: ChargeKind::Fee,
            amount,
            due_date,
        }
    }

    pub fn penalty(amount: Money, due_date: NaiveDate) -> Self {
        Self {
            kind: ChargeKind::Penalty,
            amount,
            due_date,
        }
    }
}

/// posted money movement, replayed when the schedule is regenerated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanTransaction {
    Charge(LoanCharge),
    Repayment {
        transaction_type: PaymentAllocationTransactionType,
        amount: Money,
        transaction_date: NaiveDate,
    },
    /// reverses part of the repayment at index `repayment`
    Chargeback {
        repayment: usize,
        amount: Money,
        transaction_date: NaiveDate,
    },
}

type ScheduleSlot = Arc<RwLock<Arc<LoanSchedule>>>;

fn current(slot: &ScheduleSlot) -> Arc<LoanSchedule> {
    Arc::clone(&slot.read().unwrap_or_else(PoisonError::into_inner))
}

/// totals cell keyed on the identity of the current schedule
fn totals_cell(slot: &ScheduleSlot) -> MemoizedValue<ScheduleTotals, Arc<LoanSchedule>> {
    let source = Arc::clone(slot);
    let watch = Arc::clone(slot);
    MemoizedValue::with_dependencies(
        move || Ok(current(&source).totals()),
        move || Snapshot::One(current(&watch)),
        HashMode::Identity,
    )
}

/// loan account aggregate
pub struct LoanAccount {
    pub id: LoanId,
    pub product: LoanProductConfig,
    pub terms: ScheduleGenerationInput,
    status: LoanStatus,
    schedule: ScheduleSlot,
    totals: MemoizedValue<ScheduleTotals, Arc<LoanSchedule>>,
    payment_allocation_rules: Vec<PaymentAllocationRule>,
    credit_allocation_rules: Vec<CreditAllocationRule>,
    transactions: Vec<LoanTransaction>,
    /// components each transaction moved, index-aligned with `transactions`
    applied: Vec<ComponentAmounts>,
    delinquency_actions: Vec<LoanDelinquencyAction>,
    delinquency: Option<DelinquencyClassification>,
    last_closed_business_date: Option<NaiveDate>,
    overpaid_amount: Money,
    pub events: EventStore,
}

impl LoanAccount {
    /// disburse a loan under the product's standard terms
    pub fn disburse(
        product: LoanProductConfig,
        principal: Money,
        disbursement_date: NaiveDate,
        factory: &ScheduleGeneratorFactory,
        time_provider: &SafeTimeProvider,
    ) -> Result<Self> {
        product.validate()?;
        let terms = product.schedule_input(principal, disbursement_date);
        Self::disburse_with_terms(product, terms, factory, time_provider)
    }

    /// disburse with explicit terms (first repayment date, interest charged from, ...)
    pub fn disburse_with_terms(
        product: LoanProductConfig,
        terms: ScheduleGenerationInput,
        factory: &ScheduleGeneratorFactory,
        time_provider: &SafeTimeProvider,
    ) -> Result<Self> {
        let schedule = factory.generate(product.schedule_terms.interest_method, &terms)?;
        let id = Uuid::new_v4();
        let now = time_provider.now();

        let slot: ScheduleSlot = Arc::new(RwLock::new(Arc::new(schedule)));
        let mut loan = Self {
            id,
            payment_allocation_rules: product.payment_allocation_rules.clone(),
            credit_allocation_rules: product.credit_allocation_rules.clone(),
            product,
            terms,
            status: LoanStatus::Active,
            totals: totals_cell(&slot),
            schedule: slot,
            transactions: Vec::new(),
            applied: Vec::new(),
            delinquency_actions: Vec::new(),
            delinquency: None,
            last_closed_business_date: None,
            overpaid_amount: Money::ZERO,
            events: EventStore::new(),
        };

        loan.events.emit(Event::LoanDisbursed {
            loan_id: id,
            principal: loan.terms.principal,
            disbursement_date: loan.terms.disbursement_date,
            timestamp: now,
        });
        loan.emit_schedule_generated(now);

        info!(loan_id = %id, principal = %loan.terms.principal, "loan disbursed");
        Ok(loan)
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    /// current schedule version
    pub fn schedule(&self) -> Arc<LoanSchedule> {
        current(&self.schedule)
    }

    /// totals of the current schedule, recomputed only after it is replaced
    pub fn totals(&self) -> Result<ScheduleTotals> {
        self.totals.get()
    }

    pub fn payment_allocation_rules(&self) -> &[PaymentAllocationRule] {
        &self.payment_allocation_rules
    }

    pub fn credit_allocation_rules(&self) -> &[CreditAllocationRule] {
        &self.credit_allocation_rules
    }

    /// charges and repayments in posting order
    pub fn transactions(&self) -> &[LoanTransaction] {
        &self.transactions
    }

    pub fn delinquency_actions(&self) -> &[LoanDelinquencyAction] {
        &self.delinquency_actions
    }

    /// pause periods after resumes are applied
    pub fn effective_pause_periods(&self) -> Vec<EffectiveDelinquencyPeriod> {
        effective_periods(&self.delinquency_actions)
    }

    /// last classification stored by close of business
    pub fn delinquency(&self) -> Option<&DelinquencyClassification> {
        self.delinquency.as_ref()
    }

    pub fn last_closed_business_date(&self) -> Option<NaiveDate> {
        self.last_closed_business_date
    }

    pub fn overpaid_amount(&self) -> Money {
        self.overpaid_amount
    }

    /// regenerate the schedule for new terms and replay every posted charge
    /// and repayment against it; the previous version is discarded
    pub fn reschedule(
        &mut self,
        terms: ScheduleGenerationInput,
        factory: &ScheduleGeneratorFactory,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.ensure_active()?;
        let now = time_provider.now();

        let mut next = factory.generate(self.product.schedule_terms.interest_method, &terms)?;
        let (applied, excess) = self.replay(&mut next, terms.rounding)?;

        debug!(loan_id = %self.id, replayed = self.transactions.len(), "transactions replayed onto new schedule");
        self.replace_schedule(next);
        self.applied = applied;
        self.terms = terms;
        self.emit_schedule_generated(now);
        self.settle_status(excess, now)?;
        Ok(())
    }

    /// attach a fee or penalty to the installment covering its due date
    pub fn apply_charge(&mut self, charge: LoanCharge, time_provider: &SafeTimeProvider) -> Result<u32> {
        self.apply_charge_at(charge, time_provider.now())
    }

    pub(crate) fn apply_charge_at(&mut self, charge: LoanCharge, now: DateTime<Utc>) -> Result<u32> {
        self.ensure_active()?;
        if !charge.amount.is_positive() {
            return Err(LoanError::InvalidTransactionAmount { amount: charge.amount });
        }

        let charge = LoanCharge {
            amount: self.terms.rounding.round_money(charge.amount.as_decimal()),
            ..charge
        };
        let mut next = LoanSchedule::clone(&self.schedule());
        let installment_number = attach_charge(&mut next, charge)?;
        self.replace_schedule(next);
        self.transactions.push(LoanTransaction::Charge(charge));
        self.applied.push(ComponentAmounts::default());

        debug!(loan_id = %self.id, kind = ?charge.kind, amount = %charge.amount, installment_number, "charge applied");
        self.events.emit(Event::ChargeApplied {
            loan_id: self.id,
            kind: charge.kind,
            amount: charge.amount,
            due_date: charge.due_date,
            installment_number,
            timestamp: now,
        });
        Ok(installment_number)
    }

    /// allocate a repayment with the rule for its transaction type
    pub fn post_repayment(
        &mut self,
        transaction_type: PaymentAllocationTransactionType,
        amount: Money,
        transaction_date: NaiveDate,
        time_provider: &SafeTimeProvider,
    ) -> Result<RepaymentAllocation> {
        self.ensure_active()?;
        let now = time_provider.now();

        let mut next = LoanSchedule::clone(&self.schedule());
        let allocator = PaymentAllocator::new(&self.payment_allocation_rules, self.terms.rounding);
        let allocation = allocator.allocate(&mut next, transaction_type, amount, transaction_date)?;
        self.replace_schedule(next);
        self.transactions.push(LoanTransaction::Repayment {
            transaction_type,
            amount,
            transaction_date,
        });
        self.applied.push(allocation.components());

        self.events.emit(Event::RepaymentAllocated {
            loan_id: self.id,
            transaction_type,
            amount,
            applied_to_principal: allocation.to_principal,
            applied_to_interest: allocation.to_interest,
            applied_to_fees: allocation.to_fees,
            applied_to_penalties: allocation.to_penalties,
            excess: allocation.excess,
            timestamp: now,
        });

        self.settle_status(allocation.excess, now)?;
        Ok(allocation)
    }

    /// credit part of an earlier repayment back onto the installment covering
    /// the chargeback date; a closed loan reopens
    pub fn post_chargeback(
        &mut self,
        repayment: usize,
        amount: Money,
        transaction_date: NaiveDate,
        time_provider: &SafeTimeProvider,
    ) -> Result<CreditAllocation> {
        if !matches!(self.status, LoanStatus::Active | LoanStatus::ClosedObligationsMet) {
            return Err(LoanError::LoanNotActive { status: self.status });
        }
        let now = time_provider.now();

        let available = chargeback_available(&self.transactions, &self.applied, repayment)?;
        let mut next = LoanSchedule::clone(&self.schedule());
        let credit = allocate_credit(&mut next, self.chargeback_rule(), &available, amount, transaction_date)?;
        self.replace_schedule(next);
        self.transactions.push(LoanTransaction::Chargeback {
            repayment,
            amount,
            transaction_date,
        });
        self.applied.push(credit.credited);

        info!(loan_id = %self.id, repayment, %amount, "chargeback posted");
        self.events.emit(Event::ChargebackPosted {
            loan_id: self.id,
            repayment_index: repayment,
            amount,
            installment_number: credit.installment_number,
            credited_principal: credit.credited.principal,
            credited_interest: credit.credited.interest,
            credited_fees: credit.credited.fees,
            credited_penalties: credit.credited.penalties,
            timestamp: now,
        });

        if self.status == LoanStatus::ClosedObligationsMet {
            self.change_status(LoanStatus::Active, now);
        }
        Ok(credit)
    }

    /// merge submitted allocation rules into the loan's rules; `None` leaves
    /// that rule set untouched. returns whether anything changed.
    pub fn update_allocation_rules(
        &mut self,
        payment_rules: Option<&[PaymentAllocationRule]>,
        credit_rules: Option<&[CreditAllocationRule]>,
        time_provider: &SafeTimeProvider,
    ) -> Result<bool> {
        let payment = merge_payment_allocation_rules(&self.payment_allocation_rules, payment_rules);
        let credit = merge_credit_allocation_rules(&self.credit_allocation_rules, credit_rules);
        if !payment.changed && !credit.changed {
            return Ok(false);
        }

        validate_payment_allocation_rules(&payment.rules)?;
        validate_credit_allocation_rules(&credit.rules)?;

        self.payment_allocation_rules = payment.rules;
        self.credit_allocation_rules = credit.rules;

        self.events.emit(Event::AllocationRulesUpdated {
            loan_id: self.id,
            payment_rules: self.payment_allocation_rules.iter().map(|r| r.transaction_type).collect(),
            credit_rules: self.credit_allocation_rules.iter().map(|r| r.transaction_type).collect(),
            timestamp: time_provider.now(),
        });
        Ok(true)
    }

    /// validate and append a pause or resume
    pub fn record_delinquency_action(
        &mut self,
        action: LoanDelinquencyAction,
        business_date: NaiveDate,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        let context = DelinquencyActionContext {
            loan_status: self.status,
            disbursement_date: self.terms.disbursement_date,
            business_date,
            existing_actions: &self.delinquency_actions,
        };
        validate_delinquency_action(&action, &context)?;

        self.delinquency_actions.push(action);
        debug!(loan_id = %self.id, action = ?action.action, start = %action.start_date, "delinquency action recorded");

        self.events.emit(Event::DelinquencyActionRecorded {
            loan_id: self.id,
            action: action.action,
            start_date: action.start_date,
            end_date: action.end_date,
            timestamp: time_provider.now(),
        });
        Ok(())
    }

    /// classify against the product's bucket and keep the result
    pub fn classify_delinquency(
        &mut self,
        as_of: NaiveDate,
        time_provider: &SafeTimeProvider,
    ) -> DelinquencyClassification {
        self.classify_delinquency_at(as_of, time_provider.now())
    }

    pub(crate) fn classify_delinquency_at(&mut self, as_of: NaiveDate, now: DateTime<Utc>) -> DelinquencyClassification {
        let classification = classify_loan(
            &self.schedule(),
            &self.delinquency_actions,
            &self.product.delinquency_bucket,
            as_of,
        );

        self.events.emit(Event::DelinquencyClassified {
            loan_id: self.id,
            classification: classification.range.as_ref().map(|r| r.classification.clone()),
            overdue_days: classification.overdue_days,
            as_of,
            timestamp: now,
        });
        self.delinquency = Some(classification.clone());
        classification
    }

    pub(crate) fn mark_business_day_closed(&mut self, business_date: NaiveDate) {
        self.last_closed_business_date = Some(business_date);
    }

    /// get events
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.status.is_active() {
            return Err(LoanError::LoanNotActive { status: self.status });
        }
        Ok(())
    }

    /// install a new schedule version; the old version stays valid for
    /// anyone still holding it
    fn replace_schedule(&mut self, schedule: LoanSchedule) {
        *self.schedule.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(schedule);
    }

    fn chargeback_rule(&self) -> Option<&CreditAllocationRule> {
        self.credit_allocation_rules
            .iter()
            .find(|r| r.transaction_type == CreditAllocationTransactionType::Chargeback)
    }

    /// apply the transaction log, in posting order, to a fresh schedule.
    /// returns what each transaction moved and the unabsorbed excess.
    fn replay(&self, schedule: &mut LoanSchedule, rounding: CurrencyRounding) -> Result<(Vec<ComponentAmounts>, Money)> {
        let allocator = PaymentAllocator::new(&self.payment_allocation_rules, rounding);
        let mut applied = Vec::with_capacity(self.transactions.len());
        let mut excess = Money::ZERO;

        for transaction in &self.transactions {
            let moved = match *transaction {
                LoanTransaction::Charge(charge) => {
                    attach_charge(schedule, charge)?;
                    ComponentAmounts::default()
                }
                LoanTransaction::Repayment {
                    transaction_type,
                    amount,
                    transaction_date,
                } => {
                    let allocation = allocator.allocate(schedule, transaction_type, amount, transaction_date)?;
                    excess += allocation.excess;
                    allocation.components()
                }
                LoanTransaction::Chargeback {
                    repayment,
                    amount,
                    transaction_date,
                } => {
                    let available = chargeback_available(&self.transactions, &applied, repayment)?;
                    allocate_credit(schedule, self.chargeback_rule(), &available, amount, transaction_date)?.credited
                }
            };
            applied.push(moved);
        }
        Ok((applied, excess))
    }

    /// move to overpaid or closed once the schedule is covered
    fn settle_status(&mut self, excess: Money, now: DateTime<Utc>) -> Result<()> {
        if excess.is_positive() {
            self.overpaid_amount += excess;
            self.change_status(LoanStatus::Overpaid, now);
        } else if !self.totals()?.outstanding.is_positive() {
            self.change_status(LoanStatus::ClosedObligationsMet, now);
        }
        Ok(())
    }

    fn change_status(&mut self, new_status: LoanStatus, now: DateTime<Utc>) {
        if self.status == new_status {
            return;
        }
        let old_status = self.status;
        self.status = new_status;
        info!(loan_id = %self.id, ?old_status, ?new_status, "loan status changed");
        self.events.emit(Event::StatusChanged {
            loan_id: self.id,
            old_status,
            new_status,
            timestamp: now,
        });
    }

    fn emit_schedule_generated(&mut self, now: DateTime<Utc>) {
        let schedule = self.schedule();
        self.events.emit(Event::ScheduleGenerated {
            loan_id: self.id,
            interest_method: schedule.interest_method,
            installments: schedule.installments.len() as u32,
            total_interest: schedule.total_interest(),
            maturity_date: schedule.maturity_date(),
            timestamp: now,
        });
    }
}

/// what is left of a repayment after earlier chargebacks against it
fn chargeback_available(
    transactions: &[LoanTransaction],
    applied: &[ComponentAmounts],
    repayment: usize,
) -> Result<ComponentAmounts> {
    if !matches!(transactions.get(repayment), Some(LoanTransaction::Repayment { .. })) {
        return Err(LoanError::RepaymentNotFound { index: repayment });
    }
    let paid = applied
        .get(repayment)
        .copied()
        .ok_or(LoanError::RepaymentNotFound { index: repayment })?;

    Ok(transactions
        .iter()
        .zip(applied)
        .filter(|(t, _)| matches!(t, LoanTransaction::Chargeback { repayment: r, .. } if *r == repayment))
        .fold(paid, |left, (_, credited)| left.saturating_sub(credited)))
}

fn attach_charge(schedule: &mut LoanSchedule, charge: LoanCharge) -> Result<u32> {
    let installment = schedule
        .installment_for_date_mut(charge.due_date)
        .ok_or_else(|| LoanError::CalculationError {
            message: "schedule has no installments".to_string(),
        })?;
    match charge.kind {
        ChargeKind::Fee => installment.fee_charges += charge.amount,
        ChargeKind::Penalty => installment.penalty_charges += charge.amount,
    }
    Ok(installment.number)
}

impl fmt::Debug for LoanAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoanAccount")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("principal", &self.terms.principal)
            .field("last_closed_business_date", &self.last_closed_business_date)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::FutureInstallmentAllocationRule;
    use crate::decimal::Rate;
    use crate::errors::DelinquencyActionViolation;
    use chrono::TimeZone;
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()))
    }

    fn loan(time: &SafeTimeProvider) -> LoanAccount {
        LoanAccount::disburse(
            LoanProductConfig::personal_loan(Rate::from_percentage(dec!(12)), 12),
            Money::from_major(10_000),
            date(2024, 1, 1),
            &ScheduleGeneratorFactory::standard(),
            time,
        )
        .unwrap()
    }

    #[test]
    fn test_disburse_generates_schedule() {
        let time = time();
        let mut loan = loan(&time);

        assert_eq!(loan.status(), LoanStatus::Active);
        let schedule = loan.schedule();
        assert_eq!(schedule.installments.len(), 12);
        assert_eq!(schedule.installments[0].interest, Money::from_major(100));
        assert_eq!(schedule.total_principal(), Money::from_major(10_000));

        let events = loan.take_events();
        assert!(matches!(events[0], Event::LoanDisbursed { .. }));
        assert!(matches!(events[1], Event::ScheduleGenerated { installments: 12, .. }));
    }

    #[test]
    fn test_totals_follow_schedule_replacement() {
        let time = time();
        let mut loan = loan(&time);

        let before = loan.totals().unwrap();
        assert_eq!(before.fee_charges, Money::ZERO);
        assert_eq!(loan.totals().unwrap(), before);

        let number = loan
            .apply_charge(LoanCharge::fee(Money::from_major(50), date(2024, 1, 15)), &time)
            .unwrap();
        assert_eq!(number, 1);

        let after = loan.totals().unwrap();
        assert_eq!(after.fee_charges, Money::from_major(50));
        assert_eq!(after.repayment_expected, before.repayment_expected + Money::from_major(50));
    }

    #[test]
    fn test_old_schedule_version_stays_readable() {
        let time = time();
        let mut loan = loan(&time);

        let held = loan.schedule();
        loan.apply_charge(LoanCharge::penalty(Money::from_major(10), date(2024, 3, 1)), &time)
            .unwrap();

        assert_eq!(held.installments[1].penalty_charges, Money::ZERO);
        assert_eq!(loan.schedule().installments[1].penalty_charges, Money::from_major(10));
    }

    #[test]
    fn test_repayment_on_due_date_settles_installment() {
        let time = time();
        let mut loan = loan(&time);
        let first = loan.schedule().installments[0].clone();

        let allocation = loan
            .post_repayment(
                PaymentAllocationTransactionType::Repayment,
                first.total_due(),
                first.due_date,
                &time,
            )
            .unwrap();

        assert_eq!(allocation.to_interest, first.interest);
        assert_eq!(allocation.to_principal, first.principal);
        assert_eq!(allocation.excess, Money::ZERO);
        assert!(loan.schedule().installments[0].is_fully_paid());
        assert_eq!(loan.status(), LoanStatus::Active);
        assert_eq!(loan.totals().unwrap().paid, first.total_due());
    }

    #[test]
    fn test_overpayment_marks_loan_overpaid() {
        let time = time();
        let mut loan = loan(&time);
        let outstanding = loan.totals().unwrap().outstanding;

        let allocation = loan
            .post_repayment(
                PaymentAllocationTransactionType::Repayment,
                outstanding + Money::from_major(10),
                date(2024, 1, 20),
                &time,
            )
            .unwrap();

        assert_eq!(allocation.excess, Money::from_major(10));
        assert_eq!(loan.status(), LoanStatus::Overpaid);
        assert_eq!(loan.overpaid_amount(), Money::from_major(10));
        assert!(matches!(
            loan.apply_charge(LoanCharge::fee(Money::from_major(5), date(2024, 2, 1)), &time),
            Err(LoanError::LoanNotActive { .. })
        ));
    }

    #[test]
    fn test_exact_payoff_closes_loan() {
        let time = time();
        let mut loan = loan(&time);
        let outstanding = loan.totals().unwrap().outstanding;

        loan.post_repayment(PaymentAllocationTransactionType::Repayment, outstanding, date(2024, 1, 20), &time)
            .unwrap();
        assert_eq!(loan.status(), LoanStatus::ClosedObligationsMet);
    }

    #[test]
    fn test_update_allocation_rules() {
        let time = time();
        let mut loan = loan(&time);
        loan.take_events();

        // no-op
        assert!(!loan.update_allocation_rules(None, None, &time).unwrap());
        assert!(loan.take_events().is_empty());

        let mut default_rule = PaymentAllocationRule::standard(PaymentAllocationTransactionType::Default);
        default_rule.future_installment_allocation_rule = FutureInstallmentAllocationRule::LastInstallment;
        let submitted = vec![
            default_rule,
            PaymentAllocationRule::standard(PaymentAllocationTransactionType::MerchantIssuedRefund),
        ];
        assert!(loan
            .update_allocation_rules(Some(submitted.as_slice()), None, &time)
            .unwrap());
        assert_eq!(loan.payment_allocation_rules().len(), 2);
        assert_eq!(
            loan.payment_allocation_rules()[0].future_installment_allocation_rule,
            FutureInstallmentAllocationRule::LastInstallment
        );

        // merge result without a default rule is rejected and nothing changes
        let without_default = vec![PaymentAllocationRule::standard(PaymentAllocationTransactionType::Repayment)];
        assert!(matches!(
            loan.update_allocation_rules(Some(without_default.as_slice()), None, &time),
            Err(LoanError::InvalidAllocationRules { .. })
        ));
        assert_eq!(loan.payment_allocation_rules().len(), 2);
    }

    #[test]
    fn test_delinquency_actions_validated_and_reconciled() {
        let time = time();
        let mut loan = loan(&time);

        loan.record_delinquency_action(
            LoanDelinquencyAction::pause(date(2024, 3, 1), Some(date(2024, 3, 31))),
            date(2024, 3, 1),
            &time,
        )
        .unwrap();
        loan.record_delinquency_action(LoanDelinquencyAction::resume(date(2024, 3, 10)), date(2024, 3, 10), &time)
            .unwrap();

        let overlapping = loan.record_delinquency_action(
            LoanDelinquencyAction::pause(date(2024, 3, 5), Some(date(2024, 3, 8))),
            date(2024, 3, 10),
            &time,
        );
        assert_eq!(
            overlapping,
            Err(LoanError::InvalidDelinquencyAction(DelinquencyActionViolation::OverlappingPause))
        );

        assert_eq!(loan.delinquency_actions().len(), 2);
        assert_eq!(
            loan.effective_pause_periods(),
            vec![EffectiveDelinquencyPeriod {
                start_date: date(2024, 3, 1),
                end_date: Some(date(2024, 3, 10)),
            }]
        );
    }

    #[test]
    fn test_classification_is_stored() {
        let time = time();
        let mut loan = loan(&time);

        let result = loan.classify_delinquency(date(2024, 3, 12), &time);
        assert_eq!(result.overdue_days, 40);
        assert_eq!(loan.delinquency().unwrap().range.as_ref().unwrap().classification, "RANGE_30");
    }

    #[test]
    fn test_reschedule_keeps_payments() {
        let time = time();
        let mut loan = loan(&time);
        let first = loan.schedule().installments[0].clone();
        loan.post_repayment(PaymentAllocationTransactionType::Repayment, first.total_due(), first.due_date, &time)
            .unwrap();

        let mut terms = loan.terms.clone();
        terms.number_of_installments = 24;
        loan.reschedule(terms, &ScheduleGeneratorFactory::standard(), &time)
            .unwrap();

        let schedule = loan.schedule();
        assert_eq!(schedule.installments.len(), 24);
        assert_eq!(schedule.installments[0].total_paid(), first.total_due());
        assert_eq!(loan.terms.number_of_installments, 24);
    }

    #[test]
    fn test_shorter_reschedule_replays_payments_and_charges() {
        let time = time();
        let mut loan = loan(&time);
        loan.apply_charge(LoanCharge::fee(Money::from_major(40), date(2024, 11, 15)), &time)
            .unwrap();

        let six_due: Money = loan.schedule().installments[..6].iter().map(|i| i.total_due()).sum();
        loan.post_repayment(PaymentAllocationTransactionType::Repayment, six_due, date(2024, 7, 1), &time)
            .unwrap();
        let paid_before = loan.totals().unwrap().paid;
        assert_eq!(paid_before, six_due);

        let mut terms = loan.terms.clone();
        terms.number_of_installments = 3;
        loan.reschedule(terms, &ScheduleGeneratorFactory::standard(), &time)
            .unwrap();

        let after = loan.totals().unwrap();
        assert_eq!(loan.schedule().installments.len(), 3);
        assert_eq!(after.paid, paid_before);
        // the fee fell beyond the new maturity and lands on the last installment
        assert_eq!(after.fee_charges, Money::from_major(40));
        assert_eq!(after.outstanding, after.repayment_expected - after.paid);
        assert_eq!(loan.transactions().len(), 2);
        assert_eq!(loan.status(), LoanStatus::Active);
    }

    #[test]
    fn test_reschedule_below_paid_amount_marks_overpaid() {
        let time = time();
        let mut loan = LoanAccount::disburse(
            LoanProductConfig::personal_loan(Rate::from_percentage(dec!(36)), 12),
            Money::from_major(10_000),
            date(2024, 1, 1),
            &ScheduleGeneratorFactory::standard(),
            &time,
        )
        .unwrap();
        let eleven_due: Money = loan.schedule().installments[..11].iter().map(|i| i.total_due()).sum();
        loan.post_repayment(PaymentAllocationTransactionType::Repayment, eleven_due, date(2024, 12, 1), &time)
            .unwrap();
        assert_eq!(loan.status(), LoanStatus::Active);

        // interest-free terms owe less than was already paid
        let mut terms = loan.terms.clone();
        terms.annual_interest_rate = Rate::ZERO;
        loan.reschedule(terms, &ScheduleGeneratorFactory::standard(), &time)
            .unwrap();

        assert_eq!(loan.status(), LoanStatus::Overpaid);
        let totals = loan.totals().unwrap();
        assert_eq!(totals.outstanding, Money::ZERO);
        assert_eq!(totals.paid + loan.overpaid_amount(), eleven_due);
    }

    #[test]
    fn test_chargeback_reopens_closed_loan() {
        let time = time();
        let mut loan = loan(&time);
        let outstanding = loan.totals().unwrap().outstanding;
        loan.post_repayment(PaymentAllocationTransactionType::Repayment, outstanding, date(2024, 1, 20), &time)
            .unwrap();
        assert_eq!(loan.status(), LoanStatus::ClosedObligationsMet);

        let credit = loan
            .post_chargeback(0, Money::from_major(300), date(2024, 2, 10), &time)
            .unwrap();

        // standard order when no chargeback rule is configured
        assert_eq!(credit.credited.principal, Money::from_major(300));
        assert_eq!(credit.installment_number, 2);
        assert_eq!(loan.status(), LoanStatus::Active);
        assert_eq!(loan.totals().unwrap().outstanding, Money::from_major(300));
    }

    #[test]
    fn test_chargeback_limited_to_what_the_repayment_paid() {
        let time = time();
        let mut loan = loan(&time);
        loan.apply_charge(LoanCharge::fee(Money::from_major(20), date(2024, 1, 15)), &time)
            .unwrap();
        loan.post_repayment(PaymentAllocationTransactionType::Repayment, Money::from_major(500), date(2024, 2, 1), &time)
            .unwrap();

        assert!(matches!(
            loan.post_chargeback(0, Money::from_major(10), date(2024, 2, 10), &time),
            Err(LoanError::RepaymentNotFound { index: 0 })
        ));

        loan.post_chargeback(1, Money::from_major(300), date(2024, 2, 10), &time)
            .unwrap();
        assert!(matches!(
            loan.post_chargeback(1, Money::from_major(201), date(2024, 2, 10), &time),
            Err(LoanError::InvalidTransactionAmount { .. })
        ));
        assert!(loan
            .post_chargeback(1, Money::from_major(200), date(2024, 2, 10), &time)
            .is_ok());
        assert_eq!(loan.transactions().len(), 4);
    }

    #[test]
    fn test_chargeback_uses_credit_rule_and_survives_reschedule() {
        let time = time();
        let mut loan = loan(&time);
        let rule = CreditAllocationRule::new(
            CreditAllocationTransactionType::Chargeback,
            vec![
                crate::allocation::AllocationType::Interest,
                crate::allocation::AllocationType::Principal,
                crate::allocation::AllocationType::Fee,
                crate::allocation::AllocationType::Penalty,
            ],
        );
        loan.update_allocation_rules(None, Some(std::slice::from_ref(&rule)), &time)
            .unwrap();

        let first = loan.schedule().installments[0].clone();
        loan.post_repayment(PaymentAllocationTransactionType::Repayment, first.total_due(), first.due_date, &time)
            .unwrap();
        let credit = loan
            .post_chargeback(0, Money::from_major(150), date(2024, 2, 10), &time)
            .unwrap();
        assert_eq!(credit.credited.interest, first.interest);
        assert_eq!(credit.credited.principal, Money::from_major(150) - first.interest);
        let expected_before = loan.totals().unwrap().repayment_expected;

        let mut terms = loan.terms.clone();
        terms.number_of_installments = 6;
        loan.reschedule(terms, &ScheduleGeneratorFactory::standard(), &time)
            .unwrap();

        let totals = loan.totals().unwrap();
        assert_eq!(totals.paid, first.total_due());
        assert!(totals.repayment_expected < expected_before);
        assert_eq!(totals.outstanding, totals.repayment_expected - totals.paid);
    }
}
