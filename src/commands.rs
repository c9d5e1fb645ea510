use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::allocation::{
    CreditAllocation, CreditAllocationRule, PaymentAllocationRule, PaymentAllocationTransactionType, RepaymentAllocation,
};
use crate::cob::LoanBatchLock;
use crate::decimal::Money;
use crate::delinquency::LoanDelinquencyAction;
use crate::errors::Result;
use crate::loan::{LoanAccount, LoanCharge};
use crate::schedule::{ScheduleGenerationInput, ScheduleGeneratorFactory};

/// validated interactive command against one loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoanCommand {
    ApplyCharge(LoanCharge),
    PostRepayment {
        transaction_type: PaymentAllocationTransactionType,
        amount: Money,
        transaction_date: NaiveDate,
    },
    PostChargeback {
        /// index of the repayment in the loan's transaction log
        repayment: usize,
        amount: Money,
        transaction_date: NaiveDate,
    },
    /// `None` leaves that rule set as it is
    UpdateAllocationRules {
        payment_rules: Option<Vec<PaymentAllocationRule>>,
        credit_rules: Option<Vec<CreditAllocationRule>>,
    },
    RecordDelinquencyAction {
        action: LoanDelinquencyAction,
        business_date: NaiveDate,
    },
    Reschedule(ScheduleGenerationInput),
}

/// what a command produced
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    ChargeApplied { installment_number: u32 },
    RepaymentAllocated(RepaymentAllocation),
    ChargebackPosted(CreditAllocation),
    AllocationRulesUpdated { changed: bool },
    DelinquencyActionRecorded,
    Rescheduled,
}

/// entry point for interactive mutations; every command is refused while
/// close of business holds the loan
#[derive(Clone)]
pub struct LoanCommandService {
    lock: LoanBatchLock,
    factory: ScheduleGeneratorFactory,
}

impl LoanCommandService {
    pub fn new(lock: LoanBatchLock, factory: ScheduleGeneratorFactory) -> Self {
        Self { lock, factory }
    }

    pub fn lock(&self) -> &LoanBatchLock {
        &self.lock
    }

    pub fn factory(&self) -> &ScheduleGeneratorFactory {
        &self.factory
    }

    pub fn execute(
        &self,
        loan: &mut LoanAccount,
        command: LoanCommand,
        time_provider: &SafeTimeProvider,
    ) -> Result<CommandResult> {
        if let Err(e) = self.lock.ensure_unlocked(loan.id) {
            warn!(loan_id = %loan.id, "command rejected while close of business runs");
            return Err(e);
        }

        match command {
            LoanCommand::ApplyCharge(charge) => {
                let installment_number = loan.apply_charge(charge, time_provider)?;
                Ok(CommandResult::ChargeApplied { installment_number })
            }
            LoanCommand::PostRepayment {
                transaction_type,
                amount,
                transaction_date,
            } => loan
                .post_repayment(transaction_type, amount, transaction_date, time_provider)
                .map(CommandResult::RepaymentAllocated),
            LoanCommand::PostChargeback {
                repayment,
                amount,
                transaction_date,
            } => loan
                .post_chargeback(repayment, amount, transaction_date, time_provider)
                .map(CommandResult::ChargebackPosted),
            LoanCommand::UpdateAllocationRules {
                payment_rules,
                credit_rules,
            } => {
                let changed =
                    loan.update_allocation_rules(payment_rules.as_deref(), credit_rules.as_deref(), time_provider)?;
                Ok(CommandResult::AllocationRulesUpdated { changed })
            }
            LoanCommand::RecordDelinquencyAction { action, business_date } => {
                loan.record_delinquency_action(action, business_date, time_provider)?;
                Ok(CommandResult::DelinquencyActionRecorded)
            }
            LoanCommand::Reschedule(terms) => {
                loan.reschedule(terms, &self.factory, time_provider)?;
                Ok(CommandResult::Rescheduled)
            }
        }
    }

    pub fn apply_charge(
        &self,
        loan: &mut LoanAccount,
        charge: LoanCharge,
        time_provider: &SafeTimeProvider,
    ) -> Result<u32> {
        self.lock.ensure_unlocked(loan.id)?;
        loan.apply_charge(charge, time_provider)
    }

    pub fn post_repayment(
        &self,
        loan: &mut LoanAccount,
        transaction_type: PaymentAllocationTransactionType,
        amount: Money,
        transaction_date: NaiveDate,
        time_provider: &SafeTimeProvider,
    ) -> Result<RepaymentAllocation> {
        self.lock.ensure_unlocked(loan.id)?;
        loan.post_repayment(transaction_type, amount, transaction_date, time_provider)
    }

    pub fn post_chargeback(
        &self,
        loan: &mut LoanAccount,
        repayment: usize,
        amount: Money,
        transaction_date: NaiveDate,
        time_provider: &SafeTimeProvider,
    ) -> Result<CreditAllocation> {
        self.lock.ensure_unlocked(loan.id)?;
        loan.post_chargeback(repayment, amount, transaction_date, time_provider)
    }

    pub fn update_allocation_rules(
        &self,
        loan: &mut LoanAccount,
        payment_rules: Option<&[PaymentAllocationRule]>,
        credit_rules: Option<&[CreditAllocationRule]>,
        time_provider: &SafeTimeProvider,
    ) -> Result<bool> {
        self.lock.ensure_unlocked(loan.id)?;
        loan.update_allocation_rules(payment_rules, credit_rules, time_provider)
    }

    pub fn record_delinquency_action(
        &self,
        loan: &mut LoanAccount,
        action: LoanDelinquencyAction,
        business_date: NaiveDate,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.lock.ensure_unlocked(loan.id)?;
        loan.record_delinquency_action(action, business_date, time_provider)
    }

    pub fn reschedule(
        &self,
        loan: &mut LoanAccount,
        terms: ScheduleGenerationInput,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.lock.ensure_unlocked(loan.id)?;
        loan.reschedule(terms, &self.factory, time_provider)
    }
}

impl Default for LoanCommandService {
    fn default() -> Self {
        Self::new(LoanBatchLock::in_memory(), ScheduleGeneratorFactory::standard())
    }
}
