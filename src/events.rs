use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::allocation::{CreditAllocationTransactionType, PaymentAllocationTransactionType};
use crate::decimal::Money;
use crate::delinquency::DelinquencyAction;
use crate::loan::ChargeKind;
use crate::types::{InterestMethod, LoanId, LoanStatus};

/// all events that can be emitted by a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanDisbursed {
        loan_id: LoanId,
        principal: Money,
        disbursement_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        timestamp: DateTime<Utc>,
    },

    // schedule events
    ScheduleGenerated {
        loan_id: LoanId,
        interest_method: InterestMethod,
        installments: u32,
        total_interest: Money,
        maturity_date: Option<NaiveDate>,
        timestamp: DateTime<Utc>,
    },

    // transaction events
    ChargeApplied {
        loan_id: LoanId,
        kind: ChargeKind,
        amount: Money,
        due_date: NaiveDate,
        installment_number: u32,
        timestamp: DateTime<Utc>,
    },
    RepaymentAllocated {
        loan_id: LoanId,
        transaction_type: PaymentAllocationTransactionType,
        amount: Money,
        applied_to_principal: Money,
        applied_to_interest: Money,
        applied_to_fees: Money,
        applied_to_penalties: Money,
        excess: Money,
        timestamp: DateTime<Utc>,
    },

    ChargebackPosted {
        loan_id: LoanId,
        repayment_index: usize,
        amount: Money,
        installment_number: u32,
        credited_principal: Money,
        credited_interest: Money,
        credited_fees: Money,
        credited_penalties: Money,
        timestamp: DateTime<Utc>,
    },

    // configuration events
    AllocationRulesUpdated {
        loan_id: LoanId,
        payment_rules: Vec<PaymentAllocationTransactionType>,
        credit_rules: Vec<CreditAllocationTransactionType>,
        timestamp: DateTime<Utc>,
    },

    // delinquency events
    DelinquencyActionRecorded {
        loan_id: LoanId,
        action: DelinquencyAction,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        timestamp: DateTime<Utc>,
    },
    DelinquencyClassified {
        loan_id: LoanId,
        classification: Option<String>,
        overdue_days: i64,
        as_of: NaiveDate,
        timestamp: DateTime<Utc>,
    },

    // close of business events
    CobCompleted {
        loan_id: LoanId,
        business_date: NaiveDate,
        steps: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
