use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{LoanError, Result};

/// transaction types that can carry their own payment allocation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PaymentAllocationTransactionType {
    /// fallback used when no rule exists for a transaction type
    Default,
    Repayment,
    DownPayment,
    MerchantIssuedRefund,
    PayoutRefund,
    GoodwillCredit,
    ChargeRefund,
    ChargeAdjustment,
}

/// transaction types that carry a credit allocation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CreditAllocationTransactionType {
    Chargeback,
}

/// loan balance component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AllocationType {
    Penalty,
    Fee,
    Principal,
    Interest,
}

impl AllocationType {
    pub const ALL: [AllocationType; 4] = [
        AllocationType::Penalty,
        AllocationType::Fee,
        AllocationType::Principal,
        AllocationType::Interest,
    ];
}

/// where an installment sits relative to the transaction date
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DueType {
    PastDue,
    Due,
    InAdvance,
}

/// one allocation step: a due type paired with a balance component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PaymentAllocationType {
    PastDuePenalty,
    PastDueFee,
    PastDuePrincipal,
    PastDueInterest,
    DuePenalty,
    DueFee,
    DuePrincipal,
    DueInterest,
    InAdvancePenalty,
    InAdvanceFee,
    InAdvancePrincipal,
    InAdvanceInterest,
}

impl PaymentAllocationType {
    /// every step, in the default allocation order
    pub const ALL: [PaymentAllocationType; 12] = [
        PaymentAllocationType::PastDuePenalty,
        PaymentAllocationType::PastDueFee,
        PaymentAllocationType::PastDuePrincipal,
        PaymentAllocationType::PastDueInterest,
        PaymentAllocationType::DuePenalty,
        PaymentAllocationType::DueFee,
        PaymentAllocationType::DuePrincipal,
        PaymentAllocationType::DueInterest,
        PaymentAllocationType::InAdvancePenalty,
        PaymentAllocationType::InAdvanceFee,
        PaymentAllocationType::InAdvancePrincipal,
        PaymentAllocationType::InAdvanceInterest,
    ];

    pub fn due_type(self) -> DueType {
        use PaymentAllocationType::*;
        match self {
            PastDuePenalty | PastDueFee | PastDuePrincipal | PastDueInterest => DueType::PastDue,
            DuePenalty | DueFee | DuePrincipal | DueInterest => DueType::Due,
            InAdvancePenalty | InAdvanceFee | InAdvancePrincipal | InAdvanceInterest => DueType::InAdvance,
        }
    }

    pub fn allocation_type(self) -> AllocationType {
        use PaymentAllocationType::*;
        match self {
            PastDuePenalty | DuePenalty | InAdvancePenalty => AllocationType::Penalty,
            PastDueFee | DueFee | InAdvanceFee => AllocationType::Fee,
            PastDuePrincipal | DuePrincipal | InAdvancePrincipal => AllocationType::Principal,
            PastDueInterest | DueInterest | InAdvanceInterest => AllocationType::Interest,
        }
    }
}

/// how money for not-yet-due installments is spread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FutureInstallmentAllocationRule {
    /// earliest future installment first
    NextInstallment,
    /// latest installment first, shortening the term
    LastInstallment,
    /// the installment whose period contains the transaction date, otherwise the last one
    NextLastInstallment,
    /// evenly across all future installments
    Reamortization,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentAllocationRule {
    /// persistence id, kept across in-place updates
    pub id: Option<i64>,
    pub transaction_type: PaymentAllocationTransactionType,
    pub future_installment_allocation_rule: FutureInstallmentAllocationRule,
    pub allocation_types: Vec<PaymentAllocationType>,
}

impl PaymentAllocationRule {
    pub fn new(
        transaction_type: PaymentAllocationTransactionType,
        future_installment_allocation_rule: FutureInstallmentAllocationRule,
        allocation_types: Vec<PaymentAllocationType>,
    ) -> Self {
        Self {
            id: None,
            transaction_type,
            future_installment_allocation_rule,
            allocation_types,
        }
    }

    /// rule for `transaction_type` with the default step order
    pub fn standard(transaction_type: PaymentAllocationTransactionType) -> Self {
        Self::new(
            transaction_type,
            FutureInstallmentAllocationRule::NextInstallment,
            PaymentAllocationType::ALL.to_vec(),
        )
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreditAllocationRule {
    pub id: Option<i64>,
    pub transaction_type: CreditAllocationTransactionType,
    pub allocation_types: Vec<AllocationType>,
}

impl CreditAllocationRule {
    pub fn new(transaction_type: CreditAllocationTransactionType, allocation_types: Vec<AllocationType>) -> Self {
        Self {
            id: None,
            transaction_type,
            allocation_types,
        }
    }
}

/// a default rule must exist, types must be unique and every rule must
/// list each allocation step exactly once
pub fn validate_payment_allocation_rules(rules: &[PaymentAllocationRule]) -> Result<()> {
    if !rules
        .iter()
        .any(|r| r.transaction_type == PaymentAllocationTransactionType::Default)
    {
        return Err(invalid("a DEFAULT payment allocation rule is required"));
    }

    let mut seen = BTreeSet::new();
    for rule in rules {
        if !seen.insert(rule.transaction_type) {
            return Err(invalid(&format!(
                "duplicate payment allocation rule for {:?}",
                rule.transaction_type
            )));
        }
        if !lists_each_once(&rule.allocation_types, &PaymentAllocationType::ALL) {
            return Err(invalid(&format!(
                "payment allocation rule for {:?} must list all {} allocation types exactly once",
                rule.transaction_type,
                PaymentAllocationType::ALL.len()
            )));
        }
    }
    Ok(())
}

pub fn validate_credit_allocation_rules(rules: &[CreditAllocationRule]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for rule in rules {
        if !seen.insert(rule.transaction_type) {
            return Err(invalid(&format!(
                "duplicate credit allocation rule for {:?}",
                rule.transaction_type
            )));
        }
        if !lists_each_once(&rule.allocation_types, &AllocationType::ALL) {
            return Err(invalid(&format!(
                "credit allocation rule for {:?} must list all {} allocation types exactly once",
                rule.transaction_type,
                AllocationType::ALL.len()
            )));
        }
    }
    Ok(())
}

fn lists_each_once<T: Ord + Copy>(listed: &[T], all: &[T]) -> bool {
    let unique: BTreeSet<T> = listed.iter().copied().collect();
    listed.len() == all.len() && unique.len() == all.len() && all.iter().all(|t| unique.contains(t))
}

fn invalid(message: &str) -> LoanError {
    LoanError::InvalidAllocationRules {
        message: message.to_string(),
    }
}
