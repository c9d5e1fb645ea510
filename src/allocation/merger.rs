use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use tracing::debug;

use super::rules::{
    CreditAllocationRule, CreditAllocationTransactionType, PaymentAllocationRule, PaymentAllocationTransactionType,
};

/// a rule keyed by its transaction type
pub trait AllocationRule: Clone {
    type Key: Ord + Copy + Debug;

    fn key(&self) -> Self::Key;

    /// configuration equality, ignoring persistence ids
    fn same_configuration(&self, other: &Self) -> bool;

    /// take the configuration of `other`, keeping identity
    fn update_from(&mut self, other: &Self);
}

impl AllocationRule for PaymentAllocationRule {
    type Key = PaymentAllocationTransactionType;

    fn key(&self) -> Self::Key {
        self.transaction_type
    }

    fn same_configuration(&self, other: &Self) -> bool {
        self.future_installment_allocation_rule == other.future_installment_allocation_rule
            && self.allocation_types == other.allocation_types
    }

    fn update_from(&mut self, other: &Self) {
        self.future_installment_allocation_rule = other.future_installment_allocation_rule;
        self.allocation_types = other.allocation_types.clone();
    }
}

impl AllocationRule for CreditAllocationRule {
    type Key = CreditAllocationTransactionType;

    fn key(&self) -> Self::Key {
        self.transaction_type
    }

    fn same_configuration(&self, other: &Self) -> bool {
        self.allocation_types == other.allocation_types
    }

    fn update_from(&mut self, other: &Self) {
        self.allocation_types = other.allocation_types.clone();
    }
}

/// merged rule set plus whether anything changed
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<R> {
    pub rules: Vec<R>,
    pub changed: bool,
}

/// reconcile persisted rules with a submitted set.
///
/// `None` leaves the existing rules untouched. otherwise rules whose type
/// was dropped are removed, new types are appended in submission order and
/// rules present in both are updated in place only when their
/// configuration differs. a type submitted twice resolves to the last entry.
pub fn merge_allocation_rules<R: AllocationRule>(existing: &[R], incoming: Option<&[R]>) -> MergeOutcome<R> {
    let Some(incoming) = incoming else {
        return MergeOutcome {
            rules: existing.to_vec(),
            changed: false,
        };
    };

    let mut submitted: BTreeMap<R::Key, &R> = BTreeMap::new();
    let mut submission_order = Vec::new();
    for rule in incoming {
        if submitted.insert(rule.key(), rule).is_none() {
            submission_order.push(rule.key());
        }
    }

    let mut changed = false;
    let mut persisted = BTreeSet::new();
    let mut rules = Vec::with_capacity(submitted.len());

    for rule in existing {
        let key = rule.key();
        if !persisted.insert(key) {
            // second persisted rule for the same type
            changed = true;
            continue;
        }
        match submitted.get(&key) {
            None => {
                debug!(transaction_type = ?key, "removing allocation rule");
                changed = true;
            }
            Some(update) if rule.same_configuration(update) => rules.push(rule.clone()),
            Some(update) => {
                debug!(transaction_type = ?key, "updating allocation rule");
                let mut merged = rule.clone();
                merged.update_from(update);
                rules.push(merged);
                changed = true;
            }
        }
    }

    for key in submission_order {
        if persisted.contains(&key) {
            continue;
        }
        if let Some(rule) = submitted.get(&key) {
            debug!(transaction_type = ?key, "adding allocation rule");
            rules.push((*rule).clone());
            changed = true;
        }
    }

    MergeOutcome { rules, changed }
}

pub fn merge_payment_allocation_rules(
    existing: &[PaymentAllocationRule],
    incoming: Option<&[PaymentAllocationRule]>,
) -> MergeOutcome<PaymentAllocationRule> {
    merge_allocation_rules(existing, incoming)
}

pub fn merge_credit_allocation_rules(
    existing: &[CreditAllocationRule],
    incoming: Option<&[CreditAllocationRule]>,
) -> MergeOutcome<CreditAllocationRule> {
    merge_allocation_rules(existing, incoming)
}
