pub mod merger;
pub mod processor;
pub mod rules;

pub use merger::{
    merge_allocation_rules, merge_credit_allocation_rules, merge_payment_allocation_rules, AllocationRule,
    MergeOutcome,
};
pub use processor::{
    allocate_credit, AllocatedPortion, ComponentAmounts, CreditAllocation, PaymentAllocator, RepaymentAllocation,
};
pub use rules::{
    validate_credit_allocation_rules, validate_payment_allocation_rules, AllocationType, CreditAllocationRule,
    CreditAllocationTransactionType, DueType, FutureInstallmentAllocationRule, PaymentAllocationRule,
    PaymentAllocationTransactionType, PaymentAllocationType,
};
