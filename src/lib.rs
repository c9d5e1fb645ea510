pub mod allocation;
pub mod cob;
pub mod commands;
pub mod config;
pub mod decimal;
pub mod delinquency;
pub mod errors;
pub mod events;
pub mod loan;
pub mod memo;
pub mod schedule;
pub mod types;

// re-export key types
pub use allocation::{
    allocate_credit, merge_credit_allocation_rules, merge_payment_allocation_rules, AllocationType, ComponentAmounts,
    CreditAllocation, CreditAllocationRule, CreditAllocationTransactionType, FutureInstallmentAllocationRule,
    PaymentAllocationRule, PaymentAllocationTransactionType, PaymentAllocationType, PaymentAllocator, RepaymentAllocation,
};
pub use cob::{CobBatchReport, CobRunner, CobStep, CobStepRegistry, LoanBatchLock, LockOwner};
pub use commands::{CommandResult, LoanCommand, LoanCommandService};
pub use config::{CobConfig, CurrencyConfig, LoanProductConfig, ScheduleTerms};
pub use decimal::{CurrencyRounding, Money, Rate, RoundingMode};
pub use delinquency::{
    effective_periods, DelinquencyBucket, DelinquencyClassification, DelinquencyRange, EffectiveDelinquencyPeriod,
    LoanDelinquencyAction,
};
pub use errors::{DelinquencyActionViolation, LoanError, Result};
pub use events::{Event, EventStore};
pub use loan::{ChargeKind, LoanAccount, LoanCharge, LoanTransaction};
pub use memo::{HashMode, MemoizedValue, Snapshot};
pub use schedule::{
    grace_period_fraction, GraceSettings, Installment, LoanSchedule, ScheduleGenerationInput, ScheduleGenerator,
    ScheduleGeneratorFactory, ScheduleTotals,
};
pub use types::{
    AmortizationMethod, InterestCalculationPeriod, InterestMethod, LoanId, LoanStatus, RepaymentFrequency,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
