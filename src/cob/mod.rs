pub mod lock;
pub mod runner;
pub mod steps;

pub use lock::{CobLockGuard, InMemoryLoanLockStore, LoanBatchLock, LoanLockState, LoanLockStore, LockOwner};
pub use runner::{CobBatchReport, CobOutcome, CobRunner};
pub use steps::{
    ApplyChargeToOverdueLoansStep, CobContext, CobStep, CobStepRegistry, LoanDelinquencyClassificationStep,
};
