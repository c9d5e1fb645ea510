pub mod classification;
pub mod pause;
pub mod validator;

pub use classification::{classify_loan, DelinquencyBucket, DelinquencyClassification, DelinquencyRange};
pub use pause::{
    effective_periods, paused_days_before, DelinquencyAction, EffectiveDelinquencyPeriod, LoanDelinquencyAction,
};
pub use validator::{validate_delinquency_action, DelinquencyActionContext};
