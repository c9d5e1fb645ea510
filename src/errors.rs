use chrono::NaiveDate;
use thiserror::Error;

use crate::decimal::Money;
use crate::types::{InterestMethod, LoanId, LoanStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoanError {
    #[error("unsupported interest method: {method:?}")]
    UnsupportedInterestMethod {
        method: InterestMethod,
    },

    #[error("loan {loan_id} is locked by {locked_by}, try again after the batch completes")]
    LoanLockedByCob {
        loan_id: LoanId,
        locked_by: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("calculation error: {message}")]
    CalculationError {
        message: String,
    },

    #[error("loan not active: current status is {status:?}")]
    LoanNotActive {
        status: LoanStatus,
    },

    #[error("invalid transaction amount: {amount}")]
    InvalidTransactionAmount {
        amount: Money,
    },

    #[error("no repayment at transaction index {index}")]
    RepaymentNotFound {
        index: usize,
    },

    #[error("invalid delinquency action: {0}")]
    InvalidDelinquencyAction(#[from] DelinquencyActionViolation),

    #[error("invalid allocation rules: {message}")]
    InvalidAllocationRules {
        message: String,
    },

    #[error("cob step {step} failed: {message}")]
    CobStepFailed {
        step: String,
        message: String,
    },
}

/// rejected delinquency pause/resume requests, each with a stable code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelinquencyActionViolation {
    #[error("loan-delinquency-action-invalid-loan-state: delinquency actions need an active loan")]
    InvalidLoanState,

    #[error("loan-delinquency-action-invalid-start-date: resume must start on the business date {business_date}")]
    ResumeStartDateNotBusinessDate {
        business_date: NaiveDate,
    },

    #[error("loan-delinquency-action-resume-should-have-no-end-date")]
    ResumeWithEndDate,

    #[error("loan-delinquency-action-resume-should-be-on-pause")]
    ResumeWithoutActivePause,

    #[error("loan-delinquency-action-resume-already-exists on {date}")]
    DuplicateResume {
        date: NaiveDate,
    },

    #[error("loan-delinquency-action-invalid-end-date: pause end {end} must be after start {start}")]
    PauseEndNotAfterStart {
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("loan-delinquency-action-invalid-start-date: pause start {start} is before disbursement {disbursed_on}")]
    PauseBeforeDisbursement {
        start: NaiveDate,
        disbursed_on: NaiveDate,
    },

    #[error("loan-delinquency-action-overlapping: pause overlaps an existing pause")]
    OverlappingPause,
}

impl DelinquencyActionViolation {
    /// machine readable code (the message prefix)
    pub fn code(&self) -> &'static str {
        match self {
            DelinquencyActionViolation::InvalidLoanState => "loan-delinquency-action-invalid-loan-state",
            DelinquencyActionViolation::ResumeStartDateNotBusinessDate { .. }
            | DelinquencyActionViolation::PauseBeforeDisbursement { .. } => {
                "loan-delinquency-action-invalid-start-date"
            }
            DelinquencyActionViolation::ResumeWithEndDate => "loan-delinquency-action-resume-should-have-no-end-date",
            DelinquencyActionViolation::ResumeWithoutActivePause => {
                "loan-delinquency-action-resume-should-be-on-pause"
            }
            DelinquencyActionViolation::DuplicateResume { .. } => "loan-delinquency-action-resume-already-exists",
            DelinquencyActionViolation::PauseEndNotAfterStart { .. } => "loan-delinquency-action-invalid-end-date",
            DelinquencyActionViolation::OverlappingPause => "loan-delinquency-action-overlapping",
        }
    }
}

pub type Result<T> = std::result::Result<T, LoanError>;
