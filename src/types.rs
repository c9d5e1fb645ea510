use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// repayment frequency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepaymentFrequency {
    Days,
    Weeks,
    Months,
    Years,
    /// unrecognized frequency; every calculation treats it as zero
    Invalid,
}

impl RepaymentFrequency {
    /// map a numeric frequency code (0 days, 1 weeks, 2 months, 3 years)
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => RepaymentFrequency::Days,
            1 => RepaymentFrequency::Weeks,
            2 => RepaymentFrequency::Months,
            3 => RepaymentFrequency::Years,
            _ => RepaymentFrequency::Invalid,
        }
    }
}

/// interest method used to build a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InterestMethod {
    /// interest on the original principal for the whole term
    Flat,
    /// interest on the outstanding balance of each period
    DecliningBalance,
    Invalid,
}

/// how principal is spread across installments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmortizationMethod {
    /// equal payment amounts throughout term
    EqualInstallments,
    /// equal principal, interest declines
    EqualPrincipal,
}

/// basis for the per-period interest rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterestCalculationPeriod {
    /// annual rate / periods per year * repay every
    SameAsRepaymentPeriod,
    /// annual rate / 365 * actual days in period
    Daily,
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// approved, not yet disbursed
    Approved,
    /// disbursed and performing
    Active,
    /// fully repaid
    ClosedObligationsMet,
    /// repaid beyond the outstanding amount
    Overpaid,
    WrittenOff,
}

impl LoanStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Active)
    }
}
