use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::allocation::{
    validate_credit_allocation_rules, validate_payment_allocation_rules, AllocationType, CreditAllocationRule,
    CreditAllocationTransactionType, PaymentAllocationRule, PaymentAllocationTransactionType,
};
use crate::decimal::{CurrencyRounding, Money, Rate, RoundingMode};
use crate::delinquency::DelinquencyBucket;
use crate::errors::{LoanError, Result};
use crate::schedule::{GraceSettings, ScheduleGenerationInput};
use crate::types::{AmortizationMethod, InterestCalculationPeriod, InterestMethod, RepaymentFrequency};

/// loan product configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanProductConfig {
    pub name: String,
    pub currency: CurrencyConfig,
    pub schedule_terms: ScheduleTerms,
    pub grace: GraceSettings,
    pub payment_allocation_rules: Vec<PaymentAllocationRule>,
    pub credit_allocation_rules: Vec<CreditAllocationRule>,
    pub delinquency_bucket: DelinquencyBucket,
    pub overdue_penalty: Option<OverduePenaltyConfig>,
}

/// currency settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyConfig {
    pub code: String,
    pub decimal_places: u32,
    pub rounding_mode: RoundingMode,
}

impl CurrencyConfig {
    pub fn rounding(&self) -> CurrencyRounding {
        CurrencyRounding::new(self.decimal_places, self.rounding_mode)
    }
}

/// schedule terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTerms {
    pub interest_method: InterestMethod,
    pub amortization: AmortizationMethod,
    pub interest_calculation_period: InterestCalculationPeriod,
    pub annual_interest_rate: Rate,
    pub frequency: RepaymentFrequency,
    pub repay_every: u32,
    pub number_of_installments: u32,
}

/// penalty charged by close of business once an installment is overdue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverduePenaltyConfig {
    pub amount: Money,
    /// days past the due date before the penalty is charged
    pub grace_days: i64,
}

impl LoanProductConfig {
    /// create personal loan configuration
    pub fn personal_loan(rate: Rate, number_of_installments: u32) -> Self {
        Self {
            name: "personal_loan".to_string(),
            currency: CurrencyConfig {
                code: "USD".to_string(),
                decimal_places: 2,
                rounding_mode: RoundingMode::HalfEven,
            },
            schedule_terms: ScheduleTerms {
                interest_method: InterestMethod::DecliningBalance,
                amortization: AmortizationMethod::EqualInstallments,
                interest_calculation_period: InterestCalculationPeriod::SameAsRepaymentPeriod,
                annual_interest_rate: rate,
                frequency: RepaymentFrequency::Months,
                repay_every: 1,
                number_of_installments,
            },
            grace: GraceSettings::default(),
            payment_allocation_rules: vec![PaymentAllocationRule::standard(PaymentAllocationTransactionType::Default)],
            credit_allocation_rules: vec![],
            delinquency_bucket: DelinquencyBucket::standard(),
            overdue_penalty: Some(OverduePenaltyConfig {
                amount: Money::from_major(25),
                grace_days: 5,
            }),
        }
    }

    /// create weekly flat-interest microloan configuration
    pub fn flat_microloan(rate: Rate, number_of_weeks: u32) -> Self {
        Self {
            name: "flat_microloan".to_string(),
            currency: CurrencyConfig {
                code: "KES".to_string(),
                decimal_places: 0,
                rounding_mode: RoundingMode::HalfUp,
            },
            schedule_terms: ScheduleTerms {
                interest_method: InterestMethod::Flat,
                amortization: AmortizationMethod::EqualInstallments,
                interest_calculation_period: InterestCalculationPeriod::SameAsRepaymentPeriod,
                annual_interest_rate: rate,
                frequency: RepaymentFrequency::Weeks,
                repay_every: 1,
                number_of_installments: number_of_weeks,
            },
            grace: GraceSettings {
                principal_periods: 1,
                interest_free_periods: 0,
            },
            payment_allocation_rules: vec![
                PaymentAllocationRule::standard(PaymentAllocationTransactionType::Default),
                PaymentAllocationRule::standard(PaymentAllocationTransactionType::GoodwillCredit),
            ],
            credit_allocation_rules: vec![CreditAllocationRule::new(
                CreditAllocationTransactionType::Chargeback,
                vec![
                    AllocationType::Penalty,
                    AllocationType::Fee,
                    AllocationType::Interest,
                    AllocationType::Principal,
                ],
            )],
            delinquency_bucket: DelinquencyBucket::standard(),
            overdue_penalty: None,
        }
    }

    /// load configuration from json
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| LoanError::InvalidConfiguration {
            message: format!("invalid loan product json: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LoanError::InvalidConfiguration {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        let terms = &self.schedule_terms;
        if terms.interest_method == InterestMethod::Invalid {
            return Err(LoanError::UnsupportedInterestMethod {
                method: terms.interest_method,
            });
        }
        if self.currency.decimal_places > 8 {
            return Err(LoanError::InvalidConfiguration {
                message: format!("{} decimal places is more than money carries", self.currency.decimal_places),
            });
        }
        if let Some(penalty) = &self.overdue_penalty {
            if !penalty.amount.is_positive() || penalty.grace_days < 0 {
                return Err(LoanError::InvalidConfiguration {
                    message: "overdue penalty needs a positive amount and non-negative grace".to_string(),
                });
            }
        }

        validate_payment_allocation_rules(&self.payment_allocation_rules)?;
        validate_credit_allocation_rules(&self.credit_allocation_rules)?;

        // deserialized buckets skip the constructor checks
        DelinquencyBucket::new(
            self.delinquency_bucket.name.clone(),
            self.delinquency_bucket.ranges().to_vec(),
        )?;

        // terms are checked with a nominal principal
        self.schedule_input(Money::ONE, NaiveDate::MIN).validate()
    }

    /// generation input for one disbursement under this product
    pub fn schedule_input(&self, principal: Money, disbursement_date: NaiveDate) -> ScheduleGenerationInput {
        let terms = &self.schedule_terms;
        ScheduleGenerationInput {
            principal,
            annual_interest_rate: terms.annual_interest_rate,
            frequency: terms.frequency,
            repay_every: terms.repay_every,
            disbursement_date,
            first_repayment_on: None,
            interest_charged_from: None,
            number_of_installments: terms.number_of_installments,
            amortization: terms.amortization,
            interest_calculation_period: terms.interest_calculation_period,
            grace: self.grace,
            rounding: self.currency.rounding(),
        }
    }
}

/// close-of-business configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CobConfig {
    /// scoped worker threads per batch run
    pub worker_threads: usize,
    /// step names to run in order; empty runs every registered step
    pub enabled_steps: Vec<String>,
}

impl Default for CobConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            enabled_steps: vec![],
        }
    }
}

impl CobConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| LoanError::InvalidConfiguration {
            message: format!("invalid cob json: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(LoanError::InvalidConfiguration {
                message: "cob needs at least one worker thread".to_string(),
            });
        }
        Ok(())
    }
}
