use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

use crate::errors::{LoanError, Result};
use crate::loan::{LoanAccount, LoanCharge};

pub const APPLY_CHARGE_TO_OVERDUE_LOANS: &str = "APPLY_CHARGE_TO_OVERDUE_LOANS";
pub const LOAN_DELINQUENCY_CLASSIFICATION: &str = "LOAN_DELINQUENCY_CLASSIFICATION";

/// what a step knows about the run it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CobContext {
    pub business_date: NaiveDate,
    /// run start, stamped on every event the run emits
    pub timestamp: DateTime<Utc>,
}

/// one unit of close-of-business work applied to a single loan
pub trait CobStep: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, loan: &mut LoanAccount, context: &CobContext) -> Result<()>;
}

/// charges the product's overdue penalty on the day an installment runs
/// past its grace days
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyChargeToOverdueLoansStep;

impl CobStep for ApplyChargeToOverdueLoansStep {
    fn name(&self) -> &str {
        APPLY_CHARGE_TO_OVERDUE_LOANS
    }

    fn execute(&self, loan: &mut LoanAccount, context: &CobContext) -> Result<()> {
        let Some(penalty) = loan.product.overdue_penalty.clone() else {
            return Ok(());
        };
        if !loan.status().is_active() {
            return Ok(());
        }

        let mut due_dates = Vec::new();
        for installment in loan.schedule().installments.iter().filter(|i| !i.is_fully_paid()) {
            let charge_on = installment
                .due_date
                .checked_add_signed(Duration::days(penalty.grace_days))
                .ok_or_else(|| LoanError::InvalidDate {
                    message: format!("penalty date overflows after {}", installment.due_date),
                })?;
            // exactly one run crosses the grace boundary
            if charge_on == context.business_date {
                due_dates.push(installment.due_date);
            }
        }

        for due_date in due_dates {
            let number = loan.apply_charge_at(LoanCharge::penalty(penalty.amount, due_date), context.timestamp)?;
            debug!(loan_id = %loan.id, installment = number, "overdue penalty charged");
        }
        Ok(())
    }
}

/// classifies the loan against its product's delinquency bucket
#[derive(Debug, Clone, Copy, Default)]
pub struct LoanDelinquencyClassificationStep;

impl CobStep for LoanDelinquencyClassificationStep {
    fn name(&self) -> &str {
        LOAN_DELINQUENCY_CLASSIFICATION
    }

    fn execute(&self, loan: &mut LoanAccount, context: &CobContext) -> Result<()> {
        if loan.status().is_active() {
            loan.classify_delinquency_at(context.business_date, context.timestamp);
        }
        Ok(())
    }
}

/// ordered registration table of close-of-business steps, built at startup
#[derive(Clone, Default)]
pub struct CobStepRegistry {
    steps: Vec<Arc<dyn CobStep>>,
}

impl CobStepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// charges first so classification sees them
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ApplyChargeToOverdueLoansStep));
        registry.register(Arc::new(LoanDelinquencyClassificationStep));
        registry
    }

    /// append a step, or replace the step with the same name in place
    pub fn register(&mut self, step: Arc<dyn CobStep>) {
        match self.steps.iter_mut().find(|s| s.name() == step.name()) {
            Some(existing) => *existing = step,
            None => self.steps.push(step),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CobStep>> {
        self.steps.iter().find(|s| s.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    /// steps for the given names in that order; no names selects every step
    pub fn select(&self, names: &[String]) -> Result<Vec<Arc<dyn CobStep>>> {
        if names.is_empty() {
            return Ok(self.steps.clone());
        }
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| LoanError::InvalidConfiguration {
                    message: format!("unknown cob step {}", name),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoanProductConfig;
    use crate::decimal::{Money, Rate};
    use crate::schedule::ScheduleGeneratorFactory;
    use chrono::TimeZone;
    use hourglass_rs::{SafeTimeProvider, TimeSource};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn loan() -> LoanAccount {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        LoanAccount::disburse(
            LoanProductConfig::personal_loan(Rate::from_percentage(dec!(12)), 12),
            Money::from_major(1_200),
            date(2024, 1, 1),
            &ScheduleGeneratorFactory::standard(),
            &time,
        )
        .unwrap()
    }

    fn context(business_date: NaiveDate) -> CobContext {
        CobContext {
            business_date,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_registry_order_and_replace() {
        let mut registry = CobStepRegistry::standard();
        assert_eq!(
            registry.names(),
            vec![APPLY_CHARGE_TO_OVERDUE_LOANS, LOAN_DELINQUENCY_CLASSIFICATION]
        );

        registry.register(Arc::new(ApplyChargeToOverdueLoansStep));
        assert_eq!(registry.names().len(), 2);
        assert_eq!(registry.names()[0], APPLY_CHARGE_TO_OVERDUE_LOANS);
    }

    #[test]
    fn test_select_by_name() {
        let registry = CobStepRegistry::standard();
        assert_eq!(registry.select(&[]).unwrap().len(), 2);

        let selected = registry
            .select(&[LOAN_DELINQUENCY_CLASSIFICATION.to_string()])
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), LOAN_DELINQUENCY_CLASSIFICATION);

        assert!(matches!(
            registry.select(&["NOT_A_STEP".to_string()]),
            Err(LoanError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_overdue_penalty_charged_once_after_grace() {
        let mut loan = loan();
        let step = ApplyChargeToOverdueLoansStep;

        // first installment due feb 1, five grace days
        step.execute(&mut loan, &context(date(2024, 2, 5))).unwrap();
        assert_eq!(loan.totals().unwrap().penalty_charges, Money::ZERO);

        step.execute(&mut loan, &context(date(2024, 2, 6))).unwrap();
        step.execute(&mut loan, &context(date(2024, 2, 7))).unwrap();

        let schedule = loan.schedule();
        assert_eq!(schedule.installments[0].penalty_charges, Money::from_major(25));
        assert_eq!(loan.totals().unwrap().penalty_charges, Money::from_major(25));
    }

    #[test]
    fn test_classification_step_stores_result() {
        let mut loan = loan();
        LoanDelinquencyClassificationStep
            .execute(&mut loan, &context(date(2024, 2, 11)))
            .unwrap();
        assert_eq!(loan.delinquency().unwrap().overdue_days, 10);
    }
}
