use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use hourglass_rs::SafeTimeProvider;
use tracing::{debug, info, warn};

use crate::config::CobConfig;
use crate::errors::{LoanError, Result};
use crate::events::Event;
use crate::loan::LoanAccount;
use crate::types::LoanId;

use super::lock::{LoanBatchLock, LockOwner};
use super::steps::{CobContext, CobStep, CobStepRegistry};

/// what happened to one loan in a batch
#[derive(Debug, Clone, PartialEq)]
pub enum CobOutcome {
    Processed,
    /// already closed for the business date or not active
    Skipped,
    Failed(LoanError),
}

/// per-loan outcomes of one batch run
#[derive(Debug, Clone, PartialEq)]
pub struct CobBatchReport {
    pub business_date: NaiveDate,
    pub outcomes: Vec<(LoanId, CobOutcome)>,
}

impl CobBatchReport {
    pub fn processed(&self) -> Vec<LoanId> {
        self.with(|o| matches!(o, CobOutcome::Processed))
    }

    pub fn skipped(&self) -> Vec<LoanId> {
        self.with(|o| matches!(o, CobOutcome::Skipped))
    }

    pub fn failed(&self) -> Vec<(LoanId, LoanError)> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| match outcome {
                CobOutcome::Failed(e) => Some((*id, e.clone())),
                _ => None,
            })
            .collect()
    }

    fn with(&self, keep: impl Fn(&CobOutcome) -> bool) -> Vec<LoanId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| keep(outcome))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// runs the configured steps for each loan while holding its batch lock
pub struct CobRunner {
    steps: Vec<Arc<dyn CobStep>>,
    lock: LoanBatchLock,
    worker_threads: usize,
}

impl CobRunner {
    pub fn new(registry: &CobStepRegistry, config: &CobConfig, lock: LoanBatchLock) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            steps: registry.select(&config.enabled_steps)?,
            lock,
            worker_threads: config.worker_threads,
        })
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn lock(&self) -> &LoanBatchLock {
        &self.lock
    }

    /// run every step for one loan; the lock is released on every exit
    pub fn run_loan(
        &self,
        loan: &mut LoanAccount,
        business_date: NaiveDate,
        owner: LockOwner,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.lock.acquire(loan.id, owner, timestamp)?;
        self.close_day(loan, business_date, timestamp)
    }

    /// catch a single loan up to the business date, closing every day after
    /// the last closed one (or after disbursement) in order. returns the
    /// number of days closed.
    pub fn run_inline(
        &self,
        loan: &mut LoanAccount,
        business_date: NaiveDate,
        time_provider: &SafeTimeProvider,
    ) -> Result<u32> {
        let mut next = match loan.last_closed_business_date() {
            Some(closed) if closed >= business_date => return Ok(0),
            Some(closed) => closed.succ_opt(),
            None => Some(loan.terms.disbursement_date),
        };

        let timestamp = time_provider.now();
        let _guard = self
            .lock
            .acquire(loan.id, LockOwner::LoanInlineCobProcessing, timestamp)?;

        let mut closed = 0;
        while let Some(date) = next.filter(|d| *d <= business_date) {
            self.close_day(loan, date, timestamp)?;
            closed += 1;
            next = date.succ_opt();
        }
        if closed > 1 {
            info!(loan_id = %loan.id, days = closed, %business_date, "loan caught up inline");
        }
        Ok(closed)
    }

    fn close_day(&self, loan: &mut LoanAccount, business_date: NaiveDate, timestamp: DateTime<Utc>) -> Result<()> {
        let context = CobContext {
            business_date,
            timestamp,
        };

        for step in &self.steps {
            step.execute(loan, &context).map_err(|e| {
                warn!(loan_id = %loan.id, step = step.name(), error = %e, "cob step failed");
                LoanError::CobStepFailed {
                    step: step.name().to_string(),
                    message: e.to_string(),
                }
            })?;
        }

        loan.mark_business_day_closed(business_date);
        loan.events.emit(Event::CobCompleted {
            loan_id: loan.id,
            business_date,
            steps: self.step_names(),
            timestamp,
        });
        debug!(loan_id = %loan.id, %business_date, "loan closed for business date");
        Ok(())
    }

    /// partition the loans across scoped workers; each loan is owned by
    /// exactly one worker for the whole run
    pub fn run_batch(
        &self,
        loans: &mut [LoanAccount],
        business_date: NaiveDate,
        time_provider: &SafeTimeProvider,
    ) -> CobBatchReport {
        let timestamp = time_provider.now();
        let chunk_len = loans.len().div_ceil(self.worker_threads).max(1);

        let outcomes: Vec<(LoanId, CobOutcome)> = std::thread::scope(|scope| {
            let handles: Vec<_> = loans
                .chunks_mut(chunk_len)
                .map(|chunk| scope.spawn(move || self.run_chunk(chunk, business_date, timestamp)))
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let report = CobBatchReport {
            business_date,
            outcomes,
        };
        info!(
            %business_date,
            processed = report.processed().len(),
            skipped = report.skipped().len(),
            failed = report.failed().len(),
            "cob batch completed"
        );
        report
    }

    fn run_chunk(
        &self,
        chunk: &mut [LoanAccount],
        business_date: NaiveDate,
        timestamp: DateTime<Utc>,
    ) -> Vec<(LoanId, CobOutcome)> {
        chunk
            .iter_mut()
            .map(|loan| {
                let outcome = if is_closed_for(loan, business_date) || !loan.status().is_active() {
                    CobOutcome::Skipped
                } else {
                    match self.run_loan(loan, business_date, LockOwner::LoanCobChunkProcessing, timestamp) {
                        Ok(()) => CobOutcome::Processed,
                        Err(e) => CobOutcome::Failed(e),
                    }
                };
                (loan.id, outcome)
            })
            .collect()
    }
}

fn is_closed_for(loan: &LoanAccount, business_date: NaiveDate) -> bool {
    loan.last_closed_business_date()
        .map_or(false, |closed| closed >= business_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoanProductConfig;
    use crate::decimal::{Money, Rate};
    use crate::schedule::ScheduleGeneratorFactory;
    use chrono::TimeZone;
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    struct FailingStep;

    impl CobStep for FailingStep {
        fn name(&self) -> &str {
            "FAILING_STEP"
        }

        fn execute(&self, _loan: &mut LoanAccount, _context: &CobContext) -> Result<()> {
            Err(LoanError::CalculationError {
                message: "upstream data missing".to_string(),
            })
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 2, 6, 23, 0, 0).unwrap()))
    }

    fn loan(time: &SafeTimeProvider) -> LoanAccount {
        LoanAccount::disburse(
            LoanProductConfig::personal_loan(Rate::from_percentage(dec!(12)), 12),
            Money::from_major(1_200),
            date(2024, 1, 1),
            &ScheduleGeneratorFactory::standard(),
            time,
        )
        .unwrap()
    }

    fn runner(workers: usize) -> CobRunner {
        let config = CobConfig {
            worker_threads: workers,
            enabled_steps: vec![],
        };
        CobRunner::new(&CobStepRegistry::standard(), &config, LoanBatchLock::in_memory()).unwrap()
    }

    #[test]
    fn test_run_loan_closes_day_and_releases_lock() {
        let time = time();
        let runner = runner(1);
        let mut loan = loan(&time);
        loan.take_events();

        runner
            .run_loan(&mut loan, date(2024, 2, 6), LockOwner::LoanCobChunkProcessing, time.now())
            .unwrap();

        assert_eq!(loan.last_closed_business_date(), Some(date(2024, 2, 6)));
        assert!(!runner.lock().is_locked(loan.id));
        assert_eq!(loan.totals().unwrap().penalty_charges, Money::from_major(25));
        assert!(loan
            .take_events()
            .iter()
            .any(|e| matches!(e, Event::CobCompleted { steps, .. } if steps.len() == 2)));
    }

    #[test]
    fn test_failing_step_named_and_lock_released() {
        let time = time();
        let mut registry = CobStepRegistry::standard();
        registry.register(Arc::new(FailingStep));
        let runner = CobRunner::new(&registry, &CobConfig::default(), LoanBatchLock::in_memory()).unwrap();
        let mut loan = loan(&time);

        let result = runner.run_loan(&mut loan, date(2024, 2, 6), LockOwner::LoanCobChunkProcessing, time.now());

        assert_eq!(
            result,
            Err(LoanError::CobStepFailed {
                step: "FAILING_STEP".to_string(),
                message: "calculation error: upstream data missing".to_string(),
            })
        );
        assert!(!runner.lock().is_locked(loan.id));
        assert_eq!(loan.last_closed_business_date(), None);
    }

    #[test]
    fn test_already_locked_loan_fails_fast() {
        let time = time();
        let runner = runner(1);
        let mut loan = loan(&time);

        runner
            .lock()
            .try_lock(loan.id, LockOwner::LoanInlineCobProcessing, time.now())
            .unwrap();
        let result = runner.run_loan(&mut loan, date(2024, 2, 6), LockOwner::LoanCobChunkProcessing, time.now());

        assert!(matches!(result, Err(LoanError::LoanLockedByCob { .. })));
        assert_eq!(
            runner.lock().lock_state(loan.id).unwrap().owner,
            LockOwner::LoanInlineCobProcessing
        );
    }

    #[test]
    fn test_inline_runs_once_per_business_date() {
        let time = time();
        let runner = runner(1);
        let mut loan = loan(&time);

        // from disbursement on jan 1 through feb 6
        assert_eq!(runner.run_inline(&mut loan, date(2024, 2, 6), &time).unwrap(), 37);
        assert_eq!(runner.run_inline(&mut loan, date(2024, 2, 6), &time).unwrap(), 0);
        assert_eq!(runner.run_inline(&mut loan, date(2024, 2, 7), &time).unwrap(), 1);
        assert!(!runner.lock().is_locked(loan.id));
    }

    #[test]
    fn test_inline_catch_up_charges_skipped_penalty_boundary() {
        let time = time();
        let runner = runner(1);
        let mut loan = loan(&time);
        runner
            .run_loan(&mut loan, date(2024, 1, 31), LockOwner::LoanCobChunkProcessing, time.now())
            .unwrap();

        // feb 6 (due feb 1 plus five grace days) falls inside the gap
        let closed = runner.run_inline(&mut loan, date(2024, 2, 10), &time).unwrap();

        assert_eq!(closed, 10);
        assert_eq!(loan.last_closed_business_date(), Some(date(2024, 2, 10)));
        assert_eq!(loan.totals().unwrap().penalty_charges, Money::from_major(25));
        assert_eq!(loan.delinquency().unwrap().overdue_days, 9);
    }

    #[test]
    fn test_batch_partitions_loans_across_workers() {
        let time = time();
        let runner = runner(3);
        let mut loans: Vec<LoanAccount> = (0..10).map(|_| loan(&time)).collect();

        // one loan is already closed for the day
        runner.run_inline(&mut loans[4], date(2024, 2, 6), &time).unwrap();

        let report = runner.run_batch(&mut loans, date(2024, 2, 6), &time);

        assert_eq!(report.outcomes.len(), 10);
        assert_eq!(report.processed().len(), 9);
        assert_eq!(report.skipped(), vec![loans[4].id]);
        assert!(report.failed().is_empty());
        assert!(runner.lock().locked_loans().is_empty());
        assert!(loans
            .iter()
            .all(|l| l.last_closed_business_date() == Some(date(2024, 2, 6))));
    }

    #[test]
    fn test_batch_reports_locked_loans_as_failed() {
        let time = time();
        let runner = runner(2);
        let mut loans: Vec<LoanAccount> = (0..4).map(|_| loan(&time)).collect();
        let held = loans[1].id;
        runner
            .lock()
            .try_lock(held, LockOwner::LoanInlineCobProcessing, time.now())
            .unwrap();

        let report = runner.run_batch(&mut loans, date(2024, 2, 6), &time);

        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, held);
        assert_eq!(report.processed().len(), 3);
        assert!(runner.lock().is_locked(held));
    }
}
