/// close of business - run a batch over several loans and see commands refused while a loan is locked
use loan_servicing_rs::{
    CobConfig, CobRunner, CobStepRegistry, LoanAccount, LoanBatchLock, LoanCharge, LoanCommand,
    LoanCommandService, LoanProductConfig, LockOwner, Money, Rate, SafeTimeProvider, ScheduleGeneratorFactory,
    TimeSource,
};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== close of business example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
    let controller = time.test_control().unwrap();
    let lock = LoanBatchLock::in_memory();
    let service = LoanCommandService::new(lock.clone(), ScheduleGeneratorFactory::standard());
    let runner = CobRunner::new(&CobStepRegistry::standard(), &CobConfig::default(), lock.clone())?;

    let disbursed = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut loans = (1..=8)
        .map(|i| {
            LoanAccount::disburse(
                LoanProductConfig::personal_loan(Rate::from_percentage(dec!(12)), 12),
                Money::from_major(1_000 * i),
                disbursed,
                service.factory(),
                &time,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    // nobody pays; first installments fall due feb 1
    controller.advance(Duration::days(40));
    let business_date = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();

    let report = runner.run_batch(&mut loans, business_date, &time);
    println!("processed: {}, failed: {}", report.processed().len(), report.failed().len());

    for loan in &loans {
        let classification = loan.delinquency().and_then(|d| d.range.as_ref());
        println!(
            "loan {} overdue {} days ({})",
            loan.id,
            loan.delinquency().map_or(0, |d| d.overdue_days),
            classification.map_or("current", |r| r.classification.as_str())
        );
    }

    // a loan held by close of business refuses interactive commands
    let loan = &mut loans[0];
    lock.try_lock(loan.id, LockOwner::LoanInlineCobProcessing, time.now())?;
    let refused = service.execute(
        loan,
        LoanCommand::ApplyCharge(LoanCharge::fee(Money::from_major(15), business_date)),
        &time,
    );
    println!("\nwhile locked: {:?}", refused.err());

    lock.release(loan.id);
    let accepted = service.execute(
        loan,
        LoanCommand::ApplyCharge(LoanCharge::fee(Money::from_major(15), business_date)),
        &time,
    )?;
    println!("after release: {:?}", accepted);

    Ok(())
}
