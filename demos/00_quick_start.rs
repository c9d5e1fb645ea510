/// quick start - disburse a loan, take a payment and print the schedule
use loan_servicing_rs::{
    LoanAccount, LoanProductConfig, Money, PaymentAllocationTransactionType, Rate, SafeTimeProvider,
    ScheduleGeneratorFactory, TimeSource,
};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
    let factory = ScheduleGeneratorFactory::standard();

    // $10,000 over 12 months at 12%
    let mut loan = LoanAccount::disburse(
        LoanProductConfig::personal_loan(Rate::from_percentage(dec!(12)), 12),
        Money::from_major(10_000),
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        &factory,
        &time,
    )?;

    // pay the first installment on its due date
    let first = loan.schedule().installments[0].clone();
    let allocation = loan.post_repayment(
        PaymentAllocationTransactionType::Repayment,
        first.total_due(),
        first.due_date,
        &time,
    )?;
    println!(
        "paid {}: principal {}, interest {}",
        allocation.amount, allocation.to_principal, allocation.to_interest
    );

    // print current schedule
    println!("{}", serde_json::to_string_pretty(&*loan.schedule())?);
    println!("outstanding: {}", loan.totals()?.outstanding);

    Ok(())
}
