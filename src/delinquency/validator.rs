use chrono::NaiveDate;

use crate::errors::DelinquencyActionViolation;
use crate::types::LoanStatus;

use super::pause::{effective_periods, DelinquencyAction, LoanDelinquencyAction};

/// loan facts a new delinquency action is checked against
#[derive(Debug, Clone, Copy)]
pub struct DelinquencyActionContext<'a> {
    pub loan_status: LoanStatus,
    pub disbursement_date: NaiveDate,
    pub business_date: NaiveDate,
    pub existing_actions: &'a [LoanDelinquencyAction],
}

/// check a new pause or resume before it is appended to the log
pub fn validate_delinquency_action(
    action: &LoanDelinquencyAction,
    context: &DelinquencyActionContext<'_>,
) -> Result<(), DelinquencyActionViolation> {
    if !context.loan_status.is_active() {
        return Err(DelinquencyActionViolation::InvalidLoanState);
    }

    let periods = effective_periods(context.existing_actions);

    match action.action {
        DelinquencyAction::Resume => {
            if action.start_date != context.business_date {
                return Err(DelinquencyActionViolation::ResumeStartDateNotBusinessDate {
                    business_date: context.business_date,
                });
            }
            if action.end_date.is_some() {
                return Err(DelinquencyActionViolation::ResumeWithEndDate);
            }
            if !periods.iter().any(|p| p.is_active_on(action.start_date)) {
                return Err(DelinquencyActionViolation::ResumeWithoutActivePause);
            }
            let duplicate = context
                .existing_actions
                .iter()
                .any(|a| a.action == DelinquencyAction::Resume && a.start_date == action.start_date);
            if duplicate {
                return Err(DelinquencyActionViolation::DuplicateResume {
                    date: action.start_date,
                });
            }
        }
        DelinquencyAction::Pause => {
            if let Some(end) = action.end_date {
                if end <= action.start_date {
                    return Err(DelinquencyActionViolation::PauseEndNotAfterStart {
                        start: action.start_date,
                        end,
                    });
                }
            }
            if action.start_date < context.disbursement_date {
                return Err(DelinquencyActionViolation::PauseBeforeDisbursement {
                    start: action.start_date,
                    disbursed_on: context.disbursement_date,
                });
            }
            if periods.iter().any(|p| p.overlaps(action.start_date, action.end_date)) {
                return Err(DelinquencyActionViolation::OverlappingPause);
            }
            // a logged resume inside the window would cut this pause short
            let swallows_resume = context.existing_actions.iter().any(|a| {
                a.action == DelinquencyAction::Resume
                    && action.start_date <= a.start_date
                    && action.end_date.map_or(true, |end| a.start_date <= end)
            });
            if swallows_resume {
                return Err(DelinquencyActionViolation::OverlappingPause);
            }
        }
    }

    Ok(())
}
