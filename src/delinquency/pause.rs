use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::schedule::dates::days_between;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DelinquencyAction {
    Pause,
    Resume,
}

/// one entry of the append-only delinquency action log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanDelinquencyAction {
    pub action: DelinquencyAction,
    pub start_date: NaiveDate,
    /// open-ended when absent; always absent for resumes
    pub end_date: Option<NaiveDate>,
}

impl LoanDelinquencyAction {
    pub fn pause(start_date: NaiveDate, end_date: Option<NaiveDate>) -> Self {
        Self {
            action: DelinquencyAction::Pause,
            start_date,
            end_date,
        }
    }

    pub fn resume(start_date: NaiveDate) -> Self {
        Self {
            action: DelinquencyAction::Resume,
            start_date,
            end_date: None,
        }
    }
}

/// pause interval derived from the action log; never stored on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectiveDelinquencyPeriod {
    pub start_date: NaiveDate,
    /// `None` while the pause is open-ended
    pub end_date: Option<NaiveDate>,
}

impl EffectiveDelinquencyPeriod {
    /// `date` within [start, end)
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date.map_or(true, |end| date < end)
    }

    /// strict overlap; periods that only touch do not overlap
    pub fn overlaps(&self, start: NaiveDate, end: Option<NaiveDate>) -> bool {
        let starts_before_other_ends = end.map_or(true, |end| self.start_date < end);
        let other_starts_before_end = self.end_date.map_or(true, |own_end| start < own_end);
        starts_before_other_ends && other_starts_before_end
    }
}

/// one period per pause, in log order. a pause is cut short by the first
/// resume (in log order) that starts inside it.
pub fn effective_periods(actions: &[LoanDelinquencyAction]) -> Vec<EffectiveDelinquencyPeriod> {
    let resumes: Vec<&LoanDelinquencyAction> = actions
        .iter()
        .filter(|a| a.action == DelinquencyAction::Resume)
        .collect();

    actions
        .iter()
        .filter(|a| a.action == DelinquencyAction::Pause)
        .map(|pause| {
            let resumed_on = resumes
                .iter()
                .find(|resume| {
                    pause.start_date <= resume.start_date
                        && pause.end_date.map_or(true, |end| resume.start_date <= end)
                })
                .map(|resume| resume.start_date);

            EffectiveDelinquencyPeriod {
                start_date: pause.start_date,
                end_date: resumed_on.or(pause.end_date),
            }
        })
        .collect()
}

/// days paused before `as_of`; closed periods count in full, running
/// periods count up to `as_of`, future periods count nothing
pub fn paused_days_before(periods: &[EffectiveDelinquencyPeriod], as_of: NaiveDate) -> i64 {
    periods
        .iter()
        .map(|period| match period.end_date {
            Some(end) if end < as_of => days_between(period.start_date, end),
            _ if period.start_date < as_of => days_between(period.start_date, as_of),
            _ => 0,
        })
        .sum()
}
