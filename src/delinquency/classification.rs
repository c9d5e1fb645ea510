use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{LoanError, Result};
use crate::schedule::dates::days_between;
use crate::schedule::LoanSchedule;

use super::pause::{effective_periods, paused_days_before, EffectiveDelinquencyPeriod, LoanDelinquencyAction};

/// overdue-days band, e.g. "30-59 days"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelinquencyRange {
    pub classification: String,
    pub min_age_days: i64,
    /// open-ended band when absent
    pub max_age_days: Option<i64>,
}

impl DelinquencyRange {
    pub fn new(classification: impl Into<String>, min_age_days: i64, max_age_days: Option<i64>) -> Self {
        Self {
            classification: classification.into(),
            min_age_days,
            max_age_days,
        }
    }

    pub fn contains(&self, overdue_days: i64) -> bool {
        self.min_age_days <= overdue_days && self.max_age_days.map_or(true, |max| overdue_days <= max)
    }
}

/// named set of ranges, kept sorted by minimum age
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelinquencyBucket {
    pub name: String,
    ranges: Vec<DelinquencyRange>,
}

impl DelinquencyBucket {
    pub fn new(name: impl Into<String>, mut ranges: Vec<DelinquencyRange>) -> Result<Self> {
        if ranges.is_empty() {
            return Err(LoanError::InvalidConfiguration {
                message: "delinquency bucket needs at least one range".to_string(),
            });
        }
        if let Some(range) = ranges
            .iter()
            .find(|r| r.min_age_days < 1 || r.max_age_days.map_or(false, |max| max < r.min_age_days))
        {
            return Err(LoanError::InvalidConfiguration {
                message: format!("invalid delinquency range {}", range.classification),
            });
        }

        ranges.sort_by_key(|r| r.min_age_days);
        Ok(Self {
            name: name.into(),
            ranges,
        })
    }

    /// 1-30, 31-60, 61-90, 91+
    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            ranges: vec![
                DelinquencyRange::new("RANGE_1", 1, Some(30)),
                DelinquencyRange::new("RANGE_30", 31, Some(60)),
                DelinquencyRange::new("RANGE_60", 61, Some(90)),
                DelinquencyRange::new("RANGE_90", 91, None),
            ],
        }
    }

    pub fn ranges(&self) -> &[DelinquencyRange] {
        &self.ranges
    }

    /// first range (by minimum age) containing the overdue days; nothing
    /// when the loan is not overdue
    pub fn classify(&self, overdue_days: i64) -> Option<&DelinquencyRange> {
        if overdue_days <= 0 {
            return None;
        }
        self.ranges.iter().find(|r| r.contains(overdue_days))
    }
}

/// delinquency state of a loan as of a date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelinquencyClassification {
    pub as_of: NaiveDate,
    /// due date of the oldest unpaid installment
    pub overdue_since: Option<NaiveDate>,
    pub paused_days: i64,
    pub overdue_days: i64,
    pub range: Option<DelinquencyRange>,
}

/// overdue days net of pauses, classified against the bucket
pub fn classify_loan(
    schedule: &LoanSchedule,
    actions: &[LoanDelinquencyAction],
    bucket: &DelinquencyBucket,
    as_of: NaiveDate,
) -> DelinquencyClassification {
    let Some(overdue_since) = schedule.oldest_overdue(as_of).map(|i| i.due_date) else {
        return DelinquencyClassification {
            as_of,
            overdue_since: None,
            paused_days: 0,
            overdue_days: 0,
            range: None,
        };
    };

    // only pausing after the installment fell due shifts its age
    let since_overdue: Vec<EffectiveDelinquencyPeriod> = effective_periods(actions)
        .into_iter()
        .filter(|p| p.end_date.map_or(true, |end| end > overdue_since))
        .map(|p| EffectiveDelinquencyPeriod {
            start_date: p.start_date.max(overdue_since),
            end_date: p.end_date,
        })
        .collect();

    let paused_days = paused_days_before(&since_overdue, as_of);
    let overdue_days = (days_between(overdue_since, as_of) - paused_days).max(0);

    DelinquencyClassification {
        as_of,
        overdue_since: Some(overdue_since),
        paused_days,
        overdue_days,
        range: bucket.classify(overdue_days).cloned(),
    }
}
