use chrono::{Datelike, Days, NaiveDate, Weekday};
use clap::ValueEnum;

use crate::error::{EtlError, Result};

/// Which calendar day an invocation without an explicit date reports on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RunDay {
    /// Nightly schedule: the job fires after midnight and reports the previous day.
    #[default]
    Yesterday,
    Today,
}

/// Environment label used in archive names, optionally different on weekends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPolicy {
    pub weekday: String,
    pub weekend: Option<String>,
}

impl LabelPolicy {
    pub fn new(weekday: impl Into<String>, weekend: Option<String>) -> Self {
        Self {
            weekday: weekday.into(),
            weekend,
        }
    }

    pub fn label_for(&self, date: NaiveDate) -> &str {
        match (date.weekday(), &self.weekend) {
            (Weekday::Sat | Weekday::Sun, Some(weekend)) => weekend,
            _ => &self.weekday,
        }
    }
}

/// Object-storage key of one day's test-run archive: `<yyyy>-<mm>-<dd>-<label>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey(String);

impl RunKey {
    pub fn new(date: NaiveDate, label: &str) -> Self {
        Self(format!("{}-{label}", date.format("%Y-%m-%d")))
    }

    pub fn for_date(date: NaiveDate, labels: &LabelPolicy) -> Self {
        Self::new(date, labels.label_for(date))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| EtlError::InvalidDate(format!("'{value}' is not a YYYY-MM-DD date: {e}")))
}

/// Picks the run date: an explicit date wins, otherwise `day` relative to `today`.
///
/// Explicit dates after `today` are rejected; no archive can exist for them yet.
pub fn resolve_run_date(today: NaiveDate, day: RunDay, explicit: Option<&str>) -> Result<NaiveDate> {
    if let Some(value) = explicit {
        let date = parse_date(value)?;
        if date > today {
            return Err(EtlError::InvalidDate(format!(
                "{date} is after the invocation date {today}"
            )));
        }
        return Ok(date);
    }

    match day {
        RunDay::Today => Ok(today),
        RunDay::Yesterday => today
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| EtlError::InvalidDate(format!("no day before {today}"))),
    }
}

/// Inclusive date range for backfills.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>> {
    if from > to {
        return Err(EtlError::InvalidDate(format!(
            "range start {from} is after range end {to}"
        )));
    }

    Ok(from.iter_days().take_while(|d| *d <= to).collect())
}
