use std::future::Future;

use chrono::NaiveDate;
use log::{error, info, warn};

use crate::aggregate::{persist_daily, PersistOutcome};
use crate::archive::fetch_and_unpack;
use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::locator::RunKey;
use crate::report::extract_stats;
use crate::reporter::JobReporter;
use crate::store::ArtifactStore;

/// Per-date results of one invocation.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub written: Vec<NaiveDate>,
    pub skipped: Vec<NaiveDate>,
    pub failed: Vec<(NaiveDate, EtlError)>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.written.len() + self.skipped.len() + self.failed.len()
    }

    pub fn success_message(&self) -> String {
        format!(
            "Processed {} date(s): {} written, {} already present",
            self.total(),
            self.written.len(),
            self.skipped.len()
        )
    }

    pub fn failure_message(&self) -> String {
        let details = self
            .failed
            .iter()
            .map(|(date, err)| format!("{date}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");

        format!(
            "{} of {} date(s) failed: {details}",
            self.failed.len(),
            self.total()
        )
    }
}

pub struct Pipeline<'a> {
    store: &'a dyn ArtifactStore,
    config: &'a EtlConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a dyn ArtifactStore, config: &'a EtlConfig) -> Self {
        Self { store, config }
    }

    /// Locates, unpacks, parses and persists the run for one date.
    pub async fn process_date(&self, date: NaiveDate) -> Result<PersistOutcome> {
        let run_key = RunKey::for_date(date, &self.config.labels);
        info!("Processing {date} from archive {run_key}");

        let records = {
            let mut archive = fetch_and_unpack(self.store, &run_key).await?;
            extract_stats(&mut archive)?
        };
        info!("Extracted {} statistics record(s) for {date}", records.len());

        persist_daily(self.store, date, &self.config.envelope_key, &records).await
    }

    /// Processes dates one after another; a failed date does not stop the rest.
    pub async fn run(&self, dates: &[NaiveDate]) -> RunSummary {
        let mut summary = RunSummary::default();

        for &date in dates {
            match self.process_date(date).await {
                Ok(PersistOutcome::Written) => summary.written.push(date),
                Ok(PersistOutcome::Skipped) => summary.skipped.push(date),
                Err(e) => {
                    if e.is_persist() {
                        warn!("Dashboard will have a gap for {date}: {e}");
                    } else {
                        error!("Processing {date} failed: {e}");
                    }
                    summary.failed.push((date, e));
                }
            }
        }

        summary
    }
}

/// Runs `work` and reports its outcome to the CI job exactly once.
///
/// Returns whether the run succeeded; `Err` only when the report itself
/// could not be delivered.
pub async fn handle_invocation<F>(reporter: &dyn JobReporter, job_id: &str, work: F) -> Result<bool>
where
    F: Future<Output = Result<RunSummary>>,
{
    let (succeeded, message) = match work.await {
        Ok(summary) if summary.is_success() => (true, summary.success_message()),
        Ok(summary) => (false, format!("Job failed: {}", summary.failure_message())),
        Err(e) => (false, format!("Job failed: {e}")),
    };

    if succeeded {
        reporter.report_success(job_id, &message).await?;
    } else {
        error!("{message}");
        reporter.report_failure(job_id, &message).await?;
    }

    Ok(succeeded)
}
