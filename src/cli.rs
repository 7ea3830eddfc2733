use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;

use crate::aggregate::merge_records;
use crate::archive::Archive;
use crate::auth::Token;
use crate::config::{EtlConfig, DEFAULT_ENVELOPE_KEY, DEFAULT_LABEL};
use crate::error::EtlError;
use crate::event::{job_id_from_event, SCHEDULED_JOB_ID};
use crate::locator::{date_range, parse_date, resolve_run_date, RunDay};
use crate::pipeline::{handle_invocation, Pipeline, RunSummary};
use crate::report::{extract_stats, StatRecord};
use crate::reporter::{HttpJobReporter, JobReporter, LogJobReporter};
use crate::store::ObjectArtifactStore;

#[derive(Parser)]
#[command(name = "reportetl")]
#[command(author, version, about = "Nightly test-report ETL", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output file path for `inspect` (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Args)]
struct StoreArgs {
    /// Object store holding the archives, e.g. "s3://bucket?region=eu-west-1"
    #[arg(short, long, env = "REPORTETL_STORE")]
    store: String,

    /// Environment label in archive names
    #[arg(short, long, env = "REPORTETL_LABEL", default_value = DEFAULT_LABEL)]
    label: String,

    /// Label used on Saturdays and Sundays (defaults to --label)
    #[arg(long, env = "REPORTETL_WEEKEND_LABEL")]
    weekend_label: Option<String>,

    /// Key of the primary record in the daily JSON document
    #[arg(long, default_value = DEFAULT_ENVELOPE_KEY)]
    envelope_key: String,
}

#[derive(Args)]
struct JobArgs {
    /// CI job id to report the result against
    #[arg(short, long, env = "REPORTETL_JOB_ID", conflicts_with = "event")]
    job_id: Option<String>,

    /// Invocation event JSON file carrying the job id
    #[arg(short, long)]
    event: Option<PathBuf>,

    /// Base URL of the CI job-status endpoint (logs the result when omitted)
    #[arg(long, env = "REPORTETL_REPORT_URL")]
    report_url: Option<String>,

    /// Bearer token for the job-status endpoint
    #[arg(long, env = "REPORTETL_REPORT_TOKEN", hide_env_values = true)]
    report_token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one day's test run
    Run {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        job: JobArgs,

        /// Day to report on when no --date is given
        #[arg(long, value_enum, default_value_t = RunDay::Yesterday)]
        day: RunDay,

        /// Explicit run date (YYYY-MM-DD) for reprocessing
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Process every day in an inclusive date range
    Backfill {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        job: JobArgs,

        /// First date (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last date (YYYY-MM-DD)
        #[arg(long)]
        to: String,
    },
    /// Print the statistics found in a local archive without writing anything
    Inspect {
        /// Path to a test-run zip archive
        archive: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct Inspection {
    archive: String,
    records: Vec<StatRecord>,
    merged: Vec<StatRecord>,
}

impl JobArgs {
    fn job_id(&self) -> Result<String> {
        if let Some(job_id) = &self.job_id {
            return Ok(job_id.clone());
        }

        if let Some(path) = &self.event {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read event file {}", path.display()))?;
            if let Some(job_id) = job_id_from_event(&json)? {
                return Ok(job_id);
            }
        }

        Ok(SCHEDULED_JOB_ID.to_string())
    }

    fn reporter(&self) -> Result<Box<dyn JobReporter>> {
        match &self.report_url {
            Some(url) => {
                let token = self.report_token.as_deref().map(Token::from);
                Ok(Box::new(HttpJobReporter::new(url, token)?))
            }
            None => Ok(Box::new(LogJobReporter)),
        }
    }
}

impl StoreArgs {
    fn config(&self) -> crate::error::Result<EtlConfig> {
        EtlConfig::new(
            &self.store,
            &self.label,
            self.weekend_label.as_deref(),
            &self.envelope_key,
        )
    }
}

async fn run_dates<F>(store: &StoreArgs, dates: F) -> crate::error::Result<RunSummary>
where
    F: FnOnce() -> crate::error::Result<Vec<NaiveDate>>,
{
    let dates = dates()?;
    let config = store.config()?;
    let object_store = ObjectArtifactStore::from_spec(&config.store)?;
    info!(
        "Processing {} date(s) from {}",
        dates.len(),
        config.store.display_name()
    );

    let pipeline = Pipeline::new(&object_store, &config);
    Ok(pipeline.run(&dates).await)
}

async fn invoke<F>(store: &StoreArgs, job: &JobArgs, dates: F) -> Result<()>
where
    F: FnOnce() -> crate::error::Result<Vec<NaiveDate>>,
{
    let job_id = job.job_id()?;
    let reporter = job.reporter()?;
    info!("Handling invocation for job {job_id}");

    let succeeded =
        handle_invocation(reporter.as_ref(), &job_id, run_dates(store, dates)).await?;
    if !succeeded {
        bail!("job {job_id} failed");
    }

    Ok(())
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Run {
                store,
                job,
                day,
                date,
            } => {
                invoke(store, job, || {
                    let today = Utc::now().date_naive();
                    Ok(vec![resolve_run_date(today, *day, date.as_deref())?])
                })
                .await
            }
            Commands::Backfill {
                store,
                job,
                from,
                to,
            } => {
                invoke(store, job, || {
                    let (from, to) = (parse_date(from)?, parse_date(to)?);
                    if to > Utc::now().date_naive() {
                        return Err(EtlError::InvalidDate(format!(
                            "range end {to} is in the future"
                        )));
                    }
                    date_range(from, to)
                })
                .await
            }
            Commands::Inspect { archive } => self.inspect(archive),
        }
    }

    fn inspect(&self, path: &Path) -> Result<()> {
        info!("Inspecting archive {}", path.display());

        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read archive {}", path.display()))?;
        let name = path.display().to_string();
        let mut archive = Archive::from_bytes(&name, Bytes::from(data))?;
        let records = extract_stats(&mut archive)?;

        let inspection = Inspection {
            archive: name,
            merged: merge_records(&records),
            records,
        };

        // Serialize to JSON
        let json_output = if self.pretty {
            serde_json::to_string_pretty(&inspection)?
        } else {
            serde_json::to_string(&inspection)?
        };

        // Write to output
        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Statistics written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testing::zip_bytes;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::try_parse_from(["reportetl", "run", "--store", "memory://"]).unwrap();
        match cli.command {
            Commands::Run {
                store, day, date, ..
            } => {
                assert_eq!(store.label, "headlesschrome");
                assert_eq!(store.envelope_key, "qa");
                assert_eq!(day, RunDay::Yesterday);
                assert!(date.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_job_id_and_event_conflict() {
        let result = Cli::try_parse_from([
            "reportetl",
            "run",
            "--store",
            "memory://",
            "--job-id",
            "a",
            "--event",
            "event.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_job_id_defaults_to_scheduled() {
        let job = JobArgs {
            job_id: None,
            event: None,
            report_url: None,
            report_token: None,
        };
        assert_eq!(job.job_id().unwrap(), SCHEDULED_JOB_ID);
    }

    #[test]
    fn test_job_id_from_event_file() {
        let path = std::env::temp_dir().join(format!("reportetl-event-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"CodePipeline.job": {"id": "job-42"}}"#).unwrap();

        let job = JobArgs {
            job_id: None,
            event: Some(path.clone()),
            report_url: None,
            report_token: None,
        };
        let job_id = job.job_id();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(job_id.unwrap(), "job-42");
    }

    #[tokio::test]
    async fn test_run_with_invalid_date_fails() {
        let cli = Cli::try_parse_from([
            "reportetl",
            "run",
            "--store",
            "memory://",
            "--date",
            "2024-02-30",
        ])
        .unwrap();

        let err = cli.execute().await.unwrap_err();
        assert!(err.to_string().contains("failed"), "{err}");
    }

    #[tokio::test]
    async fn test_inspect_writes_json() {
        let dir = std::env::temp_dir();
        let archive_path = dir.join(format!("reportetl-inspect-{}.zip", std::process::id()));
        let output_path = dir.join(format!("reportetl-inspect-{}.json", std::process::id()));
        std::fs::write(
            &archive_path,
            zip_bytes(&[(
                "output-1.xml",
                r#"<robot><statistics><total><stat pass="12" fail="3" skip="1">All Tests</stat></total></statistics></robot>"#,
            )]),
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "reportetl",
            "inspect",
            archive_path.to_str().unwrap(),
            "--output",
            output_path.to_str().unwrap(),
        ])
        .unwrap();
        cli.execute().await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output_path).unwrap()).unwrap();
        std::fs::remove_file(&archive_path).unwrap();
        std::fs::remove_file(&output_path).unwrap();

        assert_eq!(written["records"][0]["pass"], 12);
        assert_eq!(written["merged"][0]["name"], "All Tests");
    }
}
