use serde::Deserialize;

use crate::error::{EtlError, Result};

/// Job id used in reports when the run was started by the scheduler alone.
pub const SCHEDULED_JOB_ID: &str = "scheduled";

/// The part of a pipeline invocation event that identifies the job.
#[derive(Debug, Deserialize)]
struct InvocationEvent {
    #[serde(rename = "CodePipeline.job")]
    job: Option<EventJob>,
}

#[derive(Debug, Deserialize)]
struct EventJob {
    id: String,
}

/// Reads the job id from an invocation event; `None` for scheduled events
/// that carry no job.
pub fn job_id_from_event(json: &str) -> Result<Option<String>> {
    let event: InvocationEvent = serde_json::from_str(json)?;

    match event.job {
        Some(job) if job.id.trim().is_empty() => {
            Err(EtlError::Config("event job id is empty".to_string()))
        }
        Some(job) => Ok(Some(job.id)),
        None => Ok(None),
    }
}
