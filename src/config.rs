use crate::aggregate::BREAKDOWN_FIELD;
use crate::error::{EtlError, Result};
use crate::locator::LabelPolicy;
use crate::store::StoreSpec;

/// Key of the primary record in `data/<date>.json`, read by the dashboard.
pub const DEFAULT_ENVELOPE_KEY: &str = "qa";

pub const DEFAULT_LABEL: &str = "headlesschrome";

/// Everything a pipeline run needs, resolved once from the command line.
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub store: StoreSpec,
    pub labels: LabelPolicy,
    pub envelope_key: String,
}

fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() || label.contains('/') || label.chars().any(char::is_whitespace) {
        return Err(EtlError::Config(format!(
            "environment label '{label}' must be non-empty without slashes or whitespace"
        )));
    }
    Ok(())
}

impl EtlConfig {
    pub fn new(
        store: &str,
        label: &str,
        weekend_label: Option<&str>,
        envelope_key: &str,
    ) -> Result<Self> {
        validate_label(label)?;
        if let Some(weekend) = weekend_label {
            validate_label(weekend)?;
        }

        if envelope_key.is_empty() || envelope_key == BREAKDOWN_FIELD {
            return Err(EtlError::Config(format!(
                "envelope key '{envelope_key}' is empty or reserved"
            )));
        }

        Ok(Self {
            store: StoreSpec::parse(store)?,
            labels: LabelPolicy::new(label, weekend_label.map(ToString::to_string)),
            envelope_key: envelope_key.to_string(),
        })
    }
}
