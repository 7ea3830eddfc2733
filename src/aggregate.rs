use bytes::Bytes;
use chrono::NaiveDate;
use indexmap::IndexMap;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};
use crate::report::StatRecord;
use crate::store::{ArtifactStore, StoreError};

/// Label Robot Framework gives the overall total.
pub const ALL_TESTS: &str = "All Tests";

/// Field holding the non-primary labels in a daily document.
pub const BREAKDOWN_FIELD: &str = "breakdown";

/// One day's statistics as the dashboard reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub name: String,
}

impl DailyRecord {
    pub fn from_stat(date: NaiveDate, stat: &StatRecord) -> Self {
        Self {
            date,
            passed: stat.pass,
            failed: stat.fail,
            skipped: stat.skip,
            name: stat.name.clone(),
        }
    }
}

/// The object stored under `data/<date>.json`:
/// `{ "<envelope_key>": DailyRecord, "breakdown": [DailyRecord, ...] }`.
#[derive(Debug, Serialize)]
pub struct DailyDocument {
    #[serde(flatten)]
    pub primary: IndexMap<String, DailyRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breakdown: Vec<DailyRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// A record for the date already existed; nothing was written.
    Skipped,
}

pub fn daily_key(date: NaiveDate) -> String {
    format!("data/{}.json", date.format("%Y-%m-%d"))
}

/// Sums records sharing a label, keeping labels in first-seen order.
pub fn merge_records(records: &[StatRecord]) -> Vec<StatRecord> {
    let mut merged: IndexMap<&str, StatRecord> = IndexMap::new();

    for record in records {
        merged
            .entry(record.name.as_str())
            .and_modify(|total| {
                total.pass = total.pass.saturating_add(record.pass);
                total.fail = total.fail.saturating_add(record.fail);
                total.skip = total.skip.saturating_add(record.skip);
            })
            .or_insert_with(|| record.clone());
    }

    merged.into_values().collect()
}

/// Builds the daily document: labels are merged, the `All Tests` total (or
/// the first label when there is none) goes under `envelope_key` and every
/// other label into the breakdown.
pub fn build_daily_document(
    date: NaiveDate,
    envelope_key: &str,
    records: &[StatRecord],
) -> Option<DailyDocument> {
    let mut merged = merge_records(records);
    if merged.is_empty() {
        return None;
    }

    let primary_index = merged
        .iter()
        .position(|r| r.name == ALL_TESTS)
        .unwrap_or(0);
    let primary = merged.remove(primary_index);

    let mut envelope = IndexMap::new();
    envelope.insert(envelope_key.to_string(), DailyRecord::from_stat(date, &primary));

    Some(DailyDocument {
        primary: envelope,
        breakdown: merged
            .iter()
            .map(|stat| DailyRecord::from_stat(date, stat))
            .collect(),
    })
}

/// Writes the daily record for `date` unless one already exists.
///
/// Performs one existence check and at most one create-only write.
pub async fn persist_daily(
    store: &dyn ArtifactStore,
    date: NaiveDate,
    envelope_key: &str,
    records: &[StatRecord],
) -> Result<PersistOutcome> {
    let key = daily_key(date);
    let persist_error = |message: String| EtlError::Persist {
        key: key.clone(),
        message,
    };

    let document = build_daily_document(date, envelope_key, records)
        .ok_or_else(|| persist_error("no statistics to persist".to_string()))?;

    let exists = store
        .exists(&key)
        .await
        .map_err(|e| persist_error(format!("existence check failed: {e}")))?;
    if exists {
        info!("{key} already exists in {}, skipping write", store.name());
        return Ok(PersistOutcome::Skipped);
    }

    let body = serde_json::to_vec(&document)?;
    match store.put_if_absent(&key, Bytes::from(body)).await {
        Ok(()) => {
            info!(
                "Wrote {key}: {} label(s), primary '{}'",
                document.breakdown.len() + 1,
                document
                    .primary
                    .values()
                    .next()
                    .map_or("", |r| r.name.as_str())
            );
            Ok(PersistOutcome::Written)
        }
        Err(StoreError::AlreadyExists { .. }) => {
            warn!("{key} was created by a concurrent run, leaving it untouched");
            Ok(PersistOutcome::Skipped)
        }
        Err(e) => {
            error!("Failed to write {key}: {e}");
            Err(persist_error(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::RecordingStore;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn stat(pass: u64, fail: u64, skip: u64, name: &str) -> StatRecord {
        StatRecord {
            pass,
            fail,
            skip,
            name: name.to_string(),
        }
    }

    async fn stored_json(store: &RecordingStore, key: &str) -> serde_json::Value {
        let body = store.get(key).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_daily_key() {
        assert_eq!(daily_key(date()), "data/2024-06-03.json");
    }

    #[test]
    fn test_daily_record_from_stat() {
        let record = DailyRecord::from_stat(date(), &stat(109, 47, 0, "All Tests"));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "date": "2024-06-03",
                "passed": 109,
                "failed": 47,
                "skipped": 0,
                "name": "All Tests"
            })
        );
    }

    #[test]
    fn test_merge_sums_by_label_in_first_seen_order() {
        let merged = merge_records(&[
            stat(1, 1, 0, "Critical Tests"),
            stat(10, 2, 1, "All Tests"),
            stat(5, 0, 0, "All Tests"),
            stat(2, 0, 0, "Critical Tests"),
        ]);

        assert_eq!(
            merged,
            vec![stat(3, 1, 0, "Critical Tests"), stat(15, 2, 1, "All Tests")]
        );
    }

    #[test]
    fn test_document_prefers_all_tests_as_primary() {
        let document = build_daily_document(
            date(),
            "qa",
            &[stat(10, 2, 0, "Critical Tests"), stat(109, 47, 0, "All Tests")],
        )
        .unwrap();

        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(
            value,
            json!({
                "qa": {"date": "2024-06-03", "passed": 109, "failed": 47, "skipped": 0, "name": "All Tests"},
                "breakdown": [
                    {"date": "2024-06-03", "passed": 10, "failed": 2, "skipped": 0, "name": "Critical Tests"}
                ]
            })
        );
    }

    #[test]
    fn test_document_without_all_tests_uses_first_label() {
        let document =
            build_daily_document(date(), "qa", &[stat(1, 0, 0, "Smoke"), stat(2, 0, 0, "Regression")])
                .unwrap();
        assert_eq!(document.primary["qa"].name, "Smoke");
        assert_eq!(document.breakdown.len(), 1);
    }

    #[test]
    fn test_single_label_document_has_no_breakdown() {
        let document = build_daily_document(date(), "qa", &[stat(12, 3, 1, "All Tests")]).unwrap();
        let value = serde_json::to_value(&document).unwrap();
        assert!(value.get(BREAKDOWN_FIELD).is_none());
    }

    #[test]
    fn test_empty_records_build_nothing() {
        assert!(build_daily_document(date(), "qa", &[]).is_none());
    }

    #[tokio::test]
    async fn test_persist_writes_numeric_record() {
        let store = RecordingStore::new();

        let outcome = persist_daily(&store, date(), "qa", &[stat(109, 47, 0, "All Tests")])
            .await
            .unwrap();

        assert_eq!(outcome, PersistOutcome::Written);
        assert_eq!(store.existence_checks(), 1);
        assert_eq!(store.puts(), 1);
        assert_eq!(
            stored_json(&store, "data/2024-06-03.json").await,
            json!({"qa": {"date": "2024-06-03", "passed": 109, "failed": 47, "skipped": 0, "name": "All Tests"}})
        );
    }

    #[tokio::test]
    async fn test_persist_twice_is_idempotent() {
        let store = RecordingStore::new();
        let records = [stat(12, 3, 1, "All Tests")];

        let first = persist_daily(&store, date(), "qa", &records).await.unwrap();
        let second = persist_daily(&store, date(), "qa", &records).await.unwrap();

        assert_eq!(first, PersistOutcome::Written);
        assert_eq!(second, PersistOutcome::Skipped);
        assert_eq!(store.existence_checks(), 2);
        assert_eq!(store.puts(), 1);
        assert!(store.exists("data/2024-06-03.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_persist_never_overwrites_existing_record() {
        let store = RecordingStore::new();
        store
            .seed("data/2024-06-03.json", r#"{"qa":{"name":"original"}}"#)
            .await;

        let outcome = persist_daily(&store, date(), "qa", &[stat(1, 1, 1, "All Tests")])
            .await
            .unwrap();

        assert_eq!(outcome, PersistOutcome::Skipped);
        assert_eq!(store.puts(), 0);
        assert_eq!(
            stored_json(&store, "data/2024-06-03.json").await,
            json!({"qa": {"name": "original"}})
        );
    }

    #[tokio::test]
    async fn test_record_created_after_existence_check_is_skipped() {
        let store = RecordingStore::new();
        store
            .lose_race_on("data/2024-06-03.json", r#"{"qa":{"name":"concurrent"}}"#)
            .await;

        let outcome = persist_daily(&store, date(), "qa", &[stat(1, 1, 1, "All Tests")])
            .await
            .unwrap();

        assert_eq!(outcome, PersistOutcome::Skipped);
        assert_eq!(store.existence_checks(), 1);
        assert_eq!(store.puts(), 1);
        assert_eq!(
            stored_json(&store, "data/2024-06-03.json").await,
            json!({"qa": {"name": "concurrent"}})
        );
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported() {
        let store = RecordingStore::new();
        store.fail_puts_to("data/2024-06-03.json");

        let err = persist_daily(&store, date(), "qa", &[stat(1, 0, 0, "All Tests")])
            .await
            .unwrap_err();

        assert!(err.is_persist());
        assert!(err.to_string().contains("data/2024-06-03.json"), "{err}");
        assert!(!store.exists("data/2024-06-03.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_persist_empty_records_writes_nothing() {
        let store = RecordingStore::new();

        let err = persist_daily(&store, date(), "qa", &[]).await.unwrap_err();

        assert!(err.is_persist());
        assert_eq!(store.existence_checks(), 0);
        assert_eq!(store.puts(), 0);
    }
}
