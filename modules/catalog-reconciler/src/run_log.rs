//! Run log: one append-only audit record per pipeline invocation.
//!
//! `RunRecorder` accumulates metrics while a run executes. `RunLogger::finish`
//! is called exactly once, after the run body has returned either way, so a
//! failed run still leaves a record.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use catalog_common::RunLogRecord;

use crate::traits::RunLogStore;

// ---------------------------------------------------------------------------
// RunRecorder
// ---------------------------------------------------------------------------

pub struct RunRecorder {
    scraper_name: String,
    started_at: DateTime<Utc>,
    started: Instant,
    entities_checked: Option<u32>,
    updates_found: Option<u32>,
    errors: Vec<String>,
}

impl RunRecorder {
    pub fn new(scraper_name: &str) -> Self {
        Self {
            scraper_name: scraper_name.to_string(),
            started_at: Utc::now(),
            started: Instant::now(),
            entities_checked: None,
            updates_found: None,
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Updated as the scan progresses. Left unset on a run that never started scanning.
    pub fn set_counts(&mut self, entities_checked: u32, updates_found: u32) {
        self.entities_checked = Some(entities_checked);
        self.updates_found = Some(updates_found);
    }

    pub fn finish(self) -> RunLogRecord {
        RunLogRecord {
            scraper_name: self.scraper_name,
            timestamp: self.started_at,
            entities_checked: self.entities_checked,
            updates_found: self.updates_found,
            errors: self.errors,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

// ---------------------------------------------------------------------------
// RunLogger
// ---------------------------------------------------------------------------

pub struct RunLogger {
    store: Arc<dyn RunLogStore>,
}

impl RunLogger {
    pub fn new(store: Arc<dyn RunLogStore>) -> Self {
        Self { store }
    }

    /// Write the run's record and hand back the run's own result.
    ///
    /// On the failure path the original error is appended to the record and
    /// re-raised; a log write failure is only warned about so it cannot mask it.
    /// On the success path a log write failure is returned.
    pub async fn finish<T>(
        &self,
        mut recorder: RunRecorder,
        outcome: Result<T>,
    ) -> Result<(T, RunLogRecord)> {
        match outcome {
            Ok(value) => {
                let record = recorder.finish();
                self.store.append(&record).await?;
                info!("Run log written. {record}");
                Ok((value, record))
            }
            Err(e) => {
                recorder.record_error(format!("{e:#}"));
                let record = recorder.finish();
                match self.store.append(&record).await {
                    Ok(()) => error!("Run failed, log written. {record}"),
                    Err(log_err) => {
                        warn!(error = %log_err, "Failed to write run log for failed run")
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    #[tokio::test]
    async fn success_path_writes_one_record() {
        let store = Arc::new(MemoryStore::new());
        let logger = RunLogger::new(store.clone());
        let mut recorder = RunRecorder::new("halal_certification");
        recorder.record_error("e1: timeout");
        recorder.set_counts(9, 2);

        let (value, record) = logger.finish(recorder, Ok(7)).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(record.entities_checked, Some(9));
        assert_eq!(record.updates_found, Some(2));
        assert_eq!(store.run_logs(), vec![record]);
    }

    #[tokio::test]
    async fn failure_path_writes_record_and_reraises() {
        let store = Arc::new(MemoryStore::new());
        let logger = RunLogger::new(store.clone());
        let recorder = RunRecorder::new("halal_certification");

        let err = logger
            .finish::<()>(recorder, Err(anyhow::anyhow!("no CSRF token")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no CSRF token");

        let logs = store.run_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].entities_checked, None);
        assert_eq!(logs[0].errors, vec!["no CSRF token".to_string()]);
    }

    #[tokio::test]
    async fn log_write_failure_does_not_mask_run_error() {
        let store = Arc::new(MemoryStore::new().failing_run_logs());
        let logger = RunLogger::new(store.clone());

        let err = logger
            .finish::<()>(RunRecorder::new("social_liveness"), Err(anyhow::anyhow!("boom")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(store.run_logs().is_empty());
    }

    #[tokio::test]
    async fn log_write_failure_surfaces_on_success_path() {
        let store = Arc::new(MemoryStore::new().failing_run_logs());
        let logger = RunLogger::new(store);
        let result = logger.finish(RunRecorder::new("social_liveness"), Ok(())).await;
        assert!(result.is_err());
    }
}
