use std::future::Future;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};

use catalog_common::ReconcileError;

use crate::pipeline::RunReport;
use crate::scheduling::CronSchedule;

/// Run `job` at every fire time of `schedule`, forever.
///
/// Each invocation is independent: a failed run is logged (its run log has
/// already been written by the pipeline) and the loop waits for the next slot.
/// Runs never overlap; a run that overshoots a slot skips it.
pub async fn run_on_schedule<F, Fut>(name: &str, schedule: CronSchedule, job: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<RunReport>>,
{
    loop {
        let now = Utc::now();
        let next = schedule.next_after(now).ok_or_else(|| {
            ReconcileError::Schedule(format!("{name}: schedule {schedule} never fires"))
        })?;
        let wait = (next - now).to_std().unwrap_or_default();
        info!(
            pipeline = name,
            next_run = %next.with_timezone(&schedule.timezone()),
            wait_secs = wait.as_secs(),
            "Waiting for next scheduled run"
        );
        tokio::time::sleep(wait).await;

        info!(pipeline = name, "Scheduled run starting");
        match job().await {
            Ok(report) => info!(pipeline = name, "Scheduled run complete. {report}"),
            Err(e) => error!(pipeline = name, error = %format!("{e:#}"), "Scheduled run failed"),
        }
    }
}
