use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use catalog_common::{CertificationStatus, Entity, ReconcileError, UpdateProposal};
use registry_client::Session;

use crate::matcher::match_entity;
use crate::pipeline::{PhaseTracker, ProposalBuffer, RunPhase, RunReport};
use crate::run_log::{RunLogger, RunRecorder};
use crate::scoring::{propose, CERTIFICATION_POLICY, QUERY_FAILURE_STATUS, STATUS_FIELD};
use crate::throttle::RateLimiter;
use crate::traits::{CertificationSource, EntityStore, ProposalStore, RunLogStore};

/// Re-verifies every active entity's halal-certification status against the
/// registry and stages corrections for review.
#[derive(TypedBuilder)]
pub struct CertificationPipeline {
    source: Arc<dyn CertificationSource>,
    entities: Arc<dyn EntityStore>,
    proposals: Arc<dyn ProposalStore>,
    run_logs: Arc<dyn RunLogStore>,
    #[builder(default = Duration::from_millis(500))]
    delay: Duration,
    #[builder(default)]
    commit_batch_size: Option<usize>,
}

impl CertificationPipeline {
    /// One scheduled invocation. Always writes exactly one run log.
    pub async fn run(&self) -> Result<RunReport> {
        let mut recorder = RunRecorder::new(CERTIFICATION_POLICY.scraper_name);
        let mut phase = PhaseTracker::new(CERTIFICATION_POLICY.scraper_name);

        let outcome = self.execute(&mut recorder, &mut phase).await;
        if outcome.is_err() {
            phase.advance(RunPhase::Failed);
        }

        let logger = RunLogger::new(self.run_logs.clone());
        let (committed, record) = logger.finish(recorder, outcome).await?;
        Ok(RunReport {
            record,
            phase: phase.current(),
            committed,
        })
    }

    async fn execute(&self, recorder: &mut RunRecorder, phase: &mut PhaseTracker) -> Result<usize> {
        let session = self.source.open_session().await;
        if !session.is_ready() {
            return Err(ReconcileError::Session(
                "no CSRF token could be extracted from the registry page".into(),
            )
            .into());
        }
        phase.advance(RunPhase::SessionReady);

        let entities = self
            .entities
            .list_entities()
            .await
            .context("failed to load entity snapshot")?;
        let active: Vec<&Entity> = entities.iter().filter(|e| e.is_active).collect();
        info!(total = entities.len(), active = active.len(), "Entity snapshot loaded");
        phase.advance(RunPhase::Scanning);

        let mut limiter = RateLimiter::new(self.delay);
        let mut buffer = ProposalBuffer::new(self.commit_batch_size);
        let mut checked = 0u32;

        for entity in active {
            limiter.wait().await;
            match self.check_entity(&session, entity).await {
                Ok(proposal) => {
                    checked += 1;
                    if let Some(proposal) = proposal {
                        buffer.push(proposal);
                    }
                }
                Err(e) => {
                    warn!(entity_id = %entity.id, error = %e, "Certification check failed");
                    recorder.record_error(format!("{}: {e:#}", entity.id));
                }
            }

            // Kept current so a failed mid-scan flush still logs what was checked.
            recorder.set_counts(checked, buffer.found());
            if buffer.is_full() {
                buffer.flush(self.proposals.as_ref()).await?;
            }
        }

        recorder.set_counts(checked, buffer.found());
        info!(
            checked,
            updates = buffer.found(),
            errors = recorder.error_count(),
            "Certification scan complete"
        );

        if buffer.has_pending() {
            phase.advance(RunPhase::Committing);
            buffer.flush(self.proposals.as_ref()).await?;
        }
        phase.advance(RunPhase::Done);

        Ok(buffer.committed())
    }

    /// Look one entity up and decide whether its stored status should change.
    async fn check_entity(&self, session: &Session, entity: &Entity) -> Result<Option<UpdateProposal>> {
        let observed = match self.source.search(session, &entity.name).await {
            Ok(candidates) => {
                let outcome = match_entity(&candidates, &entity.name, &entity.address);
                debug!(
                    entity_id = %entity.id,
                    candidates = candidates.len(),
                    tier = ?outcome.tier,
                    matched = ?outcome.matched.map(|r| r.name.as_str()),
                    status = %outcome.status,
                    "Registry lookup"
                );
                outcome.status
            }
            Err(e) if e.is_api_error() => {
                debug!(entity_id = %entity.id, error = %e, "Registry query failed, status unknown");
                QUERY_FAILURE_STATUS
            }
            Err(e) => return Err(e).context("registry search failed"),
        };

        let Some(proposal) = propose::<CertificationStatus>(
            &CERTIFICATION_POLICY,
            &entity.id,
            STATUS_FIELD,
            &entity.status,
            &observed,
        ) else {
            return Ok(None);
        };

        if self
            .proposals
            .pending_exists(&proposal.entity_id, &proposal.field, &proposal.new_value)
            .await?
        {
            debug!(entity_id = %entity.id, "Identical proposal already pending");
            return Ok(None);
        }

        Ok(Some(proposal))
    }
}
