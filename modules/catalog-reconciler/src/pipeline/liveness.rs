use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use catalog_common::{Entity, ProfileStatus, UpdateProposal};

use crate::liveness::profile_url;
use crate::pipeline::{PhaseTracker, ProposalBuffer, RunPhase, RunReport};
use crate::run_log::{RunLogger, RunRecorder};
use crate::scoring::{propose, social_field, LIVENESS_POLICY};
use crate::throttle::RateLimiter;
use crate::traits::{EntityStore, ProfileProbe, ProposalStore, RunLogStore};

/// Probes every listed social profile of every active entity and flags the
/// ones that are confirmed gone. No session step.
#[derive(TypedBuilder)]
pub struct LivenessPipeline {
    probe: Arc<dyn ProfileProbe>,
    entities: Arc<dyn EntityStore>,
    proposals: Arc<dyn ProposalStore>,
    run_logs: Arc<dyn RunLogStore>,
    #[builder(default = Duration::from_millis(150))]
    delay: Duration,
    #[builder(default)]
    commit_batch_size: Option<usize>,
}

impl LivenessPipeline {
    pub async fn run(&self) -> Result<RunReport> {
        let mut recorder = RunRecorder::new(LIVENESS_POLICY.scraper_name);
        let mut phase = PhaseTracker::new(LIVENESS_POLICY.scraper_name);

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
        let entities = self
            .entities
            .list_entities()
            .await
            .context("failed to load entity snapshot")?;
        let active: Vec<&Entity> = entities
            .iter()
            .filter(|e| e.is_active && !e.socials.is_empty())
            .collect();
        info!(total = entities.len(), with_socials = active.len(), "Entity snapshot loaded");
        phase.advance(RunPhase::Scanning);

        let mut limiter = RateLimiter::new(self.delay);
        let mut buffer = ProposalBuffer::new(self.commit_batch_size);
        let mut checked = 0u32;

        for entity in active {
            match self.check_entity(&mut limiter, entity).await {
                Ok(proposals) => {
                    checked += 1;
                    for proposal in proposals {
                        buffer.push(proposal);
                    }
                }
                Err(e) => {
                    warn!(entity_id = %entity.id, error = %e, "Liveness check failed");
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
            "Liveness scan complete"
        );

        if buffer.has_pending() {
            phase.advance(RunPhase::Committing);
            buffer.flush(self.proposals.as_ref()).await?;
        }
        phase.advance(RunPhase::Done);

        Ok(buffer.committed())
    }

    /// Probe each of an entity's profiles. Every request goes through the limiter.
    async fn check_entity(
        &self,
        limiter: &mut RateLimiter,
        entity: &Entity,
    ) -> Result<Vec<UpdateProposal>> {
        let mut proposals = Vec::new();

        for (platform, handle) in &entity.socials {
            let Some(url) = profile_url(platform, handle) else {
                debug!(entity_id = %entity.id, platform = %platform, "No probeable URL, skipping");
                continue;
            };

            limiter.wait().await;
            let observed = self.probe.probe(&url).await;

            let field = social_field(platform);
            let Some(proposal) =
                propose(&LIVENESS_POLICY, &entity.id, &field, &ProfileStatus::Active, &observed)
            else {
                continue;
            };

            if self
                .proposals
                .pending_exists(&proposal.entity_id, &proposal.field, &proposal.new_value)
                .await?
            {
                debug!(entity_id = %entity.id, platform = %platform, "Identical proposal already pending");
                continue;
            }

            info!(entity_id = %entity.id, platform = %platform, url = %url, "Profile confirmed gone");
            proposals.push(proposal);
        }

        Ok(proposals)
    }
}
