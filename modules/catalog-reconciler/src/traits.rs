// Trait seams for the reconciliation pipelines.
//
// CertificationSource: registry session bootstrap + name search.
// ProfileProbe: social profile reachability.
// EntityStore / ProposalStore / RunLogStore: the catalog collections.
//
// Orchestrators only see these traits, so tests run against the mocks in
// `testing` with no network and no database.

use anyhow::Result;
use async_trait::async_trait;

use catalog_common::{Entity, ProfileStatus, RunLogRecord, UpdateProposal};
use registry_client::{RegistryClient, RegistryError, RegistryRecord, Session};

// ---------------------------------------------------------------------------
// External sources
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CertificationSource: Send + Sync {
    /// Bootstrap a session. Failures come back as a session without a token.
    async fn open_session(&self) -> Session;

    /// Search the registry by establishment name.
    async fn search(
        &self,
        session: &Session,
        name: &str,
    ) -> std::result::Result<Vec<RegistryRecord>, RegistryError>;
}

#[async_trait]
impl CertificationSource for RegistryClient {
    async fn open_session(&self) -> Session {
        self.acquire_session().await
    }

    async fn search(
        &self,
        session: &Session,
        name: &str,
    ) -> std::result::Result<Vec<RegistryRecord>, RegistryError> {
        RegistryClient::search(self, session, name).await
    }
}

#[async_trait]
pub trait ProfileProbe: Send + Sync {
    /// Infallible by contract: ambiguous outcomes resolve to active.
    async fn probe(&self, url: &str) -> ProfileStatus;
}

// ---------------------------------------------------------------------------
// Catalog collections
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Snapshot of the catalog, read once at the start of a run.
    async fn list_entities(&self) -> Result<Vec<Entity>>;
}

#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Whether an identical suggestion is already awaiting review.
    async fn pending_exists(&self, entity_id: &str, field: &str, new_value: &str) -> Result<bool>;

    /// Write all proposals or none.
    async fn commit_batch(&self, proposals: &[UpdateProposal]) -> Result<()>;
}

#[async_trait]
pub trait RunLogStore: Send + Sync {
    async fn append(&self, record: &RunLogRecord) -> Result<()>;
}
