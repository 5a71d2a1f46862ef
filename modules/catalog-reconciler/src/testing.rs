// Test mocks for the reconciliation pipelines.
//
// Three mocks matching the trait boundaries:
// - MockRegistry (CertificationSource): name -> canned search response
// - MockProbe (ProfileProbe): url -> status, active by default
// - MemoryStore (EntityStore + ProposalStore + RunLogStore): in-memory collections
//   with failure injection
//
// Plus `entity()` for building catalog entries.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use catalog_common::{
    CertificationStatus, Entity, ProfileStatus, ProposalStatus, RunLogRecord, UpdateProposal,
};
use registry_client::{RegistryError, RegistryRecord, Session};

use crate::traits::{CertificationSource, EntityStore, ProfileProbe, ProposalStore, RunLogStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An active entity with no socials.
pub fn entity(id: &str, name: &str, address: &str, status: CertificationStatus) -> Entity {
    Entity {
        id: id.to_string(),
        name: name.to_string(),
        address: address.to_string(),
        status,
        is_active: true,
        socials: BTreeMap::new(),
    }
}

pub fn ready_session() -> Session {
    Session {
        csrf_token: Some("test-token".to_string()),
        cookies: "session=abc".to_string(),
    }
}

// ---------------------------------------------------------------------------
// MockRegistry
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum MockSearch {
    Records(Vec<RegistryRecord>),
    Api(u16),
    Network(String),
}

/// Name-keyed registry. Unregistered names return zero candidates.
pub struct MockRegistry {
    session: Session,
    searches: HashMap<String, MockSearch>,
    calls: Mutex<Vec<String>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            session: ready_session(),
            searches: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn on_search(mut self, name: &str, records: Vec<RegistryRecord>) -> Self {
        self.searches.insert(name.to_string(), MockSearch::Records(records));
        self
    }

    pub fn on_search_status(mut self, name: &str, status: u16) -> Self {
        self.searches.insert(name.to_string(), MockSearch::Api(status));
        self
    }

    pub fn on_search_network_error(mut self, name: &str, message: &str) -> Self {
        self.searches
            .insert(name.to_string(), MockSearch::Network(message.to_string()));
        self
    }

    /// Names searched, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertificationSource for MockRegistry {
    async fn open_session(&self) -> Session {
        self.session.clone()
    }

    async fn search(
        &self,
        session: &Session,
        name: &str,
    ) -> std::result::Result<Vec<RegistryRecord>, RegistryError> {
        if !session.is_ready() {
            return Err(RegistryError::SessionUnavailable);
        }
        self.calls.lock().unwrap().push(name.to_string());
        match self.searches.get(name).cloned() {
            Some(MockSearch::Records(records)) => Ok(records),
            Some(MockSearch::Api(status)) => Err(RegistryError::Api {
                status,
                message: "mock".to_string(),
            }),
            Some(MockSearch::Network(message)) => Err(RegistryError::Network(message)),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockProbe
// ---------------------------------------------------------------------------

/// URL-keyed probe. Unregistered URLs are active.
pub struct MockProbe {
    statuses: HashMap<String, ProfileStatus>,
    calls: Mutex<Vec<String>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self {
            statuses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_url(mut self, url: &str, status: ProfileStatus) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileProbe for MockProbe {
    async fn probe(&self, url: &str) -> ProfileStatus {
        self.calls.lock().unwrap().push(url.to_string());
        self.statuses
            .get(url)
            .copied()
            .unwrap_or(ProfileStatus::Active)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory catalog collections. Batch commits are all-or-nothing.
pub struct MemoryStore {
    entities: Mutex<Vec<Entity>>,
    proposals: Mutex<Vec<UpdateProposal>>,
    run_logs: Mutex<Vec<RunLogRecord>>,
    fail_entities: bool,
    fail_commits: bool,
    fail_commit_at: Option<usize>,
    fail_run_logs: bool,
    fail_pending_lookup: HashSet<String>,
    commit_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entities: Mutex::new(Vec::new()),
            proposals: Mutex::new(Vec::new()),
            run_logs: Mutex::new(Vec::new()),
            fail_entities: false,
            fail_commits: false,
            fail_commit_at: None,
            fail_run_logs: false,
            fail_pending_lookup: HashSet::new(),
            commit_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_entities(self, entities: Vec<Entity>) -> Self {
        *self.entities.lock().unwrap() = entities;
        self
    }

    /// Seed an existing proposal (e.g. one still awaiting review).
    pub fn with_proposal(self, proposal: UpdateProposal) -> Self {
        self.proposals.lock().unwrap().push(proposal);
        self
    }

    pub fn failing_entities(mut self) -> Self {
        self.fail_entities = true;
        self
    }

    pub fn failing_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }

    /// Make only the `n`th batch commit (1-based) fail.
    pub fn failing_commit_at(mut self, n: usize) -> Self {
        self.fail_commit_at = Some(n);
        self
    }

    pub fn failing_run_logs(mut self) -> Self {
        self.fail_run_logs = true;
        self
    }

    /// Make `pending_exists` fail for one entity.
    pub fn failing_pending_lookup_for(mut self, entity_id: &str) -> Self {
        self.fail_pending_lookup.insert(entity_id.to_string());
        self
    }

    pub fn proposals(&self) -> Vec<UpdateProposal> {
        self.proposals.lock().unwrap().clone()
    }

    pub fn run_logs(&self) -> Vec<RunLogRecord> {
        self.run_logs.lock().unwrap().clone()
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn list_entities(&self) -> Result<Vec<Entity>> {
        if self.fail_entities {
            bail!("MemoryStore: entity collection unavailable");
        }
        Ok(self.entities.lock().unwrap().clone())
    }
}

#[async_trait]
impl ProposalStore for MemoryStore {
    async fn pending_exists(&self, entity_id: &str, field: &str, new_value: &str) -> Result<bool> {
        if self.fail_pending_lookup.contains(entity_id) {
            bail!("MemoryStore: proposal lookup failed for {entity_id}");
        }
        Ok(self.proposals.lock().unwrap().iter().any(|p| {
            p.entity_id == entity_id
                && p.field == field
                && p.new_value == new_value
                && p.status == ProposalStatus::Pending
        }))
    }

    async fn commit_batch(&self, proposals: &[UpdateProposal]) -> Result<()> {
        let call = self.commit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_commits || self.fail_commit_at == Some(call) {
            bail!("MemoryStore: batch write rejected");
        }
        self.proposals
            .lock()
            .unwrap()
            .extend(proposals.iter().cloned());
        Ok(())
    }
}

#[async_trait]
impl RunLogStore for MemoryStore {
    async fn append(&self, record: &RunLogRecord) -> Result<()> {
        if self.fail_run_logs {
            bail!("MemoryStore: run log write rejected");
        }
        self.run_logs.lock().unwrap().push(record.clone());
        Ok(())
    }
}
