//! The `Agent` orchestrator: one principal's identity plus every subsystem
//! engine, constructed over a shared `Storage`/`CryptoFacade` pair the way
//! this codebase wires a node's subsystems over a shared database handle.

use std::cell::{Ref, RefCell, RefMut};
use std::sync::Arc;

use aesp_core::capability::{ArchiveUploader, ConsolidationHandler, CryptoFacade, NftMinter};
use aesp_core::{AespResult, AuditBatchConfig, ConsolidationConfig, PoolConfig, ReviewConfig, Storage};
use aesp_commitment::CommitmentBuilder;
use aesp_identity::{AgentIdentity, Hierarchy};
use aesp_negotiation::NegotiationEngine;
use aesp_policy::PolicyEngine;
use aesp_privacy::{AddressPool, ConsolidationScheduler, ContextTagManager};
use aesp_review::ReviewManager;

/// Wires every subsystem over one `Storage`/`CryptoFacade` pair for a single
/// identity. Each subsystem still owns its own records; the orchestrator
/// only owns construction order and the delegation hierarchy.
pub struct Agent {
    pub identity: AgentIdentity,
    hierarchy: RefCell<Hierarchy>,
    pub policy: PolicyEngine,
    pub negotiation: NegotiationEngine,
    pub commitment: CommitmentBuilder,
    pub review: ReviewManager,
    pub pool: AddressPool,
    pub tags: ContextTagManager,
    pub consolidation: ConsolidationScheduler,
}

/// Constructor dependencies that come from outside the core (the `aesp`
/// crate ships no defaults for these beyond what `aesp-crypto`'s reference
/// façade and `aesp_core::MemoryStorage` provide for tests).
pub struct AgentDeps {
    pub storage: Arc<dyn Storage>,
    pub crypto: Arc<dyn CryptoFacade>,
    pub consolidation_handler: Arc<dyn ConsolidationHandler>,
    pub archiver: Arc<dyn ArchiveUploader>,
    pub minter: Arc<dyn NftMinter>,
}

impl Agent {
    pub fn new(identity: AgentIdentity, deps: AgentDeps) -> Self {
        Self::with_consolidation_config(identity, deps, ConsolidationConfig::default())
    }

    /// Same wiring as [`Agent::new`], but lets a host tune the consolidation
    /// sweep (batch size, delay range, threshold) without reconstructing
    /// every other subsystem. Hosts that only need the sweep's defaults
    /// should call [`Agent::new`] instead.
    pub fn with_consolidation_config(identity: AgentIdentity, deps: AgentDeps, consolidation_config: ConsolidationConfig) -> Self {
        let AgentDeps {
            storage,
            crypto,
            consolidation_handler,
            archiver,
            minter,
        } = deps;

        Self {
            identity,
            hierarchy: RefCell::new(Hierarchy::new()),
            policy: PolicyEngine::new(storage.clone(), None),
            negotiation: NegotiationEngine::new(storage.clone()),
            commitment: CommitmentBuilder::new(storage.clone(), crypto.clone()),
            review: ReviewManager::new(storage.clone(), ReviewConfig::default()),
            pool: AddressPool::new(storage.clone(), crypto.clone(), PoolConfig::default()),
            tags: ContextTagManager::new(storage.clone(), crypto.clone(), archiver, minter, AuditBatchConfig::default()),
            consolidation: ConsolidationScheduler::new(storage, consolidation_handler, consolidation_config),
        }
    }

    /// Loads every subsystem's persisted state. The hierarchy has no
    /// standalone storage key of its own in this orchestrator — hosts that
    /// need it durable persist `hierarchy().to_flat_list()` themselves.
    pub async fn load(&self) -> AespResult<()> {
        self.policy.load().await?;
        self.negotiation.load().await?;
        self.commitment.load().await?;
        self.review.load().await?;
        self.pool.load().await?;
        self.tags.load().await?;
        self.consolidation.load().await?;
        Ok(())
    }

    pub fn hierarchy(&self) -> Ref<'_, Hierarchy> {
        self.hierarchy.borrow()
    }

    pub fn hierarchy_mut(&self) -> RefMut<'_, Hierarchy> {
        self.hierarchy.borrow_mut()
    }

    /// Flushes the debounced subsystems (negotiation, pool) and disposes
    /// the review manager's outstanding waiters. Call on shutdown.
    pub async fn dispose(&self) -> AespResult<()> {
        self.negotiation.dispose().await?;
        self.pool.dispose().await?;
        self.review.dispose();
        Ok(())
    }
}
