//! The top-level facade: wires every subsystem crate into a single `Agent`
//! orchestrator over one `Storage`/`CryptoFacade` pair, the way this
//! codebase's own node crate wires its subsystems over one database handle.

pub mod agent;
pub mod testing;

pub use agent::{Agent, AgentDeps};

/// Re-exports the pieces a host needs to construct and drive an `Agent`
/// without depending on every subsystem crate directly.
pub mod prelude {
    pub use crate::agent::{Agent, AgentDeps};
    pub use aesp_commitment::{CommitmentBuilder, CommitmentStatus, CreateCommitmentParams, StatusUpdateMeta};
    pub use aesp_core::capability::{ArchiveUploader, ChainKind, ConsolidationHandler, CryptoFacade, NftMinter, Storage};
    pub use aesp_core::{AespError, AespResult, ExecutionRequest, MemoryStorage, TransferRequest};
    pub use aesp_crypto::Ed25519Crypto;
    pub use aesp_identity::{derive, AgentIdentity, Hierarchy};
    pub use aesp_negotiation::{MessageType, NegotiationEngine, NegotiationState};
    pub use aesp_policy::{Policy, PolicyEngine};
    pub use aesp_privacy::{AddressPool, ConsolidationScheduler, ContextTagManager, CreateTagParams, Direction};
    pub use aesp_review::{CreateReviewParams, ReviewDecision, ReviewManager, ReviewResponse};
}
