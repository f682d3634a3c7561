//! Shared types, errors, constants, and capability interfaces for the Agent
//! Economic Sovereignty Protocol core. Every other `aesp-*` crate depends on
//! this one; it depends on none of them.

pub mod canonical;
pub mod capability;
pub mod config;
pub mod constants;
pub mod error;
pub mod memory;
pub mod ring;
pub mod types;

pub use canonical::{to_canonical_bytes, to_canonical_json};
pub use capability::{
    ArchiveUploader, ChainKind, ConsolidationHandler, ConsolidationRequest, ContextAddress,
    CryptoFacade, DerivedKey, NftMinter, Storage,
};
pub use config::{
    AuditBatchConfig, AuditBatchStrategy, ConsolidationConfig, NegotiationConfig,
    PolicyEngineConfig, PoolConfig, ReviewConfig,
};
pub use constants::*;
pub use error::{AespError, AespResult, NegotiationError};
pub use memory::MemoryStorage;
pub use ring::push_capped;
pub use types::{
    AgentId, ExecutionRequest, SendTransactionRequest, SignPersonalRequest, SignTypedDataRequest,
    TimeWindow, TransferRequest,
};
