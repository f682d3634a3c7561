//! Commitment lifecycle: dual-signed agreement creation, signing, and the
//! status-transition graph that governs escrow through completion.

pub mod builder;
pub mod commitment;

pub use builder::{CommitmentBuilder, CreateCommitmentParams};
pub use commitment::{Commitment, CommitmentRecord, CommitmentStatus, CommitmentValue, StatusUpdateMeta};
