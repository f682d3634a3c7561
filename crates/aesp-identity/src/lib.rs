//! Agent identity derivation, capability certificates, and the agent
//! delegation hierarchy.

pub mod certificate;
pub mod hierarchy;
pub mod identity;

pub use certificate::{create_certificate, policy_hash, verify_certificate, Capability, Certificate};
pub use hierarchy::{Hierarchy, HierarchyNode};
pub use identity::{derive, derive_allow_fallback, AgentIdentity};
