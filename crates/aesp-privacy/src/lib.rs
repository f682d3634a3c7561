//! The privacy subsystem: context-isolated ephemeral addresses, the audit
//! tags linking them to transactions, and jittered batch consolidation.

pub mod address;
pub mod consolidation;
pub mod context;
pub mod pool;
pub mod tags;

pub use address::{AddressRecord, AddressStatus, Direction, PrivacyLevel};
pub use consolidation::{ConsolidationRecord, ConsolidationScheduler, ConsolidationStatus};
pub use context::{build_context, segment};
pub use pool::AddressPool;
pub use tags::{ContextTag, ContextTagManager, CreateTagParams};
