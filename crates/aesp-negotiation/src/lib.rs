//! The negotiation state machine and its signed protocol wrapper.

pub mod engine;
pub mod protocol;
pub mod session;

pub use engine::NegotiationEngine;
pub use protocol::{build_acceptance_message, verify_incoming, AcceptanceMessage, IncomingMessage};
pub use session::{MessageType, NegotiationSession, NegotiationState, Round};
