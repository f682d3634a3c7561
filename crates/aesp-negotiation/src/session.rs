//! The negotiation session data model: state, message kind, and the
//! per-round history that backs replay and auditing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Initial,
    OfferSent,
    OfferReceived,
    Countering,
    Accepted,
    Rejected,
    Committed,
}

impl NegotiationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Committed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Offer,
    Counter,
    Accept,
    Reject,
    Commit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub round_number: u32,
    pub sender: String,
    pub message_type: MessageType,
    pub payload: Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationSession {
    pub session_id: String,
    pub my_agent_id: String,
    pub counterparty_agent_id: String,
    pub state: NegotiationState,
    pub rounds: Vec<Round>,
    pub max_rounds: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: i64,
    #[serde(default)]
    pub commitment: Option<Value>,
}

impl NegotiationSession {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn is_participant(&self, agent_id: &str) -> bool {
        agent_id == self.my_agent_id || agent_id == self.counterparty_agent_id
    }
}
