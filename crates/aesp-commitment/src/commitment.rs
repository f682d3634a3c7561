//! Commitment data model: the dual-signed agreement value and the record
//! that carries it through its status lifecycle.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentValue {
    pub buyer_agent: String,
    pub seller_agent: String,
    pub item: String,
    pub price: f64,
    pub currency: String,
    pub delivery_deadline: f64,
    pub arbitrator: Option<String>,
    pub escrow_required: bool,
    /// Drawn from secure randomness, 53-bit range.
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    pub domain: Value,
    pub types: Value,
    pub value: CommitmentValue,
    #[serde(default)]
    pub buyer_signature: Option<String>,
    #[serde(default)]
    pub seller_signature: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentStatus {
    Draft,
    Proposed,
    BuyerSigned,
    FullySigned,
    Escrowed,
    Delivered,
    Completed,
    Disputed,
    Cancelled,
}

impl CommitmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `self → to` is an edge of the status-transition graph.
    pub fn can_transition_to(self, to: Self) -> bool {
        use CommitmentStatus::*;
        matches!(
            (self, to),
            (Draft, Proposed)
                | (Draft, BuyerSigned)
                | (Draft, Cancelled)
                | (Proposed, BuyerSigned)
                | (Proposed, FullySigned)
                | (Proposed, Cancelled)
                | (BuyerSigned, FullySigned)
                | (BuyerSigned, Cancelled)
                | (FullySigned, Escrowed)
                | (FullySigned, Cancelled)
                | (Escrowed, Delivered)
                | (Escrowed, Disputed)
                | (Delivered, Completed)
                | (Delivered, Disputed)
                | (Disputed, Completed)
                | (Disputed, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentRecord {
    pub id: String,
    pub commitment: Commitment,
    pub status: CommitmentStatus,
    #[serde(default)]
    pub escrow_tx_hash: Option<String>,
    #[serde(default)]
    pub delivery_confirmation_hash: Option<String>,
    #[serde(default)]
    pub release_tx_hash: Option<String>,
    #[serde(default)]
    pub dispute_id: Option<String>,
    #[serde(default)]
    pub archive_tx_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Metadata fields merge-written by [`crate::builder::CommitmentBuilder::update_status`]
/// when present; absent fields leave the existing value untouched.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdateMeta {
    pub escrow_tx_hash: Option<String>,
    pub delivery_confirmation_hash: Option<String>,
    pub release_tx_hash: Option<String>,
    pub dispute_id: Option<String>,
    pub archive_tx_id: Option<String>,
}
