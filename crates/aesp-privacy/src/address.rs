//! The ephemeral address record and the small enums that describe it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Transparent,
    Basic,
    Isolated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressStatus {
    Available,
    Assigned,
    Funded,
    Spent,
    Consolidated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
    pub address: String,
    pub agent_id: String,
    pub chain: String,
    pub direction: Direction,
    pub context: String,
    pub status: AddressStatus,
    pub sequence: u64,
    pub created_at: i64,
    #[serde(default)]
    pub assigned_tx_uuid: Option<String>,
    #[serde(default)]
    pub used_at: Option<i64>,
    #[serde(default)]
    pub consolidation_tx_hash: Option<String>,
}
