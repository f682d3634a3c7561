//! Policy data model: scope, escalation tier, and the enumerated condition
//! set the engine evaluates requests against.

use aesp_core::constants::MAX_CONDITION_AMOUNT;
use aesp_core::{AespError, ExecutionRequest, TimeWindow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    AutoPayment,
    Negotiation,
    Commitment,
    DelegatedNegotiation,
    Full,
}

impl PolicyScope {
    /// `full` matches every action; `auto_payment` matches transfer-like
    /// actions; `negotiation`/`delegated_negotiation` match `sign_personal`;
    /// `commitment` matches `sign_typed_data`.
    pub fn matches_action(self, request: &ExecutionRequest) -> bool {
        match self {
            Self::Full => true,
            Self::AutoPayment => request.is_transfer_like(),
            Self::Negotiation | Self::DelegatedNegotiation => {
                matches!(request, ExecutionRequest::SignPersonal(_))
            }
            Self::Commitment => matches!(request, ExecutionRequest::SignTypedData(_)),
        }
    }

    /// Used by [`crate::classify::classify_policy_change`] to detect a scope
    /// escalation. `delegated_negotiation` shares `commitment`'s rank —
    /// both sit above plain negotiation but below `full`.
    pub fn rank(self) -> u8 {
        match self {
            Self::AutoPayment => 1,
            Self::Negotiation => 2,
            Self::Commitment | Self::DelegatedNegotiation => 3,
            Self::Full => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    Block,
    AskParentAgent,
    AskHuman,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindowSpec {
    pub start: String,
    pub end: String,
}

impl TimeWindowSpec {
    pub fn parse(&self) -> Result<TimeWindow, AespError> {
        TimeWindow::parse(&self.start, &self.end)
    }
}

fn clamp_amount(amount: Option<u64>) -> Option<u64> {
    amount.map(|a| if a > MAX_CONDITION_AMOUNT { 0 } else { a })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConditions {
    #[serde(default)]
    pub max_amount_per_tx: Option<u64>,
    #[serde(default)]
    pub max_amount_per_day: Option<u64>,
    #[serde(default)]
    pub max_amount_per_week: Option<u64>,
    #[serde(default)]
    pub max_amount_per_month: Option<u64>,
    #[serde(default)]
    pub allow_list_addresses: Vec<String>,
    #[serde(default)]
    pub allow_list_chains: Vec<String>,
    #[serde(default)]
    pub allow_list_methods: Vec<String>,
    #[serde(default)]
    pub min_balance_after: Option<i64>,
    #[serde(default)]
    pub require_review_before_first_pay: bool,
    #[serde(default)]
    pub time_window: Option<TimeWindowSpec>,
}

impl PolicyConditions {
    /// Out-of-range condition amounts (above `2^53 - 1`) collapse to 0
    /// rather than being rejected outright.
    pub fn validated(mut self) -> Self {
        self.max_amount_per_tx = clamp_amount(self.max_amount_per_tx);
        self.max_amount_per_day = clamp_amount(self.max_amount_per_day);
        self.max_amount_per_week = clamp_amount(self.max_amount_per_week);
        self.max_amount_per_month = clamp_amount(self.max_amount_per_month);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub agent_id: String,
    pub agent_label: String,
    pub scope: PolicyScope,
    pub conditions: PolicyConditions,
    pub escalation: Escalation,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub parent_agent_id: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl Policy {
    /// The storage address this policy is persisted at: `vendorId:id` when
    /// vendor-scoped, else bare `id`.
    pub fn storage_key(&self) -> String {
        match &self.vendor_id {
            Some(vendor_id) => format!("{vendor_id}:{}", self.id),
            None => self.id.clone(),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }

    /// A request matches this policy's audience when its `vendorId` equals
    /// the policy's, falling back to matching the policy's `agentId` when
    /// the request carries no vendor.
    pub fn matches_audience(&self, request_vendor_id: Option<&str>, request_agent_id: &str) -> bool {
        match request_vendor_id {
            Some(vendor_id) => self.vendor_id.as_deref() == Some(vendor_id),
            None => self.agent_id == request_agent_id,
        }
    }
}
