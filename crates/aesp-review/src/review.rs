//! Review request data model: a human-in-the-loop approval item with a
//! deadline, and the response that resolves it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Responded,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewDecision {
    Approve,
    Reject,
    Modify(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub id: String,
    pub agent_id: String,
    pub action: Value,
    pub reason: String,
    pub status: ReviewStatus,
    pub created_at: i64,
    pub deadline: i64,
    #[serde(default)]
    pub response: Option<ReviewResponse>,
}

impl ReviewRequest {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.deadline
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub request_id: String,
    pub decision: ReviewDecision,
    pub responded_at: i64,
    #[serde(default)]
    pub note: Option<String>,
}

/// Parameters for [`crate::manager::ReviewManager::create_review_request`] and
/// its async counterpart.
#[derive(Debug, Clone)]
pub struct CreateReviewParams {
    pub id: String,
    pub agent_id: String,
    pub action: Value,
    pub reason: String,
    pub deadline_minutes: i64,
}

/// Events published on the review manager's broadcast channel. Delivered on
/// the same cooperative task that produced them, so ordering matches the
/// order requests were resolved.
#[derive(Debug, Clone)]
pub enum ReviewEvent {
    Responded(ReviewResponse),
    FreezeActivated { agent_id: String },
    FreezeCleared { agent_id: String },
}
