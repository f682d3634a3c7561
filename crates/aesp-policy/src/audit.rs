//! Append-only audit log coupling executions to the policies that allowed
//! or rejected them. A ring buffer, not a ledger: the oldest entries are
//! dropped once the cap is reached.

use aesp_core::constants::AUDIT_LOG_CAP;
use aesp_core::push_capped;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub request_id: String,
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub vendor_id: Option<String>,
    pub action: String,
    pub result: bool,
    pub timestamp: i64,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn from_entries(entries: Vec<AuditEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn append(&mut self, entry: AuditEntry) {
        push_capped(&mut self.entries, entry, AUDIT_LOG_CAP);
    }

    /// Whether a successful transfer has ever been recorded under
    /// `policy_id` — the gate `requireReviewBeforeFirstPay` consults this.
    pub fn has_successful_transfer_under_policy(&self, policy_id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.result && e.policy_id.as_deref() == Some(policy_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(policy_id: &str, result: bool) -> AuditEntry {
        AuditEntry {
            request_id: "r".into(),
            policy_id: Some(policy_id.into()),
            vendor_id: None,
            action: "transfer".into(),
            result,
            timestamp: 0,
            amount: Some(10),
        }
    }

    #[test]
    fn trims_oldest_past_cap() {
        let mut log = AuditLog::default();
        for i in 0..(AUDIT_LOG_CAP + 5) {
            log.append(AuditEntry {
                request_id: format!("r{i}"),
                ..entry("p", true)
            });
        }
        assert_eq!(log.entries().len(), AUDIT_LOG_CAP);
        assert_eq!(log.entries()[0].request_id, "r5");
    }

    #[test]
    fn detects_prior_successful_transfer() {
        let mut log = AuditLog::default();
        assert!(!log.has_successful_transfer_under_policy("p1"));
        log.append(entry("p1", false));
        assert!(!log.has_successful_transfer_under_policy("p1"));
        log.append(entry("p1", true));
        assert!(log.has_successful_transfer_under_policy("p1"));
    }
}
