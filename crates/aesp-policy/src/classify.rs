//! Classifies a pending policy edit as `auto`, `review`, or `biometric`
//! based on which conditions were relaxed relative to the policy it
//! replaces.

use serde::{Deserialize, Serialize};

use crate::policy::Policy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    Auto,
    Review,
    Biometric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyChangeClassification {
    pub requires_escalation: bool,
    pub approval_level: ApprovalLevel,
    pub critical_changes: Vec<String>,
    pub reasons: Vec<String>,
}

const BIOMETRIC_TRIGGERS: &[&str] = &[
    "budget_increase",
    "scope_escalation",
    "allowlist_address_remove_all",
];

/// With no existing policy of that id, every change is `auto` — there is
/// nothing to compare against. Otherwise walks the field set the
/// specification names and tags each relaxation found.
pub fn classify_policy_change(new: &Policy, existing: Option<&Policy>) -> PolicyChangeClassification {
    let Some(existing) = existing else {
        return PolicyChangeClassification {
            requires_escalation: false,
            approval_level: ApprovalLevel::Auto,
            critical_changes: Vec::new(),
            reasons: Vec::new(),
        };
    };

    let mut critical_changes = Vec::new();
    let mut reasons = Vec::new();

    let budget_raised = [
        (existing.conditions.max_amount_per_tx, new.conditions.max_amount_per_tx),
        (existing.conditions.max_amount_per_day, new.conditions.max_amount_per_day),
        (existing.conditions.max_amount_per_week, new.conditions.max_amount_per_week),
        (existing.conditions.max_amount_per_month, new.conditions.max_amount_per_month),
    ]
    .iter()
    .any(|(old, new)| new.unwrap_or(0) > old.unwrap_or(0));
    if budget_raised {
        critical_changes.push("budget_increase".to_string());
        reasons.push("a per-tx/day/week/month amount limit was raised".to_string());
    }

    let added_address = new
        .conditions
        .allow_list_addresses
        .iter()
        .any(|a| !existing.conditions.allow_list_addresses.contains(a));
    if added_address {
        critical_changes.push("allowlist_address_add".to_string());
        reasons.push("a new address was added to the allowlist".to_string());
    }

    let cleared_addresses = !existing.conditions.allow_list_addresses.is_empty()
        && new.conditions.allow_list_addresses.is_empty();
    if cleared_addresses {
        critical_changes.push("allowlist_address_remove_all".to_string());
        reasons.push("the address allowlist was cleared entirely".to_string());
    }

    if new.scope.rank() > existing.scope.rank() {
        critical_changes.push("scope_escalation".to_string());
        reasons.push(format!(
            "scope widened from {:?} to {:?}",
            existing.scope, new.scope
        ));
    }

    if existing.conditions.time_window.is_some() && new.conditions.time_window.is_none() {
        critical_changes.push("time_window_remove".to_string());
        reasons.push("the time-of-day restriction was removed".to_string());
    }

    let min_balance_lowered = match (
        existing.conditions.min_balance_after,
        new.conditions.min_balance_after,
    ) {
        (Some(old), Some(new)) => new < old,
        (Some(_), None) => true,
        _ => false,
    };
    if min_balance_lowered {
        critical_changes.push("min_balance_lower".to_string());
        reasons.push("the minimum post-spend balance requirement was lowered".to_string());
    }

    if existing.conditions.require_review_before_first_pay && !new.conditions.require_review_before_first_pay {
        critical_changes.push("first_pay_review_disable".to_string());
        reasons.push("the first-pay human review requirement was disabled".to_string());
    }

    let expiration_extended = match (existing.expires_at, new.expires_at) {
        (Some(_), None) => true,
        (Some(old), Some(new)) => new > old,
        _ => false,
    };
    if expiration_extended {
        critical_changes.push("expiration_extend".to_string());
        reasons.push("the policy's expiration was extended or removed".to_string());
    }

    let approval_level = if critical_changes.iter().any(|c| BIOMETRIC_TRIGGERS.contains(&c.as_str())) {
        ApprovalLevel::Biometric
    } else if !critical_changes.is_empty() {
        ApprovalLevel::Review
    } else {
        ApprovalLevel::Auto
    };

    PolicyChangeClassification {
        requires_escalation: !critical_changes.is_empty(),
        approval_level,
        critical_changes,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Escalation, PolicyConditions, PolicyScope};

    fn base_policy(max_amount_per_day: u64) -> Policy {
        Policy {
            id: "p1".into(),
            agent_id: "a".repeat(64),
            agent_label: "agent".into(),
            scope: PolicyScope::AutoPayment,
            conditions: PolicyConditions {
                max_amount_per_day: Some(max_amount_per_day),
                ..Default::default()
            },
            escalation: Escalation::AskHuman,
            vendor_id: None,
            parent_agent_id: None,
            created_at: 0,
            expires_at: None,
            signature: None,
        }
    }

    #[test]
    fn no_existing_policy_is_always_auto() {
        let new = base_policy(400);
        let result = classify_policy_change(&new, None);
        assert_eq!(result.approval_level, ApprovalLevel::Auto);
        assert!(!result.requires_escalation);
    }

    #[test]
    fn raising_daily_budget_is_biometric() {
        let existing = base_policy(200);
        let new = base_policy(400);
        let result = classify_policy_change(&new, Some(&existing));
        assert!(result.requires_escalation);
        assert_eq!(result.approval_level, ApprovalLevel::Biometric);
        assert_eq!(result.critical_changes, vec!["budget_increase"]);
    }

    #[test]
    fn adding_allowlist_address_is_review_not_biometric() {
        let mut existing = base_policy(200);
        existing.conditions.allow_list_addresses = vec!["0xabc".into()];
        let mut new = existing.clone();
        new.conditions.allow_list_addresses = vec!["0xabc".into(), "0xdef".into()];
        let result = classify_policy_change(&new, Some(&existing));
        assert_eq!(result.approval_level, ApprovalLevel::Review);
        assert_eq!(result.critical_changes, vec!["allowlist_address_add"]);
    }

    #[test]
    fn clearing_allowlist_is_biometric() {
        let mut existing = base_policy(200);
        existing.conditions.allow_list_addresses = vec!["0xabc".into()];
        let mut new = existing.clone();
        new.conditions.allow_list_addresses = vec![];
        let result = classify_policy_change(&new, Some(&existing));
        assert_eq!(result.approval_level, ApprovalLevel::Biometric);
    }

    #[test]
    fn identical_policies_yield_no_changes() {
        let existing = base_policy(200);
        let new = existing.clone();
        let result = classify_policy_change(&new, Some(&existing));
        assert!(result.critical_changes.is_empty());
        assert!(!result.requires_escalation);
        assert_eq!(result.approval_level, ApprovalLevel::Auto);
    }
}
