//! The policy engine: the nine-gate `checkAutoApprove` sequence, execution
//! recording, and the provider refresh hook. Internal state lives behind
//! `RefCell` — this engine is driven from one cooperative task and is never
//! shared across an await point with itself, so no lock is needed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use aesp_core::constants::STORAGE_KEY_POLICIES;
use aesp_core::{AespError, AespResult, ExecutionRequest, Storage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntry, AuditLog};
use crate::budget::{BudgetPeriod, BudgetSnapshot, BudgetTracker};
use crate::classify::{classify_policy_change, PolicyChangeClassification};
use crate::policy::Policy;

/// An optional external source of policies (e.g. a vendor-pushed policy
/// feed). `checkAutoApprove` refreshes from it before evaluating. Hosts
/// with no such source simply never construct one.
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    async fn refresh_policies(&self) -> Result<Vec<Policy>, AespError>;
}

/// Why a candidate policy was rejected, surfaced for callers that want the
/// reason instead of just a pass/fail boolean. Ordinary rejections are
/// data, never an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub allowed: bool,
    #[serde(default)]
    pub violated_rule: Option<String>,
    #[serde(default)]
    pub violated_actual: Option<String>,
    #[serde(default)]
    pub violated_limit: Option<String>,
}

impl PolicyDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            violated_rule: None,
            violated_actual: None,
            violated_limit: None,
        }
    }

    fn reject(rule: &str, actual: impl ToString, limit: impl ToString) -> Self {
        Self {
            allowed: false,
            violated_rule: Some(rule.to_string()),
            violated_actual: Some(actual.to_string()),
            violated_limit: Some(limit.to_string()),
        }
    }
}

pub struct PolicyEngine {
    storage: Arc<dyn Storage>,
    provider: Option<Arc<dyn PolicyProvider>>,
    policies: RefCell<Vec<Policy>>,
    audit: RefCell<AuditLog>,
    budgets: RefCell<BudgetTracker>,
}

impl PolicyEngine {
    pub fn new(storage: Arc<dyn Storage>, provider: Option<Arc<dyn PolicyProvider>>) -> Self {
        Self {
            storage,
            provider,
            policies: RefCell::new(Vec::new()),
            audit: RefCell::new(AuditLog::default()),
            budgets: RefCell::new(BudgetTracker::default()),
        }
    }

    /// Loads every policy under the `aesp:policies` prefix, the audit log,
    /// and the budget snapshots. Policies are sorted by `createdAt` since
    /// per-key storage does not preserve insertion order.
    pub async fn load(&self) -> AespResult<()> {
        let prefix = format!("{STORAGE_KEY_POLICIES}:");
        let keys = self.storage.keys(Some(&prefix)).await?;
        let mut loaded = Vec::new();
        for key in keys {
            if let Some(value) = self.storage.get(&key).await? {
                let policy: Policy =
                    serde_json::from_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
                loaded.push(policy);
            }
        }
        loaded.sort_by_key(|p| p.created_at);
        *self.policies.borrow_mut() = loaded;

        if let Some(value) = self.storage.get(aesp_core::constants::STORAGE_KEY_AUDIT).await? {
            let entries: Vec<AuditEntry> =
                serde_json::from_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
            *self.audit.borrow_mut() = AuditLog::from_entries(entries);
        }

        if let Some(value) = self.storage.get(aesp_core::constants::STORAGE_KEY_BUDGETS).await? {
            let snapshots: BTreeMap<String, BudgetSnapshot> =
                serde_json::from_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
            *self.budgets.borrow_mut() = BudgetTracker::from_snapshots(snapshots);
        }
        Ok(())
    }

    pub async fn upsert_policy(&self, policy: Policy) -> AespResult<()> {
        let key = format!("{STORAGE_KEY_POLICIES}:{}", policy.storage_key());
        let value = serde_json::to_value(&policy).map_err(|e| AespError::Serialization(e.to_string()))?;
        self.storage.set(&key, value).await?;

        let mut policies = self.policies.borrow_mut();
        if let Some(slot) = policies.iter_mut().find(|p| p.id == policy.id) {
            *slot = policy;
        } else {
            policies.push(policy);
        }
        Ok(())
    }

    pub fn find_policy(&self, policy_id: &str) -> Option<Policy> {
        self.policies.borrow().iter().find(|p| p.id == policy_id).cloned()
    }

    async fn refresh_from_provider(&self) -> AespResult<()> {
        let Some(provider) = &self.provider else {
            return Ok(());
        };
        for policy in provider.refresh_policies().await? {
            self.upsert_policy(policy).await?;
        }
        Ok(())
    }

    /// The nine-gate evaluation for one candidate policy. Used both by
    /// `check_auto_approve` and directly by callers that want the reason a
    /// specific policy rejected a request.
    pub fn evaluate_policy(&self, request: &ExecutionRequest, policy: &Policy, now_millis: i64) -> PolicyDecision {
        let conditions = &policy.conditions;

        if request.is_transfer_like() {
            let amount = request.amount().unwrap_or(0);
            if amount <= 0 {
                return PolicyDecision::reject("non_positive_amount", amount, 0);
            }
        }

        if let (Some(limit), Some(amount)) = (conditions.max_amount_per_tx, request.amount()) {
            if amount as u64 > limit {
                return PolicyDecision::reject("max_amount_per_tx", amount, limit);
            }
        }

        if let Some(window) = &conditions.time_window {
            match window.parse() {
                Ok(window) => {
                    let minutes = minutes_since_midnight(now_millis);
                    if !window.contains(minutes) {
                        return PolicyDecision::reject("time_window", minutes, format!("{}-{}", window.start_minutes, window.end_minutes));
                    }
                }
                Err(_) => return PolicyDecision::reject("time_window", "invalid", "invalid"),
            }
        }

        if !conditions.allow_list_addresses.is_empty() {
            match request.to_address() {
                Some(addr) if conditions.allow_list_addresses.iter().any(|a| a == addr) => {}
                other => {
                    return PolicyDecision::reject(
                        "allow_list_addresses",
                        other.unwrap_or("<none>"),
                        conditions.allow_list_addresses.join(","),
                    )
                }
            }
        }

        if !conditions.allow_list_chains.is_empty() {
            match request.chain() {
                Some(chain) if conditions.allow_list_chains.iter().any(|c| c == chain) => {}
                other => {
                    return PolicyDecision::reject(
                        "allow_list_chains",
                        other.unwrap_or("<none>"),
                        conditions.allow_list_chains.join(","),
                    )
                }
            }
        }

        if !conditions.allow_list_methods.is_empty() {
            match request.method() {
                Some(method) if conditions.allow_list_methods.iter().any(|m| m == method) => {}
                other => {
                    return PolicyDecision::reject(
                        "allow_list_methods",
                        other.unwrap_or("<none>"),
                        conditions.allow_list_methods.join(","),
                    )
                }
            }
        }

        if conditions.require_review_before_first_pay
            && request.is_transfer_like()
            && !self.audit.borrow().has_successful_transfer_under_policy(&policy.id)
        {
            return PolicyDecision::reject("require_review_before_first_pay", "no_prior_success", "n/a");
        }

        if let (Some(min_balance), Some(projected)) = (conditions.min_balance_after, request.balance_after_hint()) {
            if projected < min_balance {
                return PolicyDecision::reject("min_balance_after", projected, min_balance);
            }
        }

        if request.is_transfer_like() {
            let amount = request.amount().unwrap_or(0);
            let rejected_period = self
                .budgets
                .borrow_mut()
                .check_projected(&policy.agent_id, amount, conditions, now_millis);
            if let Some(period) = rejected_period {
                let rule = match period {
                    BudgetPeriod::PerTransaction => "max_amount_per_tx",
                    BudgetPeriod::Daily => "max_amount_per_day",
                    BudgetPeriod::Weekly => "max_amount_per_week",
                    BudgetPeriod::Monthly => "max_amount_per_month",
                };
                tracing::debug!(policy_id = %policy.id, rule, "budget gate rejected candidate policy");
                return PolicyDecision::reject(rule, amount, "budget_exceeded");
            }
        }

        PolicyDecision::allow()
    }

    /// Refreshes provider policies, filters to candidates whose audience and
    /// scope match the request, then evaluates each in insertion order. The
    /// first that passes every gate wins.
    pub async fn check_auto_approve(&self, request: &ExecutionRequest, now_millis: i64) -> AespResult<Option<String>> {
        self.refresh_from_provider().await?;

        let policies = self.policies.borrow().clone();
        for policy in policies.iter() {
            if policy.is_expired(now_millis) {
                continue;
            }
            if let Some(explicit_policy_id) = request.policy_id() {
                if policy.id != explicit_policy_id {
                    continue;
                }
            }
            if !policy.matches_audience(request.vendor_id(), request.agent_id()) {
                continue;
            }
            if !policy.scope.matches_action(request) {
                continue;
            }
            let decision = self.evaluate_policy(request, policy, now_millis);
            if decision.allowed {
                tracing::info!(policy_id = %policy.id, "request auto-approved");
                return Ok(Some(policy.id.clone()));
            }
            tracing::debug!(
                policy_id = %policy.id,
                rule = decision.violated_rule.as_deref().unwrap_or("?"),
                "candidate policy rejected request"
            );
        }
        tracing::warn!("no candidate policy auto-approved the request");
        Ok(None)
    }

    /// Appends an audit entry and, on a successful transfer, records the
    /// spend against the agent's budget. The amount comes from the request
    /// when supplied, else from the caller-observed result amount.
    pub async fn record_execution(
        &self,
        request_id: &str,
        policy_id: Option<&str>,
        result: bool,
        request: Option<&ExecutionRequest>,
        result_amount: Option<i64>,
        now_millis: i64,
    ) -> AespResult<()> {
        let amount = request.and_then(|r| r.amount()).or(result_amount);
        let vendor_id = request.and_then(|r| r.vendor_id()).map(str::to_string);
        let action = request
            .map(action_name)
            .unwrap_or("unknown")
            .to_string();

        self.audit.borrow_mut().append(AuditEntry {
            request_id: request_id.to_string(),
            policy_id: policy_id.map(str::to_string),
            vendor_id,
            action,
            result,
            timestamp: now_millis,
            amount,
        });
        self.persist_audit().await?;

        if result {
            if let (Some(request), Some(amount)) = (request, amount) {
                if request.is_transfer_like() {
                    self.budgets
                        .borrow_mut()
                        .record_spend(request.agent_id(), request_id, amount, now_millis);
                    self.persist_budgets().await?;
                }
            }
        }
        Ok(())
    }

    async fn persist_audit(&self) -> AespResult<()> {
        let value = serde_json::to_value(self.audit.borrow().entries())
            .map_err(|e| AespError::Serialization(e.to_string()))?;
        self.storage.set(aesp_core::constants::STORAGE_KEY_AUDIT, value).await
    }

    async fn persist_budgets(&self) -> AespResult<()> {
        let value = serde_json::to_value(self.budgets.borrow().snapshots())
            .map_err(|e| AespError::Serialization(e.to_string()))?;
        self.storage.set(aesp_core::constants::STORAGE_KEY_BUDGETS, value).await
    }

    /// Classifies `new` against the policy it would replace (by id), or as
    /// unconditionally `auto` when there is no such policy yet.
    pub fn classify_policy_change(&self, new: &Policy) -> PolicyChangeClassification {
        let existing = self.find_policy(&new.id);
        classify_policy_change(new, existing.as_ref())
    }
}

fn action_name(request: &ExecutionRequest) -> &'static str {
    match request {
        ExecutionRequest::Transfer(_) => "transfer",
        ExecutionRequest::SendTransaction(_) => "send_transaction",
        ExecutionRequest::SignPersonal(_) => "sign_personal",
        ExecutionRequest::SignTypedData(_) => "sign_typed_data",
    }
}

fn minutes_since_midnight(epoch_millis: i64) -> u16 {
    use chrono::{Local, TimeZone, Timelike};
    let local = Local
        .timestamp_millis_opt(epoch_millis)
        .single()
        .unwrap_or_else(Local::now);
    (local.hour() * 60 + local.minute()) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use aesp_core::{MemoryStorage, TransferRequest};
    use crate::policy::{Escalation, PolicyConditions, PolicyScope};

    fn engine() -> PolicyEngine {
        PolicyEngine::new(Arc::new(MemoryStorage::default()), None)
    }

    fn policy(id: &str, agent_id: &str, max_per_tx: u64, max_per_day: u64) -> Policy {
        Policy {
            id: id.into(),
            agent_id: agent_id.into(),
            agent_label: "agent".into(),
            scope: PolicyScope::AutoPayment,
            conditions: PolicyConditions {
                max_amount_per_tx: Some(max_per_tx),
                max_amount_per_day: Some(max_per_day),
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

    fn transfer(agent_id: &str, amount: i64, chain: Option<&str>) -> ExecutionRequest {
        ExecutionRequest::Transfer(TransferRequest {
            request_id: "r1".into(),
            agent_id: agent_id.into(),
            vendor_id: None,
            policy_id: None,
            amount,
            to_address: None,
            chain: chain.map(str::to_string),
            balance_after_hint: None,
        })
    }

    #[tokio::test]
    async fn auto_approves_within_limits_and_rejects_over_limit() {
        let engine = engine();
        let agent = "a".repeat(64);
        engine.upsert_policy(policy("p1", &agent, 50, 200)).await.unwrap();

        let approved = engine.check_auto_approve(&transfer(&agent, 45, Some("ethereum")), 0).await.unwrap();
        assert_eq!(approved, Some("p1".to_string()));

        let rejected = engine.check_auto_approve(&transfer(&agent, 500, Some("ethereum")), 0).await.unwrap();
        assert_eq!(rejected, None);
    }

    #[tokio::test]
    async fn first_pay_review_requires_one_recorded_success_first() {
        let engine = engine();
        let agent = "a".repeat(64);
        let mut p = policy("p1", &agent, 50, 200);
        p.conditions.require_review_before_first_pay = true;
        engine.upsert_policy(p).await.unwrap();

        let request = transfer(&agent, 10, None);
        assert_eq!(engine.check_auto_approve(&request, 0).await.unwrap(), None);

        engine
            .record_execution("r1", Some("p1"), true, Some(&request), None, 0)
            .await
            .unwrap();

        let second_request = transfer(&agent, 10, None);
        assert_eq!(
            engine.check_auto_approve(&second_request, 0).await.unwrap(),
            Some("p1".to_string())
        );
    }

    #[tokio::test]
    async fn nonpositive_amount_is_rejected() {
        let engine = engine();
        let agent = "a".repeat(64);
        engine.upsert_policy(policy("p1", &agent, 50, 200)).await.unwrap();
        assert_eq!(engine.check_auto_approve(&transfer(&agent, 0, None), 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_policy_is_skipped() {
        let engine = engine();
        let agent = "a".repeat(64);
        let mut p = policy("p1", &agent, 50, 200);
        p.expires_at = Some(100);
        engine.upsert_policy(p).await.unwrap();
        assert_eq!(engine.check_auto_approve(&transfer(&agent, 10, None), 200).await.unwrap(), None);
    }
}
