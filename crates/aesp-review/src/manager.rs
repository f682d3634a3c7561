//! Human-in-the-loop review queue: blocking and fire-and-forget request
//! creation, response submission, emergency freeze, and disposal.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use aesp_core::constants::{STORAGE_KEY_FREEZE_STATUS, STORAGE_KEY_REVIEW_QUEUE};
use aesp_core::{AespError, AespResult, ReviewConfig, Storage};
use tokio::sync::{broadcast, oneshot};

use crate::review::{CreateReviewParams, ReviewDecision, ReviewEvent, ReviewRequest, ReviewResponse, ReviewStatus};

/// Queue of pending human reviews plus the freeze flag that can cancel them
/// outright. `!Sync` by construction: all state lives behind `RefCell`, with
/// `oneshot`/`broadcast` channels as the only genuine concurrency involved.
pub struct ReviewManager {
    storage: Arc<dyn Storage>,
    config: ReviewConfig,
    requests: RefCell<BTreeMap<String, ReviewRequest>>,
    waiters: RefCell<HashMap<String, oneshot::Sender<AespResult<ReviewResponse>>>>,
    frozen: RefCell<BTreeSet<String>>,
    events: broadcast::Sender<ReviewEvent>,
}

impl ReviewManager {
    pub fn new(storage: Arc<dyn Storage>, config: ReviewConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            storage,
            config,
            requests: RefCell::new(BTreeMap::new()),
            waiters: RefCell::new(HashMap::new()),
            frozen: RefCell::new(BTreeSet::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReviewEvent> {
        self.events.subscribe()
    }

    /// Loads the review queue and freeze status. Does not recreate waiters
    /// for previously-pending requests; callers must re-request blocking
    /// review or re-surface pending items to the UI after load.
    pub async fn load(&self) -> AespResult<()> {
        if let Some(value) = self.storage.get(STORAGE_KEY_REVIEW_QUEUE).await? {
            let requests: BTreeMap<String, ReviewRequest> =
                serde_json::from_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
            *self.requests.borrow_mut() = requests;
        }
        if let Some(value) = self.storage.get(STORAGE_KEY_FREEZE_STATUS).await? {
            let frozen: BTreeSet<String> =
                serde_json::from_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
            *self.frozen.borrow_mut() = frozen;
        }
        Ok(())
    }

    async fn persist_requests(&self) -> AespResult<()> {
        let value = serde_json::to_value(&*self.requests.borrow())
            .map_err(|e| AespError::Serialization(e.to_string()))?;
        self.storage.set(STORAGE_KEY_REVIEW_QUEUE, value).await
    }

    async fn persist_freeze(&self) -> AespResult<()> {
        let value = serde_json::to_value(&*self.frozen.borrow())
            .map_err(|e| AespError::Serialization(e.to_string()))?;
        self.storage.set(STORAGE_KEY_FREEZE_STATUS, value).await
    }

    pub fn get(&self, id: &str) -> Option<ReviewRequest> {
        self.requests.borrow().get(id).cloned()
    }

    pub fn is_frozen(&self, agent_id: &str) -> bool {
        self.frozen.borrow().contains(agent_id)
    }

    fn new_request(&self, params: &CreateReviewParams, created_at: i64) -> ReviewRequest {
        let minutes = if params.deadline_minutes > 0 {
            params.deadline_minutes
        } else {
            self.config.default_deadline_minutes
        };
        ReviewRequest {
            id: params.id.clone(),
            agent_id: params.agent_id.clone(),
            action: params.action.clone(),
            reason: params.reason.clone(),
            status: ReviewStatus::Pending,
            created_at,
            deadline: created_at + minutes * 60,
            response: None,
        }
    }

    /// Fire-and-forget: inserts the request and returns it synchronously
    /// without registering a waiter.
    pub async fn create_review_request_async(
        &self,
        params: CreateReviewParams,
        created_at: i64,
    ) -> AespResult<ReviewRequest> {
        if self.is_frozen(&params.agent_id) {
            return Err(AespError::AgentFrozen(params.agent_id));
        }
        let request = self.new_request(&params, created_at);
        self.requests.borrow_mut().insert(request.id.clone(), request.clone());
        self.persist_requests().await?;
        Ok(request)
    }

    /// Blocking: refuses outright if the agent is frozen, otherwise inserts
    /// the request, registers a waiter, and awaits a response, the deadline,
    /// or a freeze — whichever comes first.
    pub async fn create_review_request(
        &self,
        params: CreateReviewParams,
        created_at: i64,
    ) -> AespResult<ReviewResponse> {
        if self.is_frozen(&params.agent_id) {
            return Err(AespError::AgentFrozen(params.agent_id));
        }
        let request = self.new_request(&params, created_at);
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        self.requests.borrow_mut().insert(id.clone(), request);
        self.waiters.borrow_mut().insert(id.clone(), tx);
        self.persist_requests().await?;

        let deadline_secs = (params.deadline_minutes.max(0)) * 60;
        let timeout = Duration::from_secs(deadline_secs.max(1) as u64);

        let result = tokio::select! {
            resolved = rx => resolved.map_err(|_| AespError::Disposed).and_then(|r| r),
            _ = tokio::time::sleep(timeout) => {
                self.expire(&id, created_at + deadline_secs).await?;
                tracing::warn!(request_id = %id, "review request expired before a response was submitted");
                Err(AespError::ReviewExpired(id.clone()))
            }
        };
        self.waiters.borrow_mut().remove(&id);
        result
    }

    async fn expire(&self, id: &str, now: i64) -> AespResult<()> {
        let mut requests = self.requests.borrow_mut();
        if let Some(request) = requests.get_mut(id) {
            if request.status == ReviewStatus::Pending {
                request.status = ReviewStatus::Expired;
            }
        }
        let _ = now;
        drop(requests);
        self.persist_requests().await
    }

    pub async fn submit_response(&self, response: ReviewResponse, now: i64) -> AespResult<ReviewRequest> {
        let mut requests = self.requests.borrow_mut();
        let request = requests
            .get_mut(&response.request_id)
            .ok_or_else(|| AespError::ReviewNotFound(response.request_id.clone()))?;

        if request.status != ReviewStatus::Pending {
            return Err(AespError::ReviewAlreadyResolved(response.request_id.clone()));
        }

        request.status = ReviewStatus::Responded;
        request.response = Some(response.clone());
        let out = request.clone();
        drop(requests);

        if let Some(waiter) = self.waiters.borrow_mut().remove(&response.request_id) {
            let _ = waiter.send(Ok(response.clone()));
        }
        tracing::info!(request_id = %response.request_id, "review request resolved");
        let _ = self.events.send(ReviewEvent::Responded(response));
        let _ = now;
        self.persist_requests().await?;
        Ok(out)
    }

    /// Freezes the agent, then expires and rejects every one of its still-
    /// pending requests.
    pub async fn freeze_agent(&self, agent_id: &str) -> AespResult<()> {
        self.frozen.borrow_mut().insert(agent_id.to_string());

        let pending_ids: Vec<String> = self
            .requests
            .borrow()
            .values()
            .filter(|r| r.agent_id == agent_id && r.status == ReviewStatus::Pending)
            .map(|r| r.id.clone())
            .collect();

        for id in &pending_ids {
            if let Some(request) = self.requests.borrow_mut().get_mut(id) {
                request.status = ReviewStatus::Expired;
            }
            if let Some(waiter) = self.waiters.borrow_mut().remove(id) {
                let _ = waiter.send(Err(AespError::AgentFrozen(agent_id.to_string())));
            }
        }

        tracing::info!(agent_id, pending = pending_ids.len(), "agent frozen, pending reviews expired");
        let _ = self.events.send(ReviewEvent::FreezeActivated {
            agent_id: agent_id.to_string(),
        });
        self.persist_freeze().await?;
        self.persist_requests().await
    }

    pub async fn unfreeze_agent(&self, agent_id: &str) -> AespResult<()> {
        self.frozen.borrow_mut().remove(agent_id);
        let _ = self.events.send(ReviewEvent::FreezeCleared {
            agent_id: agent_id.to_string(),
        });
        self.persist_freeze().await
    }

    /// Cancels every deadline wait and rejects every outstanding waiter with
    /// [`AespError::Disposed`].
    pub fn dispose(&self) {
        for (_, waiter) in self.waiters.borrow_mut().drain() {
            let _ = waiter.send(Err(AespError::Disposed));
        }
    }
}

impl Drop for ReviewManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aesp_core::MemoryStorage;
    use serde_json::json;

    fn manager() -> ReviewManager {
        ReviewManager::new(Arc::new(MemoryStorage::default()), ReviewConfig::default())
    }

    fn params(id: &str, agent: &str, minutes: i64) -> CreateReviewParams {
        CreateReviewParams {
            id: id.to_string(),
            agent_id: agent.to_string(),
            action: json!({"kind": "transfer"}),
            reason: "over policy threshold".into(),
            deadline_minutes: minutes,
        }
    }

    #[tokio::test]
    async fn async_request_is_queryable_without_waiting() {
        let m = manager();
        let request = m.create_review_request_async(params("r1", "agent-1", 30), 0).await.unwrap();
        assert_eq!(request.status, ReviewStatus::Pending);
        assert_eq!(m.get("r1").unwrap().status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn frozen_agent_refuses_new_requests() {
        let m = manager();
        m.freeze_agent("agent-1").await.unwrap();
        let err = m
            .create_review_request_async(params("r1", "agent-1", 30), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AespError::AgentFrozen(_)));
    }

    #[tokio::test]
    async fn blocking_request_resolves_on_submitted_response() {
        let m = manager();

        let waiting = m.create_review_request(params("r1", "agent-1", 30), 0);
        let responding = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let response = ReviewResponse {
                request_id: "r1".into(),
                decision: ReviewDecision::Approve,
                responded_at: 1,
                note: None,
            };
            m.submit_response(response, 1).await.unwrap();
        };

        let (resolved, ()) = tokio::join!(waiting, responding);
        let resolved = resolved.unwrap();
        assert_eq!(resolved.request_id, "r1");
        assert!(matches!(resolved.decision, ReviewDecision::Approve));
    }

    #[tokio::test]
    async fn duplicate_response_is_rejected() {
        let m = manager();
        m.create_review_request_async(params("r1", "agent-1", 30), 0).await.unwrap();
        let response = ReviewResponse {
            request_id: "r1".into(),
            decision: ReviewDecision::Reject,
            responded_at: 1,
            note: None,
        };
        m.submit_response(response.clone(), 1).await.unwrap();
        let err = m.submit_response(response, 2).await.unwrap_err();
        assert!(matches!(err, AespError::ReviewAlreadyResolved(_)));
    }

    #[tokio::test]
    async fn freeze_expires_pending_request_and_rejects_waiter() {
        let m = manager();

        let waiting = m.create_review_request(params("r1", "agent-1", 30), 0);
        let freezing = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            m.freeze_agent("agent-1").await.unwrap();
        };

        let (waited, ()) = tokio::join!(waiting, freezing);
        assert!(matches!(waited.unwrap_err(), AespError::AgentFrozen(_)));
        assert_eq!(m.get("r1").unwrap().status, ReviewStatus::Expired);
    }

    #[tokio::test]
    async fn dispose_rejects_outstanding_waiters() {
        let m = manager();

        let waiting = m.create_review_request(params("r1", "agent-1", 30), 0);
        let disposing = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            m.dispose();
        };

        let (waited, ()) = tokio::join!(waiting, disposing);
        assert!(matches!(waited.unwrap_err(), AespError::Disposed));
    }
}
