use std::sync::Arc;
use std::time::Duration;

use aesp::prelude::*;
use aesp::testing::{StubArchiveUploader, StubConsolidationHandler, StubNftMinter};
use serde_json::json;

fn agent() -> Agent {
    let identity = AgentIdentity {
        agent_id: aesp_core::AgentId::new("a".repeat(64)).unwrap(),
        did: "did:aesp:principal".into(),
        public_key: vec![0u8; 32],
        derivation_path: "m/44'/501'/0'/0'/0'".into(),
    };
    Agent::new(
        identity,
        AgentDeps {
            storage: Arc::new(MemoryStorage::default()),
            crypto: Arc::new(Ed25519Crypto::from_seed([9u8; 32])),
            consolidation_handler: Arc::new(StubConsolidationHandler::default()),
            archiver: Arc::new(StubArchiveUploader::default()),
            minter: Arc::new(StubNftMinter::default()),
        },
    )
}

#[tokio::test]
async fn freeze_cancels_pending_review() {
    let a = agent();
    let agent_id = "e".repeat(64);

    let waiting = a.review.create_review_request(
        CreateReviewParams {
            id: "rev-1".into(),
            agent_id: agent_id.clone(),
            action: json!({"kind": "transfer", "amount": 500}),
            reason: "over policy threshold".into(),
            deadline_minutes: 30,
        },
        0,
    );
    let freezing = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        a.review.freeze_agent(&agent_id).await.unwrap();
    };

    let (waited, ()) = tokio::join!(waiting, freezing);
    let err = waited.unwrap_err();
    assert!(matches!(err, AespError::AgentFrozen(id) if id == agent_id));
    assert_eq!(a.review.get("rev-1").unwrap().status, aesp_review::ReviewStatus::Expired);
}
