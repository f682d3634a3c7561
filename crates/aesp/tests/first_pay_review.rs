use std::sync::Arc;

use aesp::prelude::*;
use aesp::testing::{StubArchiveUploader, StubConsolidationHandler, StubNftMinter};
use aesp_policy::{Escalation, PolicyConditions, PolicyScope};

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

fn transfer(agent_id: &str, request_id: &str) -> ExecutionRequest {
    ExecutionRequest::Transfer(TransferRequest {
        request_id: request_id.into(),
        agent_id: agent_id.into(),
        vendor_id: None,
        policy_id: None,
        amount: 10,
        to_address: None,
        chain: None,
        balance_after_hint: None,
    })
}

#[tokio::test]
async fn first_pay_review() {
    let a = agent();
    let agent_id = "d".repeat(64);

    a.policy
        .upsert_policy(Policy {
            id: "p1".into(),
            agent_id: agent_id.clone(),
            agent_label: "vendor-payer".into(),
            scope: PolicyScope::AutoPayment,
            conditions: PolicyConditions {
                max_amount_per_tx: Some(50),
                require_review_before_first_pay: true,
                ..Default::default()
            },
            escalation: Escalation::AskHuman,
            vendor_id: None,
            parent_agent_id: None,
            created_at: 0,
            expires_at: None,
            signature: None,
        })
        .await
        .unwrap();

    let first = transfer(&agent_id, "req-1");
    let result = a.policy.check_auto_approve(&first, 0).await.unwrap();
    assert_eq!(result, None, "first transfer must escalate pending review");

    a.policy
        .record_execution("req-1", Some("p1"), true, Some(&first), None, 0)
        .await
        .unwrap();

    let second = transfer(&agent_id, "req-2");
    let result = a.policy.check_auto_approve(&second, 1).await.unwrap();
    assert_eq!(result, Some("p1".to_string()));
}
