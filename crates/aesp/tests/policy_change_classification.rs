use std::sync::Arc;

use aesp::prelude::*;
use aesp::testing::{StubArchiveUploader, StubConsolidationHandler, StubNftMinter};
use aesp_policy::{ApprovalLevel, Escalation, PolicyConditions, PolicyScope};

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

fn policy(agent_id: &str, max_per_day: u64) -> Policy {
    Policy {
        id: "p1".into(),
        agent_id: agent_id.into(),
        agent_label: "vendor-payer".into(),
        scope: PolicyScope::AutoPayment,
        conditions: PolicyConditions {
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

#[tokio::test]
async fn policy_change_classification() {
    let a = agent();
    let agent_id = "c".repeat(64);

    let existing = policy(&agent_id, 200);
    a.policy.upsert_policy(existing).await.unwrap();

    let proposed = policy(&agent_id, 400);
    let classification = a.policy.classify_policy_change(&proposed);

    assert!(classification.requires_escalation);
    assert_eq!(classification.approval_level, ApprovalLevel::Biometric);
    assert_eq!(classification.critical_changes, vec!["budget_increase".to_string()]);
}
