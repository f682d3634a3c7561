use std::sync::Arc;

use aesp::prelude::*;
use aesp::testing::{StubArchiveUploader, StubConsolidationHandler, StubNftMinter};
use aesp_privacy::AddressStatus;

fn agent() -> Agent {
    let identity = AgentIdentity {
        agent_id: aesp_core::AgentId::new("a".repeat(64)).unwrap(),
        did: "did:aesp:principal".into(),
        public_key: vec![0u8; 32],
        derivation_path: "m/44'/501'/0'/0'/0'".into(),
    };
    Agent::with_consolidation_config(
        identity,
        AgentDeps {
            storage: Arc::new(MemoryStorage::default()),
            crypto: Arc::new(Ed25519Crypto::from_seed([9u8; 32])),
            consolidation_handler: Arc::new(StubConsolidationHandler::default()),
            archiver: Arc::new(StubArchiveUploader::default()),
            minter: Arc::new(StubNftMinter::default()),
        },
        aesp_core::ConsolidationConfig {
            max_batch_size: 3,
            inter_batch_delay_range_secs: (0, 0),
            ..aesp_core::ConsolidationConfig::default()
        },
    )
}

#[tokio::test]
async fn batched_consolidation() {
    let a = agent();
    let agent_id = "f".repeat(64);

    let mut addresses = Vec::new();
    for i in 0..7 {
        let record = a
            .pool
            .derive_ephemeral_address(&agent_id, ChainKind::Evm, "ethereum", Direction::Inbound, i)
            .await
            .unwrap();
        a.pool.update_address_status(&record.address, AddressStatus::Funded).unwrap();

        a.tags
            .create_tag(
                CreateTagParams {
                    id: format!("tag-{i}"),
                    address: record.address.clone(),
                    agent_id: agent_id.clone(),
                    context: record.context.clone(),
                    amount: 10,
                },
                i,
            )
            .await
            .unwrap();

        addresses.push(record.address.clone());
    }

    let batches = a
        .consolidation
        .consolidate_batched("sweep", "0xvault", "ethereum", &a.pool, &a.tags, 42, 100)
        .await
        .unwrap();

    let mut sizes: Vec<usize> = batches.iter().map(|b| b.addresses.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 3, 3]);

    let mut union: Vec<String> = batches.iter().flat_map(|b| b.addresses.clone()).collect();
    union.sort();
    assert_eq!(union, {
        let mut expected = addresses.clone();
        expected.sort();
        expected
    });

    assert!(a.pool.get_addresses_for_consolidation("ethereum").is_empty(), "every source address is swept");

    for (i, address) in addresses.iter().enumerate() {
        let batch = batches.iter().find(|b| b.addresses.contains(address)).unwrap();
        let tag = a.tags.get(&format!("tag-{i}")).unwrap();
        assert_eq!(tag.vault_consolidation_tx_hash, batch.tx_hash);
    }
}
