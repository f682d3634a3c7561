//! Reference capability stubs for integration tests: an in-memory
//! consolidation handler, archive uploader, and NFT minter, mirroring the
//! shape of `aesp_core::MemoryStorage` and `aesp_crypto::Ed25519Crypto` as
//! the "no external service" implementations the test harness wires up.

use std::sync::atomic::{AtomicU64, Ordering};

use aesp_core::capability::{ArchiveUploader, ConsolidationHandler, ConsolidationRequest};
use aesp_core::{AespError, NftMinter};
use async_trait::async_trait;
use serde_json::Value;

/// Always succeeds, returning a counter-derived tx hash.
#[derive(Default)]
pub struct StubConsolidationHandler {
    counter: AtomicU64,
}

#[async_trait]
impl ConsolidationHandler for StubConsolidationHandler {
    async fn consolidate(&self, request: ConsolidationRequest) -> Result<String, AespError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xtx-{n}-{}", request.from_addresses.len()))
    }
}

#[derive(Default)]
pub struct StubArchiveUploader {
    counter: AtomicU64,
}

#[async_trait]
impl ArchiveUploader for StubArchiveUploader {
    async fn upload(&self, _bytes: Vec<u8>, _content_type: &str) -> Result<String, AespError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("archive-{n}"))
    }
}

#[derive(Default)]
pub struct StubNftMinter {
    counter: AtomicU64,
}

#[async_trait]
impl NftMinter for StubNftMinter {
    async fn mint(&self, archive_tx_id: &str, _metadata: Value) -> Result<String, AespError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mint-{n}-{archive_tx_id}"))
    }
}
