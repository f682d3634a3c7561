//! Context tags: audit records linking ephemeral addresses to the
//! transactions that used them, archivable to off-chain storage.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use aesp_core::capability::{ArchiveUploader, NftMinter};
use aesp_core::constants::{CONTEXT_TAG_CAP, STORAGE_KEY_CONTEXT_TAGS};
use aesp_core::{push_capped, AespError, AespResult, AuditBatchConfig, AuditBatchStrategy, CryptoFacade, Storage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextTag {
    pub id: String,
    pub address: String,
    pub agent_id: String,
    pub context: String,
    pub amount: u64,
    pub created_at: i64,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub vault_consolidation_tx_hash: Option<String>,
    #[serde(default)]
    pub archived_at: Option<i64>,
    #[serde(default)]
    pub archive_tx_id: Option<String>,
}

impl ContextTag {
    fn is_confirmed_unarchived(&self) -> bool {
        self.tx_hash.is_some() && self.archived_at.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct CreateTagParams {
    pub id: String,
    pub address: String,
    pub agent_id: String,
    pub context: String,
    pub amount: u64,
}

/// Holds the context tag log plus the optional batching policy that
/// decides when [`ContextTagManager::batch_archive`] fires reactively.
pub struct ContextTagManager {
    storage: Arc<dyn Storage>,
    crypto: Arc<dyn CryptoFacade>,
    archiver: Arc<dyn ArchiveUploader>,
    minter: Arc<dyn NftMinter>,
    batch_config: AuditBatchConfig,
    tags: RefCell<Vec<ContextTag>>,
    /// Guards against `createTag` and `updateTagTxHash` both crossing the
    /// count threshold for the same batch and firing two archive runs.
    archiving: Cell<bool>,
}

impl ContextTagManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        crypto: Arc<dyn CryptoFacade>,
        archiver: Arc<dyn ArchiveUploader>,
        minter: Arc<dyn NftMinter>,
        batch_config: AuditBatchConfig,
    ) -> Self {
        Self {
            storage,
            crypto,
            archiver,
            minter,
            batch_config,
            tags: RefCell::new(Vec::new()),
            archiving: Cell::new(false),
        }
    }

    pub async fn load(&self) -> AespResult<()> {
        if let Some(value) = self.storage.get(STORAGE_KEY_CONTEXT_TAGS).await? {
            let tags: Vec<ContextTag> =
                serde_json::from_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
            *self.tags.borrow_mut() = tags;
        }
        Ok(())
    }

    async fn persist(&self) -> AespResult<()> {
        let value = serde_json::to_value(&*self.tags.borrow()).map_err(|e| AespError::Serialization(e.to_string()))?;
        self.storage.set(STORAGE_KEY_CONTEXT_TAGS, value).await
    }

    pub fn get(&self, id: &str) -> Option<ContextTag> {
        self.tags.borrow().iter().find(|t| t.id == id).cloned()
    }

    pub fn unarchived_confirmed_count(&self) -> usize {
        self.tags.borrow().iter().filter(|t| t.is_confirmed_unarchived()).count()
    }

    /// Ids of every tag linked to `address`, for stamping the consolidation
    /// tx hash once the address has been swept.
    pub fn ids_for_address(&self, address: &str) -> Vec<String> {
        self.tags.borrow().iter().filter(|t| t.address == address).map(|t| t.id.clone()).collect()
    }

    fn should_eagerly_defer(&self, amount: u64) -> bool {
        matches!(self.batch_config.low_value_threshold, Some(threshold) if amount < threshold)
    }

    pub async fn create_tag(&self, params: CreateTagParams, now: i64) -> AespResult<ContextTag> {
        let tag = ContextTag {
            id: params.id,
            address: params.address,
            agent_id: params.agent_id,
            context: params.context,
            amount: params.amount,
            created_at: now,
            tx_hash: None,
            vault_consolidation_tx_hash: None,
            archived_at: None,
            archive_tx_id: None,
        };
        {
            let mut tags = self.tags.borrow_mut();
            push_capped(&mut tags, tag.clone(), CONTEXT_TAG_CAP);
        }
        self.persist().await?;
        self.maybe_trigger_count_threshold(tag.amount).await?;
        Ok(tag)
    }

    pub async fn update_tag_tx_hash(&self, id: &str, tx_hash: &str) -> AespResult<ContextTag> {
        let (amount, out) = {
            let mut tags = self.tags.borrow_mut();
            let tag = tags
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| AespError::Storage(format!("unknown context tag: {id}")))?;
            tag.tx_hash = Some(tx_hash.to_string());
            (tag.amount, tag.clone())
        };
        self.persist().await?;
        self.maybe_trigger_count_threshold(amount).await?;
        Ok(out)
    }

    pub async fn update_tag_consolidation(&self, id: &str, vault_tx_hash: &str) -> AespResult<ContextTag> {
        let mut tags = self.tags.borrow_mut();
        let tag = tags
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| AespError::Storage(format!("unknown context tag: {id}")))?;
        tag.vault_consolidation_tx_hash = Some(vault_tx_hash.to_string());
        let out = tag.clone();
        drop(tags);
        self.persist().await?;
        Ok(out)
    }

    async fn maybe_trigger_count_threshold(&self, last_amount: u64) -> AespResult<()> {
        if self.batch_config.strategy != AuditBatchStrategy::CountThreshold {
            return Ok(());
        }
        if self.should_eagerly_defer(last_amount) {
            return Ok(());
        }
        let Some(threshold) = self.batch_config.count_threshold else {
            return Ok(());
        };
        if self.unarchived_confirmed_count() < threshold {
            return Ok(());
        }
        if self.archiving.replace(true) {
            tracing::debug!("count-threshold archive already in flight, skipping duplicate trigger");
            return Ok(());
        }
        let result = self.batch_archive(0).await;
        self.archiving.set(false);
        result.map(|_| ())
    }

    /// Encrypts the tag for `owner_identity`, uploads it, mints an audit
    /// NFT pointing at the archive id, and stamps `archivedAt`/`archiveTxId`.
    pub async fn archive_tag(&self, id: &str, owner_identity: &str, now: i64) -> AespResult<ContextTag> {
        let tag = self.get(id).ok_or_else(|| AespError::Storage(format!("unknown context tag: {id}")))?;
        let plaintext = serde_json::to_vec(&tag).map_err(|e| AespError::Serialization(e.to_string()))?;
        let ciphertext = self.crypto.encrypt_for(owner_identity, &plaintext).await?;
        let archive_tx_id = self.archiver.upload(ciphertext, "application/json").await?;
        let metadata = serde_json::json!({ "contextTagId": tag.id, "agentId": tag.agent_id });
        self.minter.mint(&archive_tx_id, metadata).await?;

        let mut tags = self.tags.borrow_mut();
        let stored = tags
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| AespError::Storage(format!("unknown context tag: {id}")))?;
        stored.archived_at = Some(now);
        stored.archive_tx_id = Some(archive_tx_id);
        let out = stored.clone();
        drop(tags);
        self.persist().await?;
        tracing::info!(tag_id = id, "context tag archived");
        Ok(out)
    }

    /// Archives every confirmed (has `txHash`) and unarchived tag exactly
    /// once, skipping any that fall below `lowValueThreshold`.
    pub async fn batch_archive(&self, now: i64) -> AespResult<Vec<ContextTag>> {
        let owner_identity = "owner".to_string();
        let candidates: Vec<String> = self
            .tags
            .borrow()
            .iter()
            .filter(|t| t.is_confirmed_unarchived() && !self.should_eagerly_defer(t.amount))
            .map(|t| t.id.clone())
            .collect();

        let mut archived = Vec::with_capacity(candidates.len());
        for id in candidates {
            archived.push(self.archive_tag(&id, &owner_identity, now).await?);
        }
        Ok(archived)
    }
}
