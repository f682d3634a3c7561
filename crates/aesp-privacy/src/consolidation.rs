//! Jittered, randomized batch sweeping from ephemeral addresses to a
//! vault. Randomness here is privacy hygiene, not a security boundary, so
//! it is drawn from a non-cryptographic PRNG.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use aesp_core::capability::{ConsolidationHandler, ConsolidationRequest};
use aesp_core::constants::{CONSOLIDATION_RECORD_CAP, STORAGE_KEY_CONSOLIDATION};
use aesp_core::{push_capped, AespError, AespResult, ConsolidationConfig, Storage};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::address::AddressRecord;
use crate::pool::AddressPool;
use crate::tags::ContextTagManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationRecord {
    pub id: String,
    pub addresses: Vec<String>,
    pub to_vault_address: String,
    pub chain: String,
    pub status: ConsolidationStatus,
    pub tx_hash: Option<String>,
    pub created_at: i64,
}

/// Chains self-rescheduling sweeps over the funded inbound addresses of one
/// chain. State lives behind `RefCell`; the handler invocation and the
/// jittered delay are the only suspension points.
pub struct ConsolidationScheduler {
    storage: Arc<dyn Storage>,
    handler: Arc<dyn ConsolidationHandler>,
    config: ConsolidationConfig,
    records: RefCell<Vec<ConsolidationRecord>>,
    cancel: Notify,
}

impl ConsolidationScheduler {
    pub fn new(storage: Arc<dyn Storage>, handler: Arc<dyn ConsolidationHandler>, config: ConsolidationConfig) -> Self {
        Self {
            storage,
            handler,
            config,
            records: RefCell::new(Vec::new()),
            cancel: Notify::new(),
        }
    }

    pub async fn load(&self) -> AespResult<()> {
        if let Some(value) = self.storage.get(STORAGE_KEY_CONSOLIDATION).await? {
            let records: Vec<ConsolidationRecord> =
                serde_json::from_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
            *self.records.borrow_mut() = records;
        }
        Ok(())
    }

    async fn persist(&self) -> AespResult<()> {
        let value = serde_json::to_value(&*self.records.borrow()).map_err(|e| AespError::Serialization(e.to_string()))?;
        self.storage.set(STORAGE_KEY_CONSOLIDATION, value).await
    }

    pub fn records(&self) -> Vec<ConsolidationRecord> {
        self.records.borrow().clone()
    }

    /// Invokes the handler once with all `addresses`, recording
    /// `in_progress -> completed`/`failed`. On success, marks each source
    /// address `consolidated` in `pool` and stamps the linked tags in
    /// `tags` with the consolidation tx hash.
    pub async fn consolidate_single_batch(
        &self,
        id: &str,
        addresses: &[AddressRecord],
        to_vault_address: &str,
        chain: &str,
        token: Option<String>,
        pool: &AddressPool,
        tags: &ContextTagManager,
        now: i64,
    ) -> AespResult<ConsolidationRecord> {
        let mut record = ConsolidationRecord {
            id: id.to_string(),
            addresses: addresses.iter().map(|a| a.address.clone()).collect(),
            to_vault_address: to_vault_address.to_string(),
            chain: chain.to_string(),
            status: ConsolidationStatus::InProgress,
            tx_hash: None,
            created_at: now,
        };

        let request = ConsolidationRequest {
            from_addresses: record.addresses.clone(),
            to_vault_address: to_vault_address.to_string(),
            chain: chain.to_string(),
            token,
        };

        match self.handler.consolidate(request).await {
            Ok(tx_hash) => {
                for address in &record.addresses {
                    pool.mark_consolidated(address, &tx_hash)?;
                    for tag_id in tags.ids_for_address(address) {
                        tags.update_tag_consolidation(&tag_id, &tx_hash).await?;
                    }
                }
                record.status = ConsolidationStatus::Completed;
                record.tx_hash = Some(tx_hash);
                tracing::info!(id, addresses = record.addresses.len(), "consolidation batch completed");
            }
            Err(err) => {
                record.status = ConsolidationStatus::Failed;
                tracing::warn!(id, error = %err, "consolidation batch failed");
            }
        }

        {
            let mut records = self.records.borrow_mut();
            push_capped(&mut records, record.clone(), CONSOLIDATION_RECORD_CAP);
        }
        self.persist().await?;
        Ok(record)
    }

    /// Shuffles every `funded` inbound address with Fisher-Yates, partitions
    /// into chunks of `max_batch_size`, and processes them sequentially with
    /// a uniformly random inter-batch delay.
    pub async fn consolidate_batched(
        &self,
        id_prefix: &str,
        to_vault_address: &str,
        chain: &str,
        pool: &AddressPool,
        tags: &ContextTagManager,
        rng_seed: u64,
        now: i64,
    ) -> AespResult<Vec<ConsolidationRecord>> {
        let mut addresses = pool.get_addresses_for_consolidation(chain);
        let mut rng = SmallRng::seed_from_u64(rng_seed);
        addresses.shuffle(&mut rng);

        let max_batch_size = self.config.max_batch_size.max(1);
        let mut out = Vec::new();
        for (index, chunk) in addresses.chunks(max_batch_size).enumerate() {
            let record = self
                .consolidate_single_batch(
                    &format!("{id_prefix}-{index}"),
                    chunk,
                    to_vault_address,
                    chain,
                    None,
                    pool,
                    tags,
                    now,
                )
                .await?;
            out.push(record);

            let (min, max) = self.config.inter_batch_delay_range_secs;
            if min > 0 || max > 0 {
                let delay_secs = if max > min { rng.gen_range(min..=max) } else { min };
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            }
        }
        Ok(out)
    }

    pub fn should_consolidate(&self, eligible_count: usize) -> bool {
        eligible_count >= self.config.consolidation_threshold
    }

    /// One jittered delay draw: `base * (1 ± jitter_ratio)`, jitter ratio
    /// clamped to `[0, 1]`.
    pub fn next_interval_secs(&self, rng_seed: u64) -> u64 {
        let mut rng = SmallRng::seed_from_u64(rng_seed);
        let jitter_ratio = self.config.jitter_ratio.clamp(0.0, 1.0);
        let base = self.config.base_interval_secs as f64;
        let offset = rng.gen_range(-jitter_ratio..=jitter_ratio);
        (base * (1.0 + offset)).max(0.0) as u64
    }

    /// Removes the pending timer, if any. The in-flight sleep (not the
    /// handler call) is interrupted immediately; an in-flight batch still
    /// runs to completion.
    pub fn cancel_schedule(&self) {
        self.cancel.notify_one();
    }

    /// Chains self-rescheduling one-shot timers: sleep a jittered interval,
    /// sweep if `should_consolidate` agrees, repeat. A failed sweep is
    /// logged and does not stop the chain; only `cancel_schedule` does.
    pub async fn schedule_consolidation(
        &self,
        id_prefix: &str,
        to_vault_address: &str,
        chain: &str,
        pool: &AddressPool,
        tags: &ContextTagManager,
        rng_seed: u64,
        now: i64,
    ) {
        let mut seed = rng_seed;
        let mut round: usize = 0;
        loop {
            let delay = self.next_interval_secs(seed);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                _ = self.cancel.notified() => {
                    tracing::info!(id_prefix, "consolidation schedule cancelled");
                    return;
                }
            }

            let eligible = pool.get_addresses_for_consolidation(chain);
            if self.should_consolidate(eligible.len()) {
                let batch_id = format!("{id_prefix}-{round}");
                if let Err(err) = self
                    .consolidate_batched(&batch_id, to_vault_address, chain, pool, tags, seed, now)
                    .await
                {
                    tracing::warn!(batch_id, error = %err, "scheduled consolidation round failed, chain continues");
                }
                round += 1;
            }
            seed = seed.wrapping_add(1);
        }
    }
}
