//! The ephemeral address pool: context-isolated derivation, deterministic
//! basic addresses, pre-derived pool replenishment, and claiming.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::Arc;

use aesp_core::capability::ChainKind;
use aesp_core::constants::STORAGE_KEY_ADDRESS_POOL;
use aesp_core::{AespError, AespResult, CryptoFacade, PoolConfig, Storage};

use crate::address::{AddressRecord, AddressStatus, Direction, PrivacyLevel};
use crate::context::{build_context, segment};

/// Context-isolated ephemeral address pool. `!Sync` by construction: all
/// state lives behind `RefCell`/`Cell`, persisted through an explicit
/// debounce flag rather than a shared timer.
pub struct AddressPool {
    storage: Arc<dyn Storage>,
    crypto: Arc<dyn CryptoFacade>,
    #[allow(dead_code)]
    config: PoolConfig,
    records: RefCell<BTreeMap<String, AddressRecord>>,
    sequence_counter: Cell<u64>,
    dirty: Cell<bool>,
}

impl AddressPool {
    pub fn new(storage: Arc<dyn Storage>, crypto: Arc<dyn CryptoFacade>, config: PoolConfig) -> Self {
        Self {
            storage,
            crypto,
            config,
            records: RefCell::new(BTreeMap::new()),
            sequence_counter: Cell::new(0),
            dirty: Cell::new(false),
        }
    }

    pub async fn load(&self) -> AespResult<()> {
        if let Some(value) = self.storage.get(STORAGE_KEY_ADDRESS_POOL).await? {
            let records: BTreeMap<String, AddressRecord> =
                serde_json::from_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
            self.sequence_counter.set(records.values().map(|r| r.sequence).max().unwrap_or(0));
            *self.records.borrow_mut() = records;
        }
        Ok(())
    }

    fn require_context_support(&self) -> AespResult<()> {
        if self.crypto.supports_context_derivation() {
            Ok(())
        } else {
            Err(AespError::Rev32Required)
        }
    }

    fn direction_str(direction: Direction) -> &'static str {
        match direction {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    /// Derives a fresh context-isolated address for a single logical
    /// purpose, marking it `assigned` immediately.
    pub async fn derive_ephemeral_address(
        &self,
        agent_id: &str,
        chain: ChainKind,
        chain_name: &str,
        direction: Direction,
        now: i64,
    ) -> AespResult<AddressRecord> {
        self.require_context_support()?;
        let sequence = self.sequence_counter.get() + 1;
        self.sequence_counter.set(sequence);
        let tx_uuid = self.crypto.new_uuid();

        let context = build_context(&[
            segment("agent", agent_id),
            segment("dir", Self::direction_str(direction)),
            segment("seq", &sequence.to_string()),
            segment("tx", &tx_uuid),
        ]);
        let derived = self.crypto.derive_context_address(&context, chain).await?;

        let record = AddressRecord {
            address: derived.address,
            agent_id: agent_id.to_string(),
            chain: chain_name.to_string(),
            direction,
            context,
            status: AddressStatus::Assigned,
            sequence,
            created_at: now,
            assigned_tx_uuid: Some(tx_uuid),
            used_at: Some(now),
            consolidation_tx_hash: None,
        };
        self.records.borrow_mut().insert(record.address.clone(), record.clone());
        self.dirty.set(true);
        tracing::info!(address = %record.address, agent_id, "ephemeral address derived");
        Ok(record)
    }

    /// Deterministic per-`(agent, chain, direction)` address. Not pooled:
    /// recomputed fresh on every call, never stored as a pool record.
    pub async fn get_basic_address(
        &self,
        agent_id: &str,
        chain: ChainKind,
        chain_name: &str,
        direction: Direction,
    ) -> AespResult<String> {
        self.require_context_support()?;
        let context = build_context(&[
            segment("mode", "basic"),
            segment("agent", agent_id),
            segment("chain", chain_name),
            segment("dir", Self::direction_str(direction)),
        ]);
        let derived = self.crypto.derive_context_address(&context, chain).await?;
        Ok(derived.address)
    }

    /// Pre-derives `count - available` fresh addresses with `status =
    /// available`, returning how many were actually derived.
    pub async fn replenish_pool(
        &self,
        agent_id: &str,
        chain: ChainKind,
        chain_name: &str,
        count: usize,
        now: i64,
    ) -> AespResult<usize> {
        self.require_context_support()?;
        let available = self
            .records
            .borrow()
            .values()
            .filter(|r| r.agent_id == agent_id && r.chain == chain_name && r.status == AddressStatus::Available)
            .count();
        let to_derive = count.saturating_sub(available);

        for _ in 0..to_derive {
            let sequence = self.sequence_counter.get() + 1;
            self.sequence_counter.set(sequence);
            let context = build_context(&[
                segment("agent", agent_id),
                segment("pool", "pre"),
                segment("seq", &sequence.to_string()),
            ]);
            let derived = self.crypto.derive_context_address(&context, chain).await?;
            let record = AddressRecord {
                address: derived.address,
                agent_id: agent_id.to_string(),
                chain: chain_name.to_string(),
                direction: Direction::Inbound,
                context,
                status: AddressStatus::Available,
                sequence,
                created_at: now,
                assigned_tx_uuid: None,
                used_at: None,
                consolidation_tx_hash: None,
            };
            self.records.borrow_mut().insert(record.address.clone(), record);
        }
        if to_derive > 0 {
            self.dirty.set(true);
        }
        Ok(to_derive)
    }

    /// Atomically claims the first `available` record for `(agent, chain)`.
    pub fn claim_from_pool(&self, agent_id: &str, chain_name: &str, now: i64) -> AespResult<Option<AddressRecord>> {
        let tx_uuid = self.crypto.new_uuid();
        let mut records = self.records.borrow_mut();
        let address = records
            .values()
            .find(|r| r.agent_id == agent_id && r.chain == chain_name && r.status == AddressStatus::Available)
            .map(|r| r.address.clone());

        let Some(address) = address else {
            return Ok(None);
        };
        let record = records.get_mut(&address).expect("found above");
        record.status = AddressStatus::Assigned;
        record.assigned_tx_uuid = Some(tx_uuid);
        record.used_at = Some(now);
        let out = record.clone();
        drop(records);
        self.dirty.set(true);
        Ok(Some(out))
    }

    /// `transparent` returns `None` (caller uses the vault address);
    /// `basic` returns the deterministic address wrapped as an ungated
    /// record with no pool state; `isolated` claims from the pool or
    /// derives fresh.
    pub async fn resolve_address(
        &self,
        privacy_level: PrivacyLevel,
        agent_id: &str,
        chain: ChainKind,
        chain_name: &str,
        direction: Direction,
        now: i64,
    ) -> AespResult<Option<String>> {
        match privacy_level {
            PrivacyLevel::Transparent => Ok(None),
            PrivacyLevel::Basic => self.get_basic_address(agent_id, chain, chain_name, direction).await.map(Some),
            PrivacyLevel::Isolated => {
                if let Some(record) = self.claim_from_pool(agent_id, chain_name, now)? {
                    Ok(Some(record.address))
                } else {
                    let record = self.derive_ephemeral_address(agent_id, chain, chain_name, direction, now).await?;
                    Ok(Some(record.address))
                }
            }
        }
    }

    fn can_transition(from: AddressStatus, to: AddressStatus) -> bool {
        use AddressStatus::*;
        matches!(
            (from, to),
            (Available, Assigned) | (Assigned, Funded) | (Funded, Spent) | (Funded, Consolidated)
        )
    }

    pub fn update_address_status(&self, address: &str, to: AddressStatus) -> AespResult<AddressRecord> {
        let mut records = self.records.borrow_mut();
        let record = records
            .get_mut(address)
            .ok_or_else(|| AespError::Storage(format!("unknown address: {address}")))?;
        if !Self::can_transition(record.status, to) {
            return Err(AespError::InvalidStatusTransition {
                from: format!("{:?}", record.status),
                to: format!("{to:?}"),
            });
        }
        record.status = to;
        let out = record.clone();
        drop(records);
        self.dirty.set(true);
        Ok(out)
    }

    pub fn mark_consolidated(&self, address: &str, consolidation_tx_hash: &str) -> AespResult<()> {
        let mut records = self.records.borrow_mut();
        let record = records
            .get_mut(address)
            .ok_or_else(|| AespError::Storage(format!("unknown address: {address}")))?;
        record.status = AddressStatus::Consolidated;
        record.consolidation_tx_hash = Some(consolidation_tx_hash.to_string());
        drop(records);
        self.dirty.set(true);
        Ok(())
    }

    pub fn get_addresses_for_consolidation(&self, chain_name: &str) -> Vec<AddressRecord> {
        self.records
            .borrow()
            .values()
            .filter(|r| r.chain == chain_name && r.direction == Direction::Inbound && r.status == AddressStatus::Funded)
            .cloned()
            .collect()
    }

    pub async fn flush(&self) -> AespResult<()> {
        if !self.dirty.get() {
            return Ok(());
        }
        let value = serde_json::to_value(&*self.records.borrow())
            .map_err(|e| AespError::Serialization(e.to_string()))?;
        self.storage.set(STORAGE_KEY_ADDRESS_POOL, value).await?;
        self.dirty.set(false);
        Ok(())
    }

    pub async fn dispose(&self) -> AespResult<()> {
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aesp_core::MemoryStorage;
    use aesp_crypto::Ed25519Crypto;

    fn pool() -> AddressPool {
        AddressPool::new(
            Arc::new(MemoryStorage::default()),
            Arc::new(Ed25519Crypto::from_seed([11u8; 32])),
            PoolConfig::default(),
        )
    }

    #[tokio::test]
    async fn ephemeral_addresses_are_distinct_across_calls() {
        let p = pool();
        let a = p
            .derive_ephemeral_address("agent-1", ChainKind::Evm, "ethereum", Direction::Inbound, 0)
            .await
            .unwrap();
        let b = p
            .derive_ephemeral_address("agent-1", ChainKind::Evm, "ethereum", Direction::Inbound, 0)
            .await
            .unwrap();
        assert_ne!(a.address, b.address);
    }

    #[tokio::test]
    async fn basic_address_is_stable_and_unpooled() {
        let p = pool();
        let a = p.get_basic_address("agent-1", ChainKind::Evm, "ethereum", Direction::Inbound).await.unwrap();
        let b = p.get_basic_address("agent-1", ChainKind::Evm, "ethereum", Direction::Inbound).await.unwrap();
        assert_eq!(a, b);
        assert!(p.get_addresses_for_consolidation("ethereum").is_empty());
    }

    #[tokio::test]
    async fn replenish_then_claim_marks_assigned() {
        let p = pool();
        let derived = p.replenish_pool("agent-1", ChainKind::Evm, "ethereum", 3, 0).await.unwrap();
        assert_eq!(derived, 3);

        let claimed = p.claim_from_pool("agent-1", "ethereum", 1).unwrap().unwrap();
        assert_eq!(claimed.status, AddressStatus::Assigned);

        let second = p.replenish_pool("agent-1", ChainKind::Evm, "ethereum", 3, 2).await.unwrap();
        assert_eq!(second, 1, "only the claimed slot needs replenishing");
    }

    #[tokio::test]
    async fn claim_from_empty_pool_returns_none() {
        let p = pool();
        assert!(p.claim_from_pool("agent-1", "ethereum", 0).unwrap().is_none());
    }

    #[tokio::test]
    async fn isolated_resolution_falls_back_to_fresh_derivation() {
        let p = pool();
        let address = p
            .resolve_address(PrivacyLevel::Isolated, "agent-1", ChainKind::Evm, "ethereum", Direction::Inbound, 0)
            .await
            .unwrap();
        assert!(address.is_some());
    }

    #[tokio::test]
    async fn transparent_resolution_returns_none() {
        let p = pool();
        let address = p
            .resolve_address(PrivacyLevel::Transparent, "agent-1", ChainKind::Evm, "ethereum", Direction::Inbound, 0)
            .await
            .unwrap();
        assert!(address.is_none());
    }

    #[tokio::test]
    async fn status_transitions_follow_the_graph() {
        let p = pool();
        let record = p
            .derive_ephemeral_address("agent-1", ChainKind::Evm, "ethereum", Direction::Inbound, 0)
            .await
            .unwrap();
        p.update_address_status(&record.address, AddressStatus::Funded).unwrap();
        let err = p.update_address_status(&record.address, AddressStatus::Available).unwrap_err();
        assert!(matches!(err, AespError::InvalidStatusTransition { .. }));
        p.update_address_status(&record.address, AddressStatus::Spent).unwrap();
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let storage = Arc::new(MemoryStorage::default());
        let p1 = AddressPool::new(storage.clone(), Arc::new(Ed25519Crypto::from_seed([11u8; 32])), PoolConfig::default());
        p1.derive_ephemeral_address("agent-1", ChainKind::Evm, "ethereum", Direction::Inbound, 0)
            .await
            .unwrap();
        p1.flush().await.unwrap();

        let p2 = AddressPool::new(storage, Arc::new(Ed25519Crypto::from_seed([11u8; 32])), PoolConfig::default());
        p2.load().await.unwrap();
        assert_eq!(p2.get_addresses_for_consolidation("ethereum").len(), 0);
        assert_eq!(p2.sequence_counter.get(), 1);
    }
}
