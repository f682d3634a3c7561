//! Builds commitments, drives dual signing, and validates every status
//! transition against the lifecycle graph.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use aesp_core::capability::CryptoFacade;
use aesp_core::constants::{COMMITMENT_NONCE_BITS, STORAGE_KEY_COMMITMENTS};
use aesp_core::{to_canonical_bytes, AespError, AespResult, Storage};
use serde_json::Value;

use crate::commitment::{Commitment, CommitmentRecord, CommitmentStatus, CommitmentValue, StatusUpdateMeta};

pub struct CreateCommitmentParams {
    pub id: String,
    pub domain: Value,
    pub types: Value,
    pub buyer_agent: String,
    pub seller_agent: String,
    pub item: String,
    pub price: f64,
    pub currency: String,
    pub delivery_deadline: f64,
    pub chain_id: i64,
    pub arbitrator: Option<String>,
    pub escrow_required: bool,
}

pub struct CommitmentBuilder {
    storage: Arc<dyn Storage>,
    crypto: Arc<dyn CryptoFacade>,
    records: RefCell<BTreeMap<String, CommitmentRecord>>,
}

fn nonce_from_random(random_bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = random_bytes.len().min(8);
    buf[..n].copy_from_slice(&random_bytes[..n]);
    u64::from_le_bytes(buf) & ((1u64 << COMMITMENT_NONCE_BITS) - 1)
}

impl CommitmentBuilder {
    pub fn new(storage: Arc<dyn Storage>, crypto: Arc<dyn CryptoFacade>) -> Self {
        Self {
            storage,
            crypto,
            records: RefCell::new(BTreeMap::new()),
        }
    }

    pub async fn load(&self) -> AespResult<()> {
        if let Some(value) = self.storage.get(STORAGE_KEY_COMMITMENTS).await? {
            let records: BTreeMap<String, CommitmentRecord> =
                serde_json::from_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
            *self.records.borrow_mut() = records;
        }
        Ok(())
    }

    async fn persist(&self) -> AespResult<()> {
        let value = serde_json::to_value(&*self.records.borrow())
            .map_err(|e| AespError::Serialization(e.to_string()))?;
        self.storage.set(STORAGE_KEY_COMMITMENTS, value).await
    }

    pub fn get(&self, id: &str) -> Option<CommitmentRecord> {
        self.records.borrow().get(id).cloned()
    }

    pub async fn create_commitment(&self, params: CreateCommitmentParams, now: i64) -> AespResult<CommitmentRecord> {
        if !(params.price >= 0.0 && params.price.is_finite()) {
            return Err(AespError::InvalidPrice(params.price));
        }
        if !(params.delivery_deadline >= 0.0 && params.delivery_deadline.is_finite()) {
            return Err(AespError::InvalidDeadline(params.delivery_deadline));
        }
        if params.chain_id < 0 {
            return Err(AespError::InvalidChainId(params.chain_id));
        }

        let nonce = nonce_from_random(&self.crypto.secure_random(8));
        let record = CommitmentRecord {
            id: params.id.clone(),
            commitment: Commitment {
                domain: params.domain,
                types: params.types,
                value: CommitmentValue {
                    buyer_agent: params.buyer_agent,
                    seller_agent: params.seller_agent,
                    item: params.item,
                    price: params.price,
                    currency: params.currency,
                    delivery_deadline: params.delivery_deadline,
                    arbitrator: params.arbitrator,
                    escrow_required: params.escrow_required,
                    nonce,
                },
                buyer_signature: None,
                seller_signature: None,
            },
            status: CommitmentStatus::Draft,
            escrow_tx_hash: None,
            delivery_confirmation_hash: None,
            release_tx_hash: None,
            dispute_id: None,
            archive_tx_id: None,
            created_at: now,
            updated_at: now,
        };
        self.records.borrow_mut().insert(params.id.clone(), record.clone());
        self.persist().await?;
        tracing::info!(id = %params.id, "commitment created");
        Ok(record)
    }

    fn commitment_hash(&self, commitment: &Commitment) -> Result<Vec<u8>, AespError> {
        #[derive(serde::Serialize)]
        struct Hashed<'a> {
            domain: &'a Value,
            value: &'a CommitmentValue,
        }
        let bytes = to_canonical_bytes(&Hashed {
            domain: &commitment.domain,
            value: &commitment.value,
        })?;
        Ok(self.crypto.sha256(&bytes).to_vec())
    }

    pub async fn sign_as_buyer(&self, id: &str, now: i64) -> AespResult<CommitmentRecord> {
        self.sign(id, Signer::Buyer, now).await
    }

    pub async fn sign_as_seller(&self, id: &str, now: i64) -> AespResult<CommitmentRecord> {
        self.sign(id, Signer::Seller, now).await
    }

    async fn sign(&self, id: &str, signer: Signer, now: i64) -> AespResult<CommitmentRecord> {
        let (hash, pre_status, seller_already_signed, buyer_already_signed) = {
            let records = self.records.borrow();
            let record = records
                .get(id)
                .ok_or_else(|| AespError::CommitmentNotFound(id.to_string()))?;
            let allowed_pre = match signer {
                Signer::Buyer => matches!(record.status, CommitmentStatus::Draft | CommitmentStatus::Proposed),
                Signer::Seller => matches!(
                    record.status,
                    CommitmentStatus::Draft | CommitmentStatus::Proposed | CommitmentStatus::BuyerSigned
                ),
            };
            if !allowed_pre {
                return Err(AespError::InvalidCommitmentState(format!(
                    "{:?} cannot sign as {:?} from status {:?}",
                    id, signer, record.status
                )));
            }
            (
                self.commitment_hash(&record.commitment)?,
                record.status,
                record.commitment.seller_signature.is_some(),
                record.commitment.buyer_signature.is_some(),
            )
        };
        let _ = pre_status;

        let signature = hex::encode(self.crypto.sign_typed_data(&hash).await?);

        let mut records = self.records.borrow_mut();
        let record = records.get_mut(id).expect("checked above");
        match signer {
            Signer::Buyer => {
                record.commitment.buyer_signature = Some(signature);
                record.status = if seller_already_signed {
                    CommitmentStatus::FullySigned
                } else {
                    CommitmentStatus::BuyerSigned
                };
            }
            Signer::Seller => {
                record.commitment.seller_signature = Some(signature);
                record.status = if buyer_already_signed {
                    CommitmentStatus::FullySigned
                } else {
                    CommitmentStatus::Proposed
                };
            }
        }
        record.updated_at = now;
        let out = record.clone();
        drop(records);
        self.persist().await?;
        tracing::info!(id, ?signer, status = ?out.status, "commitment signed");
        Ok(out)
    }

    pub async fn update_status(
        &self,
        id: &str,
        to: CommitmentStatus,
        meta: StatusUpdateMeta,
        now: i64,
    ) -> AespResult<CommitmentRecord> {
        let mut records = self.records.borrow_mut();
        let record = records
            .get_mut(id)
            .ok_or_else(|| AespError::CommitmentNotFound(id.to_string()))?;

        if !record.status.can_transition_to(to) {
            return Err(AespError::InvalidStatusTransition {
                from: format!("{:?}", record.status),
                to: format!("{:?}", to),
            });
        }

        if let Some(v) = meta.escrow_tx_hash {
            record.escrow_tx_hash = Some(v);
        }
        if let Some(v) = meta.delivery_confirmation_hash {
            record.delivery_confirmation_hash = Some(v);
        }
        if let Some(v) = meta.release_tx_hash {
            record.release_tx_hash = Some(v);
        }
        if let Some(v) = meta.dispute_id {
            record.dispute_id = Some(v);
        }
        if let Some(v) = meta.archive_tx_id {
            record.archive_tx_id = Some(v);
        }
        record.status = to;
        record.updated_at = now;
        let out = record.clone();
        drop(records);
        self.persist().await?;
        tracing::info!(id, status = ?out.status, "commitment status updated");
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
enum Signer {
    Buyer,
    Seller,
}
