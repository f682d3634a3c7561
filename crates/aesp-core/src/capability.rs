//! The capability interfaces the core takes as constructor dependencies.
//! These are the "duck-typed modules supplied by the host" of the source
//! material, re-expressed as traits so every subsystem receives them as
//! `Arc<dyn Trait>` rather than reaching for a global.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AespError;

/// Async typed key/value store with prefix listing. The single persistence
/// sink; each subsystem writes only the keys named in
/// [`crate::constants`].
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, AespError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), AespError>;
    async fn delete(&self, key: &str) -> Result<(), AespError>;
    /// Lists keys, optionally restricted to a prefix.
    async fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, AespError>;
}

/// A key derived at a BIP-style path, or for the fallback path, from a
/// signature hash.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub public_key: Vec<u8>,
    pub path: String,
}

/// Which chain family a context-isolated derivation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Evm,
    NonEvm,
    /// The façade only exposes one unified derivation function; the
    /// chain-specific address is projected from its result.
    Unified,
}

#[derive(Debug, Clone)]
pub struct ContextAddress {
    pub address: String,
    pub public_key: Vec<u8>,
}

/// Deterministic key derivation, signing, verification, authenticated
/// encryption, hashing, and randomness. The source's "crypto façade";
/// `aesp-crypto` ships one concrete implementation of this trait.
#[async_trait]
pub trait CryptoFacade: Send + Sync {
    /// Derives the master seed from a mnemonic and passphrase.
    async fn derive_master(&self, mnemonic: &str, passphrase: &str) -> Result<Vec<u8>, AespError>;

    /// Direct child-key derivation at `path`. `Ok(None)` means the façade
    /// doesn't support direct derivation and callers must use the
    /// signature-hash fallback.
    async fn derive_child(&self, path: &str) -> Result<Option<DerivedKey>, AespError>;

    /// Signs `payload` under a deterministic domain-separation label.
    async fn sign_label(&self, label: &str, payload: &[u8]) -> Result<Vec<u8>, AespError>;

    /// Signs `payload` as the owner identity (used for certificates).
    async fn sign_owner(&self, payload: &[u8]) -> Result<Vec<u8>, AespError>;

    /// Verifies an owner-identity signature.
    async fn verify_owner(
        &self,
        owner_public_key: &[u8],
        payload: &[u8],
        signature: &[u8],
    ) -> Result<bool, AespError>;

    /// Signs EIP-712-style typed data (used by the commitment builder).
    async fn sign_typed_data(&self, payload: &[u8]) -> Result<Vec<u8>, AespError>;

    /// Authenticated encryption for a recipient identity.
    async fn encrypt_for(
        &self,
        recipient_identity: &str,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, AespError>;

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, AespError>;

    async fn shared_secret(&self, counterparty_identity: &str) -> Result<Vec<u8>, AespError>;

    fn sha256(&self, data: &[u8]) -> [u8; 32];

    fn secure_random(&self, len: usize) -> Vec<u8>;

    fn new_uuid(&self) -> String;

    /// Whether `derive_context_address` is implemented. The address pool
    /// fails fast with `REV32_REQUIRED` when this is false.
    fn supports_context_derivation(&self) -> bool {
        false
    }

    /// Context-isolated address derivation gating the privacy subsystem.
    async fn derive_context_address(
        &self,
        context: &str,
        chain: ChainKind,
    ) -> Result<ContextAddress, AespError> {
        let _ = (context, chain);
        Err(AespError::Rev32Required)
    }
}

#[derive(Debug, Clone)]
pub struct ConsolidationRequest {
    pub from_addresses: Vec<String>,
    pub to_vault_address: String,
    pub chain: String,
    pub token: Option<String>,
}

/// Sweeps funds from a batch of ephemeral addresses to the vault. Must be
/// idempotent by observation: retrying with the same inputs after a partial
/// failure is legal.
#[async_trait]
pub trait ConsolidationHandler: Send + Sync {
    async fn consolidate(&self, request: ConsolidationRequest) -> Result<String, AespError>;
}

/// Uploads opaque bytes (an encrypted context tag) to off-chain storage and
/// returns an archive transaction id.
#[async_trait]
pub trait ArchiveUploader: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, AespError>;
}

/// Mints an audit NFT pointing at an archived record.
#[async_trait]
pub trait NftMinter: Send + Sync {
    async fn mint(&self, archive_tx_id: &str, metadata: Value) -> Result<String, AespError>;
}
