//! A crypto façade that never exposes direct child derivation, so tests can
//! exercise the identity module's signature-hash fallback path without
//! reaching into its internals.

use aesp_core::capability::{ChainKind, ContextAddress, DerivedKey};
use aesp_core::{AespError, CryptoFacade};
use async_trait::async_trait;

use crate::facade::Ed25519Crypto;

pub struct NoChildDerivationCrypto {
    inner: Ed25519Crypto,
}

impl NoChildDerivationCrypto {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            inner: Ed25519Crypto::from_seed(seed),
        }
    }
}

#[async_trait]
impl CryptoFacade for NoChildDerivationCrypto {
    async fn derive_master(&self, mnemonic: &str, passphrase: &str) -> Result<Vec<u8>, AespError> {
        self.inner.derive_master(mnemonic, passphrase).await
    }

    async fn derive_child(&self, _path: &str) -> Result<Option<DerivedKey>, AespError> {
        Ok(None)
    }

    async fn sign_label(&self, label: &str, payload: &[u8]) -> Result<Vec<u8>, AespError> {
        self.inner.sign_label(label, payload).await
    }

    async fn sign_owner(&self, payload: &[u8]) -> Result<Vec<u8>, AespError> {
        self.inner.sign_owner(payload).await
    }

    async fn verify_owner(
        &self,
        owner_public_key: &[u8],
        payload: &[u8],
        signature: &[u8],
    ) -> Result<bool, AespError> {
        self.inner.verify_owner(owner_public_key, payload, signature).await
    }

    async fn sign_typed_data(&self, payload: &[u8]) -> Result<Vec<u8>, AespError> {
        self.inner.sign_typed_data(payload).await
    }

    async fn encrypt_for(
        &self,
        recipient_identity: &str,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, AespError> {
        self.inner.encrypt_for(recipient_identity, plaintext).await
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, AespError> {
        self.inner.decrypt(ciphertext).await
    }

    async fn shared_secret(&self, counterparty_identity: &str) -> Result<Vec<u8>, AespError> {
        self.inner.shared_secret(counterparty_identity).await
    }

    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        self.inner.sha256(data)
    }

    fn secure_random(&self, len: usize) -> Vec<u8> {
        self.inner.secure_random(len)
    }

    fn new_uuid(&self) -> String {
        self.inner.new_uuid()
    }

    fn supports_context_derivation(&self) -> bool {
        false
    }

    async fn derive_context_address(
        &self,
        _context: &str,
        _chain: ChainKind,
    ) -> Result<ContextAddress, AespError> {
        Err(AespError::Rev32Required)
    }
}
