//! `Ed25519Crypto`: a reference [`CryptoFacade`] good enough to exercise
//! every code path the core depends on — direct child derivation, owner
//! signing, typed-data signing, authenticated encryption, and unified
//! context-isolated derivation for the privacy subsystem. Hosts with
//! hardware-backed keys or a different curve supply their own
//! implementation of the same trait.

use aesp_core::capability::{ChainKind, ContextAddress, DerivedKey};
use aesp_core::{AespError, CryptoFacade};
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, OsRng as AeadOsRng};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::keys::{signing_key_for_label, x25519_public_for_label, x25519_secret_for_label};

const OWNER_LABEL: &str = "owner";
const X25519_LABEL: &str = "x25519";

/// A single principal's master identity. Derives every agent/context key
/// deterministically from one 32-byte seed.
pub struct Ed25519Crypto {
    master_seed: Zeroizing<[u8; 32]>,
}

impl Ed25519Crypto {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            master_seed: Zeroizing::new(seed),
        }
    }

    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    pub fn owner_public_key(&self) -> Vec<u8> {
        signing_key_for_label(&self.master_seed, OWNER_LABEL)
            .verifying_key()
            .to_bytes()
            .to_vec()
    }

    fn x25519_public_hex(&self) -> String {
        hex::encode(x25519_public_for_label(&self.master_seed, X25519_LABEL).as_bytes())
    }
}

impl std::fmt::Debug for Ed25519Crypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Crypto {{ owner_public_key: {} }}", hex::encode(self.owner_public_key()))
    }
}

fn parse_verifying_key(bytes: &[u8]) -> Result<VerifyingKey, AespError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AespError::Crypto("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&arr).map_err(|e| AespError::Crypto(e.to_string()))
}

fn parse_signature(bytes: &[u8]) -> Result<Signature, AespError> {
    let arr: [u8; 64] = bytes
        .try_into()
        .map_err(|_| AespError::Crypto("signature must be 64 bytes".into()))?;
    Ok(Signature::from_bytes(&arr))
}

#[async_trait]
impl CryptoFacade for Ed25519Crypto {
    async fn derive_master(&self, mnemonic: &str, passphrase: &str) -> Result<Vec<u8>, AespError> {
        let mut hasher = Sha256::new();
        hasher.update(mnemonic.as_bytes());
        hasher.update(b"\0");
        hasher.update(passphrase.as_bytes());
        Ok(hasher.finalize().to_vec())
    }

    async fn derive_child(&self, path: &str) -> Result<Option<DerivedKey>, AespError> {
        let signing_key = signing_key_for_label(&self.master_seed, path);
        Ok(Some(DerivedKey {
            public_key: signing_key.verifying_key().to_bytes().to_vec(),
            path: path.to_string(),
        }))
    }

    async fn sign_label(&self, label: &str, payload: &[u8]) -> Result<Vec<u8>, AespError> {
        let signing_key = signing_key_for_label(&self.master_seed, label);
        Ok(signing_key.sign(payload).to_bytes().to_vec())
    }

    async fn sign_owner(&self, payload: &[u8]) -> Result<Vec<u8>, AespError> {
        let signing_key = signing_key_for_label(&self.master_seed, OWNER_LABEL);
        Ok(signing_key.sign(payload).to_bytes().to_vec())
    }

    async fn verify_owner(
        &self,
        owner_public_key: &[u8],
        payload: &[u8],
        signature: &[u8],
    ) -> Result<bool, AespError> {
        let verifying_key = parse_verifying_key(owner_public_key)?;
        let signature = parse_signature(signature)?;
        Ok(verifying_key.verify(payload, &signature).is_ok())
    }

    async fn sign_typed_data(&self, payload: &[u8]) -> Result<Vec<u8>, AespError> {
        self.sign_owner(payload).await
    }

    async fn encrypt_for(
        &self,
        recipient_identity: &str,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, AespError> {
        let recipient_bytes = hex::decode(recipient_identity)
            .map_err(|e| AespError::Crypto(format!("bad recipient identity: {e}")))?;
        let recipient_arr: [u8; 32] = recipient_bytes
            .try_into()
            .map_err(|_| AespError::Crypto("recipient x25519 key must be 32 bytes".into()))?;
        let recipient_pub = x25519_dalek::PublicKey::from(recipient_arr);

        let mut ephemeral_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut ephemeral_bytes);
        let ephemeral_secret = x25519_dalek::StaticSecret::from(ephemeral_bytes);
        let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral_secret);

        let shared = ephemeral_secret.diffie_hellman(&recipient_pub);
        let key_bytes = Sha256::digest(shared.as_bytes());
        let cipher = ChaCha20Poly1305::new((&key_bytes).into());
        let nonce = ChaCha20Poly1305::generate_nonce(&mut AeadOsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| AespError::Crypto(e.to_string()))?;

        let mut out = Vec::with_capacity(32 + 12 + ciphertext.len());
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, AespError> {
        if ciphertext.len() < 32 + 12 {
            return Err(AespError::Crypto("ciphertext too short".into()));
        }
        let (ephemeral_pub_bytes, rest) = ciphertext.split_at(32);
        let (nonce_bytes, ct) = rest.split_at(12);

        let ephemeral_arr: [u8; 32] = ephemeral_pub_bytes.try_into().unwrap();
        let ephemeral_pub = x25519_dalek::PublicKey::from(ephemeral_arr);
        let own_secret = x25519_secret_for_label(&self.master_seed, X25519_LABEL);
        let shared = own_secret.diffie_hellman(&ephemeral_pub);
        let key_bytes = Sha256::digest(shared.as_bytes());
        let cipher = ChaCha20Poly1305::new((&key_bytes).into());
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ct)
            .map_err(|e| AespError::Crypto(e.to_string()))
    }

    async fn shared_secret(&self, counterparty_identity: &str) -> Result<Vec<u8>, AespError> {
        let counterparty_bytes = hex::decode(counterparty_identity)
            .map_err(|e| AespError::Crypto(format!("bad counterparty identity: {e}")))?;
        let counterparty_arr: [u8; 32] = counterparty_bytes
            .try_into()
            .map_err(|_| AespError::Crypto("counterparty x25519 key must be 32 bytes".into()))?;
        let counterparty_pub = x25519_dalek::PublicKey::from(counterparty_arr);
        let own_secret = x25519_secret_for_label(&self.master_seed, X25519_LABEL);
        Ok(own_secret.diffie_hellman(&counterparty_pub).as_bytes().to_vec())
    }

    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        let digest = Sha256::digest(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }

    fn secure_random(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        OsRng.fill_bytes(&mut buf);
        buf
    }

    fn new_uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn supports_context_derivation(&self) -> bool {
        true
    }

    async fn derive_context_address(
        &self,
        context: &str,
        chain: ChainKind,
    ) -> Result<ContextAddress, AespError> {
        let signing_key = signing_key_for_label(&self.master_seed, context);
        let public_key = signing_key.verifying_key().to_bytes().to_vec();
        let address = match chain {
            ChainKind::Evm => format!("0x{}", hex::encode(&public_key[..20])),
            ChainKind::NonEvm | ChainKind::Unified => hex::encode(&public_key),
        };
        Ok(ContextAddress { address, public_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_path_derives_same_key_twice() {
        let facade = Ed25519Crypto::from_seed([7u8; 32]);
        let a = facade.derive_child("m/44'/501'/0'/0'/0'").await.unwrap().unwrap();
        let b = facade.derive_child("m/44'/501'/0'/0'/0'").await.unwrap().unwrap();
        assert_eq!(a.public_key, b.public_key);
    }

    #[tokio::test]
    async fn distinct_paths_derive_distinct_keys() {
        let facade = Ed25519Crypto::from_seed([7u8; 32]);
        let a = facade.derive_child("m/44'/501'/0'/0'/0'").await.unwrap().unwrap();
        let b = facade.derive_child("m/44'/501'/0'/0'/1'").await.unwrap().unwrap();
        assert_ne!(a.public_key, b.public_key);
    }

    #[tokio::test]
    async fn owner_sign_then_verify_round_trips() {
        let facade = Ed25519Crypto::from_seed([3u8; 32]);
        let payload = b"certificate payload";
        let sig = facade.sign_owner(payload).await.unwrap();
        let ok = facade
            .verify_owner(&facade.owner_public_key(), payload, &sig)
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn verify_fails_on_tampered_payload() {
        let facade = Ed25519Crypto::from_seed([3u8; 32]);
        let sig = facade.sign_owner(b"original").await.unwrap();
        let ok = facade
            .verify_owner(&facade.owner_public_key(), b"tampered", &sig)
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_round_trips() {
        let alice = Ed25519Crypto::from_seed([1u8; 32]);
        let bob = Ed25519Crypto::from_seed([2u8; 32]);
        let plaintext = b"payment authorization";
        let ciphertext = alice
            .encrypt_for(&bob.x25519_public_hex(), plaintext)
            .await
            .unwrap();
        let decrypted = bob.decrypt(&ciphertext).await.unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[tokio::test]
    async fn context_derivation_is_deterministic_and_isolated() {
        let facade = Ed25519Crypto::from_seed([9u8; 32]);
        let a1 = facade
            .derive_context_address("agent:x:dir:inbound:seq:1", ChainKind::Evm)
            .await
            .unwrap();
        let a2 = facade
            .derive_context_address("agent:x:dir:inbound:seq:1", ChainKind::Evm)
            .await
            .unwrap();
        let a3 = facade
            .derive_context_address("agent:x:dir:inbound:seq:2", ChainKind::Evm)
            .await
            .unwrap();
        assert_eq!(a1.address, a2.address);
        assert_ne!(a1.address, a3.address);
    }
}
