//! Deterministic sub-key derivation from a master seed, plus the X25519
//! static secret used for authenticated encryption. Secret material is
//! zeroized on drop the same way a keypair holder elsewhere in this
//! workspace wipes its secret key bytes.

use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Derives a 32-byte key seed from `master_seed` and an arbitrary label
/// (a derivation path or a domain-separation tag). Not a real BIP32/HKDF
/// chain — a single SHA-256 over `seed || ":" || label` — but it gives the
/// one property the core actually depends on: identical inputs always
/// produce identical outputs, and distinct labels never collide in practice.
pub fn label_seed(master_seed: &[u8; 32], label: &str) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(master_seed);
    hasher.update(b":");
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Zeroizing::new(out)
}

pub fn signing_key_for_label(master_seed: &[u8; 32], label: &str) -> SigningKey {
    SigningKey::from_bytes(&label_seed(master_seed, label))
}

pub fn x25519_secret_for_label(master_seed: &[u8; 32], label: &str) -> StaticSecret {
    StaticSecret::from(*label_seed(master_seed, label))
}

pub fn x25519_public_for_label(master_seed: &[u8; 32], label: &str) -> X25519PublicKey {
    X25519PublicKey::from(&x25519_secret_for_label(master_seed, label))
}
