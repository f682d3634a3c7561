//! A reference `CryptoFacade` implementation: Ed25519 signing, X25519 +
//! ChaCha20-Poly1305 sealed boxes, SHA-256, and unified context-isolated
//! derivation. Hosts that already have a key-management story implement
//! [`aesp_core::CryptoFacade`] themselves instead of depending on this crate.

pub mod facade;
pub mod keys;
pub mod testing;

pub use facade::Ed25519Crypto;
pub use testing::NoChildDerivationCrypto;
