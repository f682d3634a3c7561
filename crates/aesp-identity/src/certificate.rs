//! Signed capability certificates. The signed payload is the certificate
//! itself (minus `ownerSignature`) run through the canonical serializer;
//! because the canonical serializer sorts keys alphabetically and the
//! certificate's own field names already fall in the required order
//! (`agentId, capabilities, chains, createdAt, expiresAt,
//! maxAutonomousAmount, ownerXidentity, policyHash, pubkey, version`), no
//! separate ordering step is needed.

use aesp_core::capability::CryptoFacade;
use aesp_core::{to_canonical_bytes, AespError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Payment,
    Negotiation,
    DataQuery,
    Commitment,
    Delegation,
    Arbitration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub version: String,
    pub agent_id: String,
    pub pubkey: String,
    pub owner_x_identity: String,
    pub capabilities: Vec<Capability>,
    pub policy_hash: String,
    pub max_autonomous_amount: i64,
    pub chains: Vec<String>,
    pub created_at: i64,
    pub expires_at: i64,
    #[serde(default)]
    pub owner_signature: Option<String>,
}

/// The unsigned fields the owner's signature covers. Serializes to the same
/// JSON shape as [`Certificate`] with `ownerSignature` omitted, since the
/// canonical serializer drops `None` fields anyway — kept as a thin wrapper
/// so the signing call site reads as "sign this, not the whole struct".
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignablePayload<'a> {
    version: &'a str,
    agent_id: &'a str,
    pubkey: &'a str,
    owner_x_identity: &'a str,
    capabilities: &'a [Capability],
    policy_hash: &'a str,
    max_autonomous_amount: i64,
    chains: &'a [String],
    created_at: i64,
    expires_at: i64,
}

fn signable_bytes(cert: &Certificate) -> Result<Vec<u8>, AespError> {
    let payload = SignablePayload {
        version: &cert.version,
        agent_id: &cert.agent_id,
        pubkey: &cert.pubkey,
        owner_x_identity: &cert.owner_x_identity,
        capabilities: &cert.capabilities,
        policy_hash: &cert.policy_hash,
        max_autonomous_amount: cert.max_autonomous_amount,
        chains: &cert.chains,
        created_at: cert.created_at,
        expires_at: cert.expires_at,
    };
    to_canonical_bytes(&payload)
}

/// SHA-256 of the canonical-JSON policy input, stored on the certificate as
/// `policyHash`.
pub fn policy_hash<T: Serialize>(crypto: &dyn CryptoFacade, policy: &T) -> Result<String, AespError> {
    let bytes = to_canonical_bytes(policy)?;
    Ok(hex::encode(crypto.sha256(&bytes)))
}

#[allow(clippy::too_many_arguments)]
pub async fn create_certificate(
    crypto: &dyn CryptoFacade,
    agent_id: &str,
    pubkey: &str,
    owner_x_identity: &str,
    capabilities: Vec<Capability>,
    policy_hash: String,
    max_autonomous_amount: i64,
    chains: Vec<String>,
    created_at: i64,
    expires_at: i64,
) -> Result<Certificate, AespError> {
    let mut cert = Certificate {
        version: "1.0".to_string(),
        agent_id: agent_id.to_string(),
        pubkey: pubkey.to_string(),
        owner_x_identity: owner_x_identity.to_string(),
        capabilities,
        policy_hash,
        max_autonomous_amount,
        chains,
        created_at,
        expires_at,
        owner_signature: None,
    };
    let payload = signable_bytes(&cert)?;
    let signature = crypto.sign_owner(&payload).await?;
    cert.owner_signature = Some(hex::encode(signature));
    Ok(cert)
}

/// Verifies a certificate's owner signature. `trust_anchor`, when supplied,
/// must equal `cert.owner_x_identity` — that anchor mode is the only
/// security-bearing path. With no anchor this falls back to self-
/// verification against the certificate's own embedded identity, which
/// confirms only that the embedded key signed itself and asserts nothing
/// about who that key belongs to.
pub async fn verify_certificate(
    crypto: &dyn CryptoFacade,
    cert: &Certificate,
    trust_anchor: Option<&str>,
) -> Result<bool, AespError> {
    if let Some(anchor) = trust_anchor {
        if anchor != cert.owner_x_identity {
            return Ok(false);
        }
    }
    let Some(signature_hex) = &cert.owner_signature else {
        return Ok(false);
    };
    let signature = hex::decode(signature_hex)
        .map_err(|e| AespError::Crypto(format!("bad owner signature hex: {e}")))?;
    let owner_public_key = hex::decode(&cert.owner_x_identity)
        .map_err(|e| AespError::Crypto(format!("bad owner identity hex: {e}")))?;
    let payload = signable_bytes(cert)?;
    crypto.verify_owner(&owner_public_key, &payload, &signature).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use aesp_crypto::Ed25519Crypto;

    fn owner_identity_hex(crypto: &Ed25519Crypto) -> String {
        hex::encode(crypto.owner_public_key())
    }

    #[tokio::test]
    async fn create_then_verify_round_trips() {
        let crypto = Ed25519Crypto::from_seed([4u8; 32]);
        let owner = owner_identity_hex(&crypto);
        let cert = create_certificate(
            &crypto,
            &"a".repeat(64),
            "pub",
            &owner,
            vec![Capability::Payment],
            "hash".into(),
            1_000,
            vec!["ethereum".into()],
            0,
            1,
        )
        .await
        .unwrap();

        assert!(verify_certificate(&crypto, &cert, Some(&owner)).await.unwrap());
    }

    #[tokio::test]
    async fn anchor_mismatch_fails_verification() {
        let crypto = Ed25519Crypto::from_seed([4u8; 32]);
        let owner = owner_identity_hex(&crypto);
        let cert = create_certificate(
            &crypto,
            &"a".repeat(64),
            "pub",
            &owner,
            vec![Capability::Payment],
            "hash".into(),
            1_000,
            vec!["ethereum".into()],
            0,
            1,
        )
        .await
        .unwrap();

        let other = "f".repeat(64);
        assert!(!verify_certificate(&crypto, &cert, Some(&other)).await.unwrap());
    }

    #[tokio::test]
    async fn self_verification_succeeds_without_anchor() {
        let crypto = Ed25519Crypto::from_seed([4u8; 32]);
        let owner = owner_identity_hex(&crypto);
        let cert = create_certificate(
            &crypto,
            &"a".repeat(64),
            "pub",
            &owner,
            vec![],
            "hash".into(),
            0,
            vec![],
            0,
            1,
        )
        .await
        .unwrap();

        assert!(verify_certificate(&crypto, &cert, None).await.unwrap());
    }

    #[tokio::test]
    async fn tampered_field_fails_verification() {
        let crypto = Ed25519Crypto::from_seed([4u8; 32]);
        let owner = owner_identity_hex(&crypto);
        let mut cert = create_certificate(
            &crypto,
            &"a".repeat(64),
            "pub",
            &owner,
            vec![Capability::Payment],
            "hash".into(),
            1_000,
            vec!["ethereum".into()],
            0,
            1,
        )
        .await
        .unwrap();

        cert.max_autonomous_amount = 999_999;
        assert!(!verify_certificate(&crypto, &cert, Some(&owner)).await.unwrap());
    }
}
