//! The signed wire wrapper around negotiation messages: agreement hashing
//! on acceptance, and signature verification on every incoming message
//! before it is allowed anywhere near the state machine.

use aesp_core::capability::CryptoFacade;
use aesp_core::{to_canonical_bytes, AespError, NegotiationError};
use serde::Serialize;
use serde_json::Value;

use crate::session::{MessageType, NegotiationSession};

/// A message received from a counterparty, not yet admitted to the FSM.
pub struct IncomingMessage {
    pub sender_agent_id: String,
    pub sender_public_key: Vec<u8>,
    pub message_type: MessageType,
    pub payload: Value,
    pub signature: Vec<u8>,
}

/// Verifies that `message.senderAgentId` is one of the session's two
/// participants, that the supplied public key actually hashes to that
/// agent id, and that the signature verifies over the canonical payload.
/// Rejects before any FSM transition is attempted.
pub async fn verify_incoming(
    crypto: &dyn CryptoFacade,
    session: &NegotiationSession,
    message: &IncomingMessage,
) -> Result<(), AespError> {
    if !session.is_participant(&message.sender_agent_id) {
        return Err(NegotiationError::UnauthorizedSender {
            session_id: session.session_id.clone(),
            sender: message.sender_agent_id.clone(),
        }
        .into());
    }

    let derived_id = hex::encode(crypto.sha256(&message.sender_public_key));
    if derived_id != message.sender_agent_id {
        return Err(NegotiationError::InvalidSignature.into());
    }

    let payload_bytes = to_canonical_bytes(&message.payload)?;
    let verified = crypto
        .verify_owner(&message.sender_public_key, &payload_bytes, &message.signature)
        .await?;
    if !verified {
        return Err(NegotiationError::InvalidSignature.into());
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceMessage {
    pub agreement_hash: String,
    pub price: Value,
    pub terms: Value,
}

/// The agreement hash carried in the acceptance message: `SHA-256` over the
/// canonical JSON of the session's last round payload.
pub fn build_acceptance_message(
    crypto: &dyn CryptoFacade,
    session: &NegotiationSession,
    price: Value,
    terms: Value,
) -> Result<AcceptanceMessage, AespError> {
    let last_round = session
        .rounds
        .last()
        .ok_or_else(|| NegotiationError::MissingField("rounds"))?;
    let payload_bytes = to_canonical_bytes(&last_round.payload)?;
    Ok(AcceptanceMessage {
        agreement_hash: hex::encode(crypto.sha256(&payload_bytes)),
        price,
        terms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{NegotiationState, Round};
    use aesp_crypto::Ed25519Crypto;
    use serde_json::json;

    fn session_with_round(my: &str, their: &str, payload: Value) -> NegotiationSession {
        NegotiationSession {
            session_id: "s1".into(),
            my_agent_id: my.into(),
            counterparty_agent_id: their.into(),
            state: NegotiationState::OfferSent,
            rounds: vec![Round {
                round_number: 1,
                sender: my.into(),
                message_type: MessageType::Offer,
                payload,
                timestamp: 0,
            }],
            max_rounds: 10,
            created_at: 0,
            updated_at: 0,
            expires_at: 86_400_000,
            commitment: None,
        }
    }

    #[tokio::test]
    async fn valid_signature_from_participant_is_accepted() {
        let crypto = Ed25519Crypto::from_seed([1u8; 32]);
        let public_key = crypto.owner_public_key();
        let sender_id = hex::encode(crypto.sha256(&public_key));
        let session = session_with_round("me", &sender_id, json!({"price": 500}));

        let payload = json!({"price": 500});
        let payload_bytes = to_canonical_bytes(&payload).unwrap();
        let signature = crypto.sign_owner(&payload_bytes).await.unwrap();

        let message = IncomingMessage {
            sender_agent_id: sender_id,
            sender_public_key: public_key,
            message_type: MessageType::Counter,
            payload,
            signature,
        };
        assert!(verify_incoming(&crypto, &session, &message).await.is_ok());
    }

    #[tokio::test]
    async fn non_participant_sender_is_rejected() {
        let crypto = Ed25519Crypto::from_seed([1u8; 32]);
        let public_key = crypto.owner_public_key();
        let session = session_with_round("me", "them", json!({"price": 500}));
        let payload = json!({"price": 500});
        let signature = crypto.sign_owner(&to_canonical_bytes(&payload).unwrap()).await.unwrap();

        let message = IncomingMessage {
            sender_agent_id: "stranger".into(),
            sender_public_key: public_key,
            message_type: MessageType::Counter,
            payload,
            signature,
        };
        let err = verify_incoming(&crypto, &session, &message).await.unwrap_err();
        assert!(matches!(err, AespError::Negotiation(NegotiationError::UnauthorizedSender { .. })));
    }

    #[tokio::test]
    async fn tampered_payload_fails_signature_check() {
        let crypto = Ed25519Crypto::from_seed([1u8; 32]);
        let public_key = crypto.owner_public_key();
        let sender_id = hex::encode(crypto.sha256(&public_key));
        let session = session_with_round("me", &sender_id, json!({"price": 500}));

        let signed_payload = json!({"price": 500});
        let signature = crypto
            .sign_owner(&to_canonical_bytes(&signed_payload).unwrap())
            .await
            .unwrap();

        let message = IncomingMessage {
            sender_agent_id: sender_id,
            sender_public_key: public_key,
            message_type: MessageType::Counter,
            payload: json!({"price": 999}),
            signature,
        };
        let err = verify_incoming(&crypto, &session, &message).await.unwrap_err();
        assert!(matches!(err, AespError::Negotiation(NegotiationError::InvalidSignature)));
    }

    #[test]
    fn agreement_hash_is_over_last_round_payload() {
        let crypto = Ed25519Crypto::from_seed([2u8; 32]);
        let session = session_with_round("me", "them", json!({"price": 500}));
        let msg = build_acceptance_message(&crypto, &session, json!(500), json!({"currency": "USDC"})).unwrap();
        assert_eq!(msg.agreement_hash.len(), 64);
    }
}
