//! The negotiation FSM: a validated multi-round state machine with
//! debounced, explicitly-flushable persistence. State lives behind
//! `RefCell` — this engine runs on one cooperative task and is never
//! re-entered while an earlier call is suspended on its own output.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::Arc;

use aesp_core::constants::STORAGE_KEY_NEGOTIATION_SESSIONS;
use aesp_core::{AespError, AespResult, NegotiationError, Storage};
use serde_json::Value;

use crate::session::{MessageType, NegotiationSession, NegotiationState, Round};

fn next_state(state: NegotiationState, message: MessageType, sender_is_self: bool) -> Option<NegotiationState> {
    use MessageType::*;
    use NegotiationState::*;
    match (state, message) {
        (Initial, Offer) => Some(if sender_is_self { OfferSent } else { OfferReceived }),
        (OfferSent, Counter) | (OfferReceived, Counter) | (Countering, Counter) => Some(Countering),
        (OfferSent, Accept) | (OfferReceived, Accept) | (Countering, Accept) => Some(Accepted),
        (OfferSent, Reject) | (OfferReceived, Reject) | (Countering, Reject) => Some(Rejected),
        (Accepted, Commit) => Some(Committed),
        _ => None,
    }
}

pub struct NegotiationEngine {
    storage: Arc<dyn Storage>,
    sessions: RefCell<BTreeMap<String, NegotiationSession>>,
    dirty: Cell<bool>,
}

impl NegotiationEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            sessions: RefCell::new(BTreeMap::new()),
            dirty: Cell::new(false),
        }
    }

    pub async fn load(&self) -> AespResult<()> {
        if let Some(value) = self.storage.get(STORAGE_KEY_NEGOTIATION_SESSIONS).await? {
            let sessions: BTreeMap<String, NegotiationSession> =
                serde_json::from_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
            *self.sessions.borrow_mut() = sessions;
        }
        Ok(())
    }

    pub fn create_session(
        &self,
        session_id: &str,
        my_agent_id: &str,
        counterparty_agent_id: &str,
        max_rounds: u32,
        now: i64,
        ttl_secs: i64,
    ) -> NegotiationSession {
        let session = NegotiationSession {
            session_id: session_id.to_string(),
            my_agent_id: my_agent_id.to_string(),
            counterparty_agent_id: counterparty_agent_id.to_string(),
            state: NegotiationState::Initial,
            rounds: Vec::new(),
            max_rounds,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl_secs * 1000,
            commitment: None,
        };
        self.sessions.borrow_mut().insert(session_id.to_string(), session.clone());
        self.dirty.set(true);
        session
    }

    pub fn get(&self, session_id: &str) -> Option<NegotiationSession> {
        self.sessions.borrow().get(session_id).cloned()
    }

    /// Advances `session_id`'s state machine by one round. Preconditions —
    /// session exists, not expired, under `maxRounds`, sender is a
    /// participant, `(state, message)` has a transition — are all checked
    /// before any mutation.
    pub fn transition(
        &self,
        session_id: &str,
        sender_agent_id: &str,
        message_type: MessageType,
        payload: Value,
        now: i64,
    ) -> AespResult<NegotiationState> {
        let mut sessions = self.sessions.borrow_mut();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| NegotiationError::SessionNotFound(session_id.to_string()))?;

        if session.is_expired(now) {
            return Err(NegotiationError::SessionExpired(session_id.to_string()).into());
        }
        if session.rounds.len() as u32 >= session.max_rounds {
            return Err(NegotiationError::MaxRoundsExceeded {
                session_id: session_id.to_string(),
                max_rounds: session.max_rounds,
            }
            .into());
        }
        if !session.is_participant(sender_agent_id) {
            return Err(NegotiationError::UnauthorizedSender {
                session_id: session_id.to_string(),
                sender: sender_agent_id.to_string(),
            }
            .into());
        }

        let sender_is_self = sender_agent_id == session.my_agent_id;
        let next = next_state(session.state, message_type, sender_is_self).ok_or_else(|| {
            NegotiationError::InvalidTransition {
                state: format!("{:?}", session.state),
                message: format!("{:?}", message_type),
            }
        })?;

        session.rounds.push(Round {
            round_number: session.rounds.len() as u32 + 1,
            sender: sender_agent_id.to_string(),
            message_type,
            payload,
            timestamp: now,
        });
        session.state = next;
        session.updated_at = now;
        drop(sessions);
        self.dirty.set(true);
        tracing::info!(session_id, ?next, "negotiation session transitioned");
        Ok(next)
    }

    /// Writes the session table to storage if there is anything pending,
    /// and clears the dirty flag. Safe to call speculatively.
    pub async fn flush(&self) -> AespResult<()> {
        if !self.dirty.get() {
            return Ok(());
        }
        let value = serde_json::to_value(&*self.sessions.borrow())
            .map_err(|e| AespError::Serialization(e.to_string()))?;
        self.storage.set(STORAGE_KEY_NEGOTIATION_SESSIONS, value).await?;
        self.dirty.set(false);
        Ok(())
    }

    /// Cancels any pending flush by performing it immediately, so a
    /// disposed engine never leaves state unpersisted.
    pub async fn dispose(&self) -> AespResult<()> {
        self.flush().await
    }
}
