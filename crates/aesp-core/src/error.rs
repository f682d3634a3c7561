use thiserror::Error;

/// Every failure mode the core can raise, grouped by structural, protocol,
/// lifecycle, and crypto concerns. Ordinary policy rejections are not
/// represented here — they are data (`PolicyDecision`), never an `Err`.
#[derive(Debug, Error)]
pub enum AespError {
    // ── Structural ───────────────────────────────────────────────────────────
    #[error("agent index {0} out of range [0, 2^31 - 1]")]
    InvalidAgentIndex(u32),

    #[error("invalid price: {0}")]
    InvalidPrice(f64),

    #[error("invalid delivery deadline: {0}")]
    InvalidDeadline(f64),

    #[error("invalid chain id: {0}")]
    InvalidChainId(i64),

    #[error("invalid policy signature")]
    InvalidPolicySignature,

    #[error("invalid commitment state: {0}")]
    InvalidCommitmentState(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("commitment not found: {0}")]
    CommitmentNotFound(String),

    #[error("review request not found: {0}")]
    ReviewNotFound(String),

    #[error("review request already resolved: {0}")]
    ReviewAlreadyResolved(String),

    #[error("crypto facade does not expose context-isolated derivation")]
    Rev32Required,

    // ── Protocol ─────────────────────────────────────────────────────────────
    #[error("negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    // ── Lifecycle ────────────────────────────────────────────────────────────
    #[error("review request {0} expired before a response was submitted")]
    ReviewExpired(String),

    #[error("agent {0} is frozen")]
    AgentFrozen(String),

    #[error("component has been disposed")]
    Disposed,

    // ── Crypto ───────────────────────────────────────────────────────────────
    #[error("crypto facade error: {0}")]
    Crypto(String),

    // ── Persistence ──────────────────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Reasons a negotiation-session operation can be rejected. Kept as a
/// distinct enum (rather than folded into `AespError::Negotiation(String)`)
/// so callers can match on the precondition that failed.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("negotiation session not found: {0}")]
    SessionNotFound(String),

    #[error("sender {sender} is not a participant in session {session_id}")]
    UnauthorizedSender { session_id: String, sender: String },

    #[error("no transition for state {state} on message {message}")]
    InvalidTransition { state: String, message: String },

    #[error("negotiation session {0} has expired")]
    SessionExpired(String),

    #[error("negotiation session {session_id} exceeded max rounds ({max_rounds})")]
    MaxRoundsExceeded { session_id: String, max_rounds: u32 },

    #[error("message is missing required field: {0}")]
    MissingField(&'static str),

    #[error("incoming message signature does not verify")]
    InvalidSignature,
}

pub type AespResult<T> = Result<T, AespError>;
