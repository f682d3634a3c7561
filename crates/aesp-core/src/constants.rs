//! ─── AESP Protocol Constants ────────────────────────────────────────────────
//!
//! Named defaults for every subsystem tunable. Each config struct in
//! [`crate::config`] derives its `Default` from these rather than
//! hard-coding the numbers a second time.

// ── Identity & Hierarchy ──────────────────────────────────────────────────────

/// Highest legal `agentIndex` for deterministic key derivation (`2^31 - 1`).
pub const MAX_AGENT_INDEX: u32 = 2_147_483_647;

/// BIP-style derivation path prefix; `agentIndex` is appended as the final
/// hardened segment: `m/44'/501'/0'/0'/<agentIndex>'`.
pub const DERIVATION_PATH_PREFIX: &str = "m/44'/501'/0'/0'";

/// Root nodes of the agent hierarchy sit at depth 0; a node at this depth may
/// not take on further children (depths 0..=4 are legal, 5 total levels).
pub const MAX_HIERARCHY_DEPTH: u32 = 4;

/// Label of the synthetic ancestor that terminates every escalation chain.
pub const SYNTHETIC_HUMAN_LABEL: &str = "human";

// ── Policy Engine / Budget Tracker ────────────────────────────────────────────

/// Largest integer condition value the policy engine accepts (`2^53 - 1`,
/// the largest integer a float64 host could have round-tripped exactly).
pub const MAX_CONDITION_AMOUNT: u64 = 9_007_199_254_740_991;

/// Audit log is a ring buffer capped at this many entries.
pub const AUDIT_LOG_CAP: usize = 10_000;

/// Per-agent budget transaction history is a ring buffer capped at this many.
pub const BUDGET_TRANSACTIONS_CAP: usize = 1_000;

// ── Negotiation FSM ───────────────────────────────────────────────────────────

/// Default maximum negotiation rounds before the session is rejected.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Default negotiation session lifetime before it is considered expired.
pub const DEFAULT_NEGOTIATION_TTL_SECS: i64 = 24 * 3600;

/// Debounce window for negotiation-session persistence flushes (milliseconds).
pub const NEGOTIATION_FLUSH_DEBOUNCE_MS: u64 = 80;

// ── Commitment Builder ────────────────────────────────────────────────────────

/// Commitment nonces are drawn from this many bits of secure randomness.
pub const COMMITMENT_NONCE_BITS: u32 = 53;

// ── Review Manager ────────────────────────────────────────────────────────────

/// Default deadline for a human review request (minutes).
pub const DEFAULT_REVIEW_DEADLINE_MINUTES: i64 = 30;

// ── Privacy subsystem ─────────────────────────────────────────────────────────

/// Context tag store is a ring buffer capped at this many entries.
pub const CONTEXT_TAG_CAP: usize = 10_000;

/// Consolidation record store is a ring buffer capped at this many entries.
pub const CONSOLIDATION_RECORD_CAP: usize = 1_000;

/// Debounce window for address-pool persistence flushes (milliseconds).
pub const POOL_FLUSH_DEBOUNCE_MS: u64 = 100;

/// Default maximum number of addresses consolidated in a single batch.
pub const DEFAULT_CONSOLIDATION_BATCH_SIZE: usize = 5;

/// Default inter-batch delay range for batched consolidation (seconds).
pub const DEFAULT_INTER_BATCH_DELAY_RANGE_SECS: (u64, u64) = (600, 3_600);

/// Default base interval between scheduled consolidation sweeps (seconds).
pub const DEFAULT_CONSOLIDATION_BASE_INTERVAL_SECS: u64 = 4 * 3_600;

/// Default jitter ratio applied to the base interval, clamped to `[0, 1]`.
pub const DEFAULT_CONSOLIDATION_JITTER_RATIO: f64 = 0.3;

// ── Storage keys ──────────────────────────────────────────────────────────────
//
// Each subsystem is the sole writer of the key bearing its name; no two
// subsystems ever write the same key.

pub const STORAGE_KEY_POLICIES: &str = "aesp:policies";
pub const STORAGE_KEY_AUDIT: &str = "aesp:audit";
pub const STORAGE_KEY_NEGOTIATION_SESSIONS: &str = "aesp:negotiation_sessions";
pub const STORAGE_KEY_COMMITMENTS: &str = "aesp:commitments";
pub const STORAGE_KEY_REVIEW_QUEUE: &str = "aesp:review_queue";
pub const STORAGE_KEY_FREEZE_STATUS: &str = "aesp:freeze_status";
pub const STORAGE_KEY_AGENT_HIERARCHY: &str = "aesp:agent_hierarchy";
pub const STORAGE_KEY_ADDRESS_POOL: &str = "aesp:address_pool";
pub const STORAGE_KEY_CONTEXT_TAGS: &str = "aesp:context_tags";
pub const STORAGE_KEY_CONSOLIDATION: &str = "aesp:consolidation";
pub const STORAGE_KEY_BUDGETS: &str = "aesp:budgets";
