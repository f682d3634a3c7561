//! Per-subsystem tunables. Every field here defaults from [`crate::constants`]
//! so a host can override a single knob without reconstructing the rest.

use crate::constants::*;

#[derive(Debug, Clone)]
pub struct PolicyEngineConfig {
    /// Largest accepted value for any `maxAmount*` condition.
    pub max_condition_amount: u64,
    /// Ring-buffer cap on the audit log.
    pub audit_log_cap: usize,
    /// Ring-buffer cap on a single agent's budget transaction history.
    pub budget_transactions_cap: usize,
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        Self {
            max_condition_amount: MAX_CONDITION_AMOUNT,
            audit_log_cap: AUDIT_LOG_CAP,
            budget_transactions_cap: BUDGET_TRANSACTIONS_CAP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Maximum rounds a session may accumulate before it is rejected.
    pub max_rounds: u32,
    /// Session lifetime before it is considered expired (seconds).
    pub ttl_secs: i64,
    /// Persistence debounce window (milliseconds).
    pub flush_debounce_ms: u64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            ttl_secs: DEFAULT_NEGOTIATION_TTL_SECS,
            flush_debounce_ms: NEGOTIATION_FLUSH_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReviewConfig {
    /// Default deadline granted to a new review request (minutes).
    pub default_deadline_minutes: i64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            default_deadline_minutes: DEFAULT_REVIEW_DEADLINE_MINUTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    /// Maximum addresses processed in one consolidation batch.
    pub max_batch_size: usize,
    /// Inclusive inter-batch delay range (seconds).
    pub inter_batch_delay_range_secs: (u64, u64),
    /// Base interval between self-rescheduling sweeps (seconds).
    pub base_interval_secs: u64,
    /// Jitter ratio applied to the base interval, clamped to `[0, 1]`.
    pub jitter_ratio: f64,
    /// Minimum eligible-address count before `should_consolidate` fires.
    pub consolidation_threshold: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_CONSOLIDATION_BATCH_SIZE,
            inter_batch_delay_range_secs: DEFAULT_INTER_BATCH_DELAY_RANGE_SECS,
            base_interval_secs: DEFAULT_CONSOLIDATION_BASE_INTERVAL_SECS,
            jitter_ratio: DEFAULT_CONSOLIDATION_JITTER_RATIO,
            consolidation_threshold: DEFAULT_CONSOLIDATION_BATCH_SIZE,
        }
    }
}

/// Strategy governing when context tags are archived in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditBatchStrategy {
    Immediate,
    TimeWindow,
    CountThreshold,
}

#[derive(Debug, Clone)]
pub struct AuditBatchConfig {
    pub strategy: AuditBatchStrategy,
    /// Recurring archive interval for `TimeWindow` (milliseconds).
    pub window_ms: Option<u64>,
    /// Unarchived-confirmed count that triggers `CountThreshold`.
    pub count_threshold: Option<usize>,
    /// Tags below this amount are never archived eagerly, regardless of strategy.
    pub low_value_threshold: Option<u64>,
}

impl Default for AuditBatchConfig {
    fn default() -> Self {
        Self {
            strategy: AuditBatchStrategy::Immediate,
            window_ms: None,
            count_threshold: None,
            low_value_threshold: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Persistence debounce window (milliseconds).
    pub flush_debounce_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            flush_debounce_ms: POOL_FLUSH_DEBOUNCE_MS,
        }
    }
}
