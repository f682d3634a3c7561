//! Rolling daily/weekly/monthly spend tracking with lazy period rollover.
//! Rollover happens on read, not on a timer: the first check or record
//! after a period boundary resets the relevant counter to zero before the
//! new amount is considered.

use std::collections::BTreeMap;

use aesp_core::constants::BUDGET_TRANSACTIONS_CAP;
use aesp_core::push_capped;
use chrono::{DateTime, Datelike, Duration, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::policy::PolicyConditions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetTransaction {
    pub request_id: String,
    pub amount: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    pub daily_spent: i64,
    pub weekly_spent: i64,
    pub monthly_spent: i64,
    pub last_reset_daily: i64,
    pub last_reset_weekly: i64,
    pub last_reset_monthly: i64,
    pub transactions: Vec<BudgetTransaction>,
}

impl BudgetSnapshot {
    fn new(now: i64) -> Self {
        Self {
            daily_spent: 0,
            weekly_spent: 0,
            monthly_spent: 0,
            last_reset_daily: now,
            last_reset_weekly: now,
            last_reset_monthly: now,
            transactions: Vec::new(),
        }
    }

    /// Resets any counter whose period has elapsed as of `now`, in place.
    fn rollover(&mut self, now: i64) {
        let local_now = to_local(now);
        if to_local(self.last_reset_daily).date_naive() < local_now.date_naive() {
            self.daily_spent = 0;
            self.last_reset_daily = now;
        }
        if now - self.last_reset_weekly >= Duration::days(7).num_milliseconds() {
            self.weekly_spent = 0;
            self.last_reset_weekly = now;
        }
        let last_monthly = to_local(self.last_reset_monthly);
        if last_monthly.year() != local_now.year() || last_monthly.month() != local_now.month() {
            self.monthly_spent = 0;
            self.last_reset_monthly = now;
        }
    }

    fn record(&mut self, request_id: &str, amount: i64, now: i64) {
        self.rollover(now);
        self.daily_spent += amount;
        self.weekly_spent += amount;
        self.monthly_spent += amount;
        push_capped(
            &mut self.transactions,
            BudgetTransaction {
                request_id: request_id.to_string(),
                amount,
                timestamp: now,
            },
            BUDGET_TRANSACTIONS_CAP,
        );
    }
}

fn to_local(epoch_millis: i64) -> DateTime<Local> {
    Local.timestamp_millis_opt(epoch_millis).single().unwrap_or_else(Local::now)
}

/// Per-agent budget state. Checks are read-only projections; recording a
/// spend is the only mutating operation.
#[derive(Debug, Default)]
pub struct BudgetTracker {
    snapshots: BTreeMap<String, BudgetSnapshot>,
}

/// Which budget period gate rejected a projected spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetPeriod {
    PerTransaction,
    Daily,
    Weekly,
    Monthly,
}

impl BudgetTracker {
    pub fn from_snapshots(snapshots: BTreeMap<String, BudgetSnapshot>) -> Self {
        Self { snapshots }
    }

    pub fn snapshots(&self) -> &BTreeMap<String, BudgetSnapshot> {
        &self.snapshots
    }

    pub fn snapshot(&self, agent_id: &str) -> Option<&BudgetSnapshot> {
        self.snapshots.get(agent_id)
    }

    /// Checks whether `amount` fits under every limit `conditions` sets,
    /// after rolling over any elapsed period. Returns the first period that
    /// would be exceeded, if any.
    pub fn check_projected(
        &mut self,
        agent_id: &str,
        amount: i64,
        conditions: &PolicyConditions,
        now: i64,
    ) -> Option<BudgetPeriod> {
        let snapshot = self
            .snapshots
            .entry(agent_id.to_string())
            .or_insert_with(|| BudgetSnapshot::new(now));
        snapshot.rollover(now);

        if let Some(limit) = conditions.max_amount_per_tx {
            if amount as u64 > limit {
                return Some(BudgetPeriod::PerTransaction);
            }
        }
        if let Some(limit) = conditions.max_amount_per_day {
            if (snapshot.daily_spent + amount) as u64 > limit {
                return Some(BudgetPeriod::Daily);
            }
        }
        if let Some(limit) = conditions.max_amount_per_week {
            if (snapshot.weekly_spent + amount) as u64 > limit {
                return Some(BudgetPeriod::Weekly);
            }
        }
        if let Some(limit) = conditions.max_amount_per_month {
            if (snapshot.monthly_spent + amount) as u64 > limit {
                return Some(BudgetPeriod::Monthly);
            }
        }
        None
    }

    pub fn record_spend(&mut self, agent_id: &str, request_id: &str, amount: i64, now: i64) {
        self.snapshots
            .entry(agent_id.to_string())
            .or_insert_with(|| BudgetSnapshot::new(now))
            .record(request_id, amount, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyConditions;

    fn conditions(per_tx: u64, per_day: u64) -> PolicyConditions {
        PolicyConditions {
            max_amount_per_tx: Some(per_tx),
            max_amount_per_day: Some(per_day),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_amount_over_per_tx_limit() {
        let mut tracker = BudgetTracker::default();
        let rejected = tracker.check_projected("a1", 100, &conditions(50, 1_000), 0);
        assert_eq!(rejected, Some(BudgetPeriod::PerTransaction));
    }

    #[test]
    fn accumulates_daily_spend_across_checks() {
        let mut tracker = BudgetTracker::default();
        tracker.record_spend("a1", "r1", 150, 0);
        let rejected = tracker.check_projected("a1", 100, &conditions(1_000, 200), 0);
        assert_eq!(rejected, Some(BudgetPeriod::Daily));
    }

    #[test]
    fn daily_rollover_resets_spent_after_midnight() {
        let mut tracker = BudgetTracker::default();
        tracker.record_spend("a1", "r1", 150, 0);
        let next_day_millis = 36 * 3_600 * 1_000;
        let rejected = tracker.check_projected("a1", 100, &conditions(1_000, 200), next_day_millis);
        assert_eq!(rejected, None);
        assert_eq!(tracker.snapshot("a1").unwrap().daily_spent, 0);
    }

    #[test]
    fn caps_transaction_history() {
        let mut tracker = BudgetTracker::default();
        for i in 0..(BUDGET_TRANSACTIONS_CAP + 3) {
            tracker.record_spend("a1", &format!("r{i}"), 1, 0);
        }
        assert_eq!(tracker.snapshot("a1").unwrap().transactions.len(), BUDGET_TRANSACTIONS_CAP);
    }
}
