//! Shared newtypes and the polymorphic execution-request sum. Anything used
//! by more than one subsystem crate lives here so no crate has to depend on
//! another subsystem crate just to share a primitive.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AespError;

/// A 64-hex-character agent identifier (`SHA-256(publicKey)` hex-encoded).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Builds an `AgentId`, rejecting anything that isn't exactly 64 lowercase
    /// hex characters.
    pub fn new(hex: impl Into<String>) -> Result<Self, AespError> {
        let hex = hex.into();
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AespError::Serialization(format!(
                "agentId must be 64 hex characters, got {:?}",
                hex
            )));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The agent's decentralized identifier: `did:<ns>:<agentId>`.
    pub fn did(&self, namespace: &str) -> String {
        format!("did:{namespace}:{}", self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A parsed `HH:MM`-`HH:MM` window, possibly wrapping past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Minutes since local midnight, inclusive.
    pub start_minutes: u16,
    /// Minutes since local midnight, inclusive.
    pub end_minutes: u16,
}

impl TimeWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self, AespError> {
        Ok(Self {
            start_minutes: parse_hh_mm(start)?,
            end_minutes: parse_hh_mm(end)?,
        })
    }

    /// True if `minutes` (since local midnight) falls inside the window.
    /// Windows with `start > end` wrap around midnight.
    pub fn contains(&self, minutes: u16) -> bool {
        if self.start_minutes <= self.end_minutes {
            minutes >= self.start_minutes && minutes <= self.end_minutes
        } else {
            minutes >= self.start_minutes || minutes <= self.end_minutes
        }
    }
}

fn parse_hh_mm(s: &str) -> Result<u16, AespError> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| AespError::Serialization(format!("invalid HH:MM time window: {s:?}")))?;
    let h: u16 = h
        .parse()
        .map_err(|_| AespError::Serialization(format!("invalid hour in {s:?}")))?;
    let m: u16 = m
        .parse()
        .map_err(|_| AespError::Serialization(format!("invalid minute in {s:?}")))?;
    if h > 23 || m > 59 {
        return Err(AespError::Serialization(format!(
            "time window component out of range: {s:?}"
        )));
    }
    Ok(h * 60 + m)
}

/// The four execution-request shapes the policy engine evaluates. Modeled as
/// a tagged sum rather than one struct with optional fields, so the gate
/// sequence is a `match` instead of a pile of `if let Some`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExecutionRequest {
    Transfer(TransferRequest),
    SendTransaction(SendTransactionRequest),
    SignPersonal(SignPersonalRequest),
    SignTypedData(SignTypedDataRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub request_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub policy_id: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub to_address: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
    /// Caller-supplied projection of balance remaining after this spend, if known.
    #[serde(default)]
    pub balance_after_hint: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTransactionRequest {
    pub request_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub policy_id: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub to_address: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub balance_after_hint: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignPersonalRequest {
    pub request_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub policy_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignTypedDataRequest {
    pub request_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

impl ExecutionRequest {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Transfer(r) => &r.request_id,
            Self::SendTransaction(r) => &r.request_id,
            Self::SignPersonal(r) => &r.request_id,
            Self::SignTypedData(r) => &r.request_id,
        }
    }

    pub fn agent_id(&self) -> &str {
        match self {
            Self::Transfer(r) => &r.agent_id,
            Self::SendTransaction(r) => &r.agent_id,
            Self::SignPersonal(r) => &r.agent_id,
            Self::SignTypedData(r) => &r.agent_id,
        }
    }

    pub fn vendor_id(&self) -> Option<&str> {
        match self {
            Self::Transfer(r) => r.vendor_id.as_deref(),
            Self::SendTransaction(r) => r.vendor_id.as_deref(),
            Self::SignPersonal(r) => r.vendor_id.as_deref(),
            Self::SignTypedData(r) => r.vendor_id.as_deref(),
        }
    }

    pub fn policy_id(&self) -> Option<&str> {
        match self {
            Self::Transfer(r) => r.policy_id.as_deref(),
            Self::SendTransaction(r) => r.policy_id.as_deref(),
            Self::SignPersonal(r) => r.policy_id.as_deref(),
            Self::SignTypedData(r) => r.policy_id.as_deref(),
        }
    }

    /// Transfer-like actions are the only ones the budget/amount gates apply to.
    pub fn is_transfer_like(&self) -> bool {
        matches!(self, Self::Transfer(_) | Self::SendTransaction(_))
    }

    pub fn amount(&self) -> Option<i64> {
        match self {
            Self::Transfer(r) => Some(r.amount),
            Self::SendTransaction(r) => Some(r.amount),
            _ => None,
        }
    }

    pub fn to_address(&self) -> Option<&str> {
        match self {
            Self::Transfer(r) => r.to_address.as_deref(),
            Self::SendTransaction(r) => r.to_address.as_deref(),
            _ => None,
        }
    }

    pub fn chain(&self) -> Option<&str> {
        match self {
            Self::Transfer(r) => r.chain.as_deref(),
            Self::SendTransaction(r) => r.chain.as_deref(),
            Self::SignTypedData(r) => r.chain.as_deref(),
            Self::SignPersonal(_) => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Self::SendTransaction(r) => r.method.as_deref(),
            Self::SignTypedData(r) => r.method.as_deref(),
            _ => None,
        }
    }

    pub fn balance_after_hint(&self) -> Option<i64> {
        match self {
            Self::Transfer(r) => r.balance_after_hint,
            Self::SendTransaction(r) => r.balance_after_hint,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_agent_id() {
        assert!(AgentId::new("ab").is_err());
    }

    #[test]
    fn accepts_64_hex_chars() {
        let id = AgentId::new("a".repeat(64)).unwrap();
        assert_eq!(id.as_str().len(), 64);
    }

    #[test]
    fn did_has_expected_shape() {
        let id = AgentId::new("a".repeat(64)).unwrap();
        assert_eq!(id.did("aesp"), format!("did:aesp:{}", "a".repeat(64)));
    }

    #[test]
    fn time_window_non_wrapping() {
        let w = TimeWindow::parse("09:00", "17:00").unwrap();
        assert!(w.contains(12 * 60));
        assert!(!w.contains(18 * 60));
    }

    #[test]
    fn time_window_wraps_midnight() {
        let w = TimeWindow::parse("22:00", "02:00").unwrap();
        assert!(w.contains(23 * 60));
        assert!(w.contains(60));
        assert!(!w.contains(12 * 60));
    }

    #[test]
    fn transfer_like_matches_transfer_and_send_transaction() {
        let t = ExecutionRequest::Transfer(TransferRequest {
            request_id: "r1".into(),
            agent_id: "a".repeat(64),
            vendor_id: None,
            policy_id: None,
            amount: 10,
            to_address: None,
            chain: None,
            balance_after_hint: None,
        });
        assert!(t.is_transfer_like());

        let sp = ExecutionRequest::SignPersonal(SignPersonalRequest {
            request_id: "r2".into(),
            agent_id: "a".repeat(64),
            vendor_id: None,
            policy_id: None,
            message: "hi".into(),
        });
        assert!(!sp.is_transfer_like());
    }
}
