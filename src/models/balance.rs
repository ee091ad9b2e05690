//! Balance views computed by the ledger service.
//!
//! The service owns the split algorithm; the client stores and displays
//! exactly what it returns and never recomputes a balance locally.

use serde::{Deserialize, Serialize};

/// One row of a group balance breakdown: how much a single counterparty owes
/// the requesting user (positive) or is owed by them (negative).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceDetail {
    pub counterparty: String,
    pub amount: f64,
}

/// The requesting user's net position within one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBalance {
    pub net: f64,
    #[serde(default)]
    pub detail: Vec<BalanceDetail>,
}

/// One row of a user's cross-group balance summary. `group_id` is the
/// identity key - the service emits at most one row per group. Fields are
/// camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceLine {
    #[serde(rename = "groupId")]
    pub group_id: i64,
    #[serde(rename = "groupName")]
    pub group_name: String,
    pub counterparty: String,
    pub amount: f64,
}
