//! Settlement-approval quorum state.

use serde::{Deserialize, Serialize};

use super::User;

/// Quorum state for a group's settlement request, as tracked by the ledger
/// service. Unlike the rest of the API this endpoint uses snake_case field
/// names, which match the Rust names directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementStatus {
    pub approved_count: i64,
    pub total_members: i64,
    pub approved_users: Vec<User>,
}

impl SettlementStatus {
    /// Service-side invariant: the count matches the approver list and never
    /// exceeds the member count.
    pub fn is_consistent(&self) -> bool {
        self.approved_count == self.approved_users.len() as i64
            && self.approved_count <= self.total_members
    }
}
