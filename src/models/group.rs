//! Users and groups.
//!
//! These are the identity-bearing entities of the ledger: everything else
//! references them by id rather than embedding them.

use serde::{Deserialize, Serialize};

/// A participant in the expense ledger. Identity is `id`; immutable once
/// fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

/// Lifecycle state of a group. The transition to `Settled` happens on the
/// ledger service once every member has approved settlement; the client only
/// reflects it after a re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Active,
    Settled,
}

impl GroupStatus {
    /// Query-parameter form expected by the ledger service.
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Active => "active",
            GroupStatus::Settled => "settled",
        }
    }
}

/// A shared expense context with a fixed member set.
///
/// `status` is absent on freshly created groups - the create endpoint
/// responds without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GroupStatus>,
}
