//! Expenses and the request body used to create them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single expense inside a group. Belongs to exactly one group; the payer
/// and participants are referenced by user id. Fields are camelCase on the
/// wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    #[serde(rename = "groupId")]
    pub group_id: i64,
    #[serde(rename = "paidBy")]
    pub paid_by: i64,
    pub amount: f64,
    pub description: String,
    /// Creation timestamp as emitted by the service, kept verbatim. The
    /// service emits a naive ISO-8601 string with no timezone.
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl Expense {
    /// Parse the creation timestamp for display purposes.
    pub fn created_at_parsed(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.created_at, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }
}

/// Request body for recording a new expense (camelCase on the wire).
/// `participant_ids` lists everyone the amount is split among.
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseRequest {
    #[serde(rename = "groupId")]
    pub group_id: i64,
    #[serde(rename = "paidBy")]
    pub paid_by: i64,
    pub amount: f64,
    pub description: String,
    #[serde(rename = "participantIds")]
    pub participant_ids: Vec<i64>,
}
