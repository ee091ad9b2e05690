//! HTTP client for the ledger service REST API.
//!
//! This module provides the `LedgerClient` struct implementing
//! `LedgerGateway` over reqwest against the expense-tracker service.

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::models::{
    BalanceLine, Expense, ExpenseRequest, Group, GroupBalance, GroupStatus, SettlementStatus, User,
};

use super::{ApiError, ApiResult, LedgerGateway};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client for the ledger service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct LedgerClient {
    client: Client,
    base_url: String,
}

impl LedgerClient {
    /// Create a new client against the given base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Create a client from the resolved configuration.
    pub fn from_config(config: &Config) -> ApiResult<Self> {
        Self::new(config.api_base_url())
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> ApiResult<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, path_and_query: &str) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self.client.get(&url).send().await?;
        let response = Self::check_response(response).await?;

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            debug!(url = %url, error = %e, "Response body did not match expected shape");
            ApiError::Decode(e.to_string())
        })
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> ApiResult<T> {
        // Serialize explicitly so a bad body surfaces as an encoding error
        // rather than a generic request failure.
        let payload = serde_json::to_vec(body).map_err(|e| ApiError::Encode(e.to_string()))?;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            debug!(url = %url, error = %e, "Response body did not match expected shape");
            ApiError::Decode(e.to_string())
        })
    }

    /// POST where the response body is only a confirmation message.
    async fn post_and_discard(&self, path_and_query: &str) -> ApiResult<()> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self.client.post(&url).send().await?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.delete(&url).send().await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

impl LedgerGateway for LedgerClient {
    async fn list_groups(&self, user_id: i64, status: GroupStatus) -> ApiResult<Vec<Group>> {
        self.get(&format!("/groups?userId={}&status={}", user_id, status.as_str()))
            .await
    }

    async fn create_group(&self, name: &str, member_ids: &[i64]) -> ApiResult<Group> {
        let body = serde_json::json!({
            "name": name,
            "memberIds": member_ids,
        });
        self.post("/groups", &body).await
    }

    async fn list_group_members(&self, group_id: i64) -> ApiResult<Vec<User>> {
        self.get(&format!("/groups/{}/members", group_id)).await
    }

    async fn request_settle(&self, group_id: i64, user_id: i64) -> ApiResult<()> {
        self.post_and_discard(&format!(
            "/groups/{}/request-settle?userId={}",
            group_id, user_id
        ))
        .await
    }

    async fn get_settlement_status(&self, group_id: i64) -> ApiResult<SettlementStatus> {
        self.get(&format!("/groups/{}/settlement-status", group_id))
            .await
    }

    async fn list_expenses(&self, group_id: i64) -> ApiResult<Vec<Expense>> {
        self.get(&format!("/expenses?groupId={}", group_id)).await
    }

    async fn add_expense(&self, request: &ExpenseRequest) -> ApiResult<Expense> {
        self.post("/expenses", request).await
    }

    async fn delete_expense(&self, expense_id: i64) -> ApiResult<()> {
        self.delete(&format!("/expenses/{}", expense_id)).await
    }

    async fn get_group_balance(&self, group_id: i64, user_id: i64) -> ApiResult<GroupBalance> {
        self.get(&format!("/balances/group/{}?userId={}", group_id, user_id))
            .await
    }

    async fn get_user_balance(
        &self,
        user_id: i64,
        status: GroupStatus,
    ) -> ApiResult<Vec<BalanceLine>> {
        self.get(&format!(
            "/balances/user/{}?status={}",
            user_id,
            status.as_str()
        ))
        .await
    }

    async fn list_users(&self) -> ApiResult<Vec<User>> {
        self.get("/users").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_groups_response() {
        let json = r#"[
            {"id": 5, "name": "Ski Trip", "status": "active"},
            {"id": 7, "name": "Old Cabin Weekend", "status": "settled"}
        ]"#;
        let groups: Vec<Group> = serde_json::from_str(json).expect("Failed to parse groups");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].status, Some(GroupStatus::Active));
        assert_eq!(groups[1].status, Some(GroupStatus::Settled));
    }

    #[test]
    fn test_parse_expenses_response() {
        let json = r#"[
            {"id": 3, "groupId": 5, "paidBy": 2, "amount": 60.0,
             "description": "Dinner", "createdAt": "2025-09-29T19:12:00"},
            {"id": 2, "groupId": 5, "paidBy": 1, "amount": 100.0,
             "description": "Lift pass", "createdAt": "2025-09-28T09:00:00"}
        ]"#;
        let expenses: Vec<Expense> = serde_json::from_str(json).expect("Failed to parse expenses");
        // Service orders newest first
        assert_eq!(expenses[0].id, 3);
        assert_eq!(expenses[1].description, "Lift pass");
    }

    #[test]
    fn test_parse_user_balance_response() {
        let json = r#"[
            {"groupId": 5, "groupName": "Ski Trip", "counterparty": "Sam", "amount": 50.0}
        ]"#;
        let lines: Vec<BalanceLine> = serde_json::from_str(json).expect("Failed to parse lines");
        assert_eq!(lines[0].group_id, 5);
        assert_eq!(lines[0].amount, 50.0);
    }
}
