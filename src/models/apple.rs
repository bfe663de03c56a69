//! Records for the App Store Server API subscription-statuses response and
//! the decoded inner JWS payloads.
//!
//! Apple evolves these shapes independently of us, so every field is
//! optional and unknown keys are ignored; absence never fails decoding.

use serde::Deserialize;

/// Top-level response of GET /inApps/v1/subscriptions/{transactionId}.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub app_apple_id: Option<i64>,
    #[serde(default)]
    pub data: Vec<SubscriptionGroup>,
}

/// One subscription group with its last transaction per subscription.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionGroup {
    #[serde(default)]
    pub sub_group_identifier: Option<String>,
    #[serde(default)]
    pub last_transactions: Vec<LastTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastTransaction {
    #[serde(default)]
    pub status: Option<i32>,
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    /// Compact JWS whose payload is a [`TransactionPayload`].
    #[serde(default)]
    pub signed_transaction_info: Option<String>,
    /// Compact JWS whose payload is a [`RenewalInfoPayload`].
    #[serde(default)]
    pub signed_renewal_info: Option<String>,
}

/// Decoded payload of signedTransactionInfo. Dates are millisecond epochs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<i64>,
    #[serde(default)]
    pub expires_date: Option<i64>,
}

/// Decoded payload of signedRenewalInfo.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalInfoPayload {
    #[serde(default)]
    pub grace_period_expires_date: Option<i64>,
    #[serde(default)]
    pub auto_renew_status: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerates_unknown_and_missing_fields() {
        let resp: StatusResponse = serde_json::from_str(
            r#"{"environment":"Production","someFutureField":{"x":1},"data":[{"lastTransactions":[{"status":1}]}]}"#,
        )
        .unwrap();
        assert_eq!(resp.environment.as_deref(), Some("Production"));
        assert_eq!(resp.data.len(), 1);
        assert!(resp.data[0].last_transactions[0]
            .signed_transaction_info
            .is_none());
    }

    #[test]
    fn empty_object_decodes() {
        let resp: StatusResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.data.is_empty());

        let txn: TransactionPayload = serde_json::from_str("{}").unwrap();
        assert!(txn.expires_date.is_none());
    }
}
