use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use entity::sea_orm_active_enums::SubscriptionStatus;

use super::common::Platform;

/// Verify Subscription Request
///
/// For apple, `receipt` carries the original transaction id of the
/// subscription, not a raw receipt blob.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub platform: Platform,
    #[validate(length(min = 1, max = 200))]
    pub product_id: String,
    #[validate(length(min = 1, max = 100000))]
    pub receipt: String,
}

/// Verify Subscription Response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub ok: bool,
}

/// Persisted entitlement, as read back by clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub plan_code: String,
    pub product_id: String,
    pub status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub current_period_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub current_period_end: OffsetDateTime,
}
