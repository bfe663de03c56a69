//! Verification pipeline: eligibility → plan lookup → status fetch →
//! transaction selection → reconciliation → upsert.

use std::sync::Arc;

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use entity::{plans, user_subscriptions};

use crate::{
    error::{ApiError, Result},
    models::{
        apple::{LastTransaction, RenewalInfoPayload, StatusResponse, TransactionPayload},
        common::Platform,
    },
    services::{
        app_store_client::AppStoreClient,
        eligibility::EligibilityGate,
        reconcile::{reconcile, ReconcileInput},
    },
    utils::jws::decode_jws_payload,
};

/// A candidate transaction with its decoded payloads.
#[derive(Debug, Clone)]
pub struct SelectedTransaction {
    pub transaction: TransactionPayload,
    pub renewal: Option<RenewalInfoPayload>,
}

pub struct SubscriptionService {
    db: DatabaseConnection,
    client: Arc<AppStoreClient>,
    eligibility: Arc<dyn EligibilityGate>,
}

impl SubscriptionService {
    pub fn new(
        db: DatabaseConnection,
        client: Arc<AppStoreClient>,
        eligibility: Arc<dyn EligibilityGate>,
    ) -> Self {
        Self {
            db,
            client,
            eligibility,
        }
    }

    /// Verify a client-submitted subscription reference and persist the
    /// reconciled entitlement. Nothing is written unless a transaction was
    /// selected and a status computed.
    #[instrument(skip(self, receipt))]
    pub async fn verify(
        &self,
        user_id: Uuid,
        platform: Platform,
        product_id: &str,
        receipt: &str,
    ) -> Result<user_subscriptions::Model> {
        if platform == Platform::Google {
            return Err(ApiError::Validation(
                "google receipt verification is not implemented".to_string(),
            ));
        }

        if !self.eligibility.is_eligible(user_id).await? {
            return Err(ApiError::Forbidden(format!(
                "user {} is not eligible for subscriptions",
                user_id
            )));
        }

        let plan = self.resolve_plan(product_id).await?;

        let fetch = self.client.fetch_subscription_statuses(receipt).await?;

        let response: StatusResponse =
            serde_json::from_value(fetch.payload.clone()).map_err(|e| {
                ApiError::MalformedResponse(format!("unexpected status response shape: {}", e))
            })?;

        let selected = select_transaction(&response, Some(product_id))?.ok_or_else(|| {
            ApiError::NotFound(format!(
                "no subscription transaction matches product {}",
                product_id
            ))
        })?;

        let now = OffsetDateTime::now_utc();
        let entitlement = reconcile(ReconcileInput {
            now_ms: (now.unix_timestamp_nanos() / 1_000_000) as i64,
            purchase_date_ms: selected.transaction.purchase_date,
            expires_date_ms: selected.transaction.expires_date,
            grace_expires_ms: selected
                .renewal
                .as_ref()
                .and_then(|r| r.grace_period_expires_date),
            trial_days: plan.trial_days,
        });

        info!(
            user_id = %user_id,
            plan = %plan.code,
            environment = fetch.environment.as_str(),
            fallback_reason = fetch.fallback_reason.map(|r| r.as_str()),
            status = entitlement.status.as_str(),
            "Verified subscription"
        );

        let model = self
            .upsert_subscription(user_id, plan.id, entitlement, fetch.payload, now)
            .await?;

        Ok(model)
    }

    /// Read back the persisted entitlement for a user and product.
    pub async fn current_subscription(
        &self,
        user_id: Uuid,
        product_id: &str,
    ) -> Result<Option<(user_subscriptions::Model, plans::Model)>> {
        let plan = self.resolve_plan(product_id).await?;

        let row = user_subscriptions::Entity::find()
            .filter(user_subscriptions::Column::UserId.eq(user_id))
            .filter(user_subscriptions::Column::PlanId.eq(plan.id))
            .one(&self.db)
            .await?;

        Ok(row.map(|r| (r, plan)))
    }

    /// Resolve a plan by store product id, falling back to the plan code.
    async fn resolve_plan(&self, product_id: &str) -> Result<plans::Model> {
        let by_product = plans::Entity::find()
            .filter(plans::Column::Active.eq(true))
            .filter(plans::Column::ProductId.eq(product_id))
            .one(&self.db)
            .await?;

        if let Some(plan) = by_product {
            return Ok(plan);
        }

        plans::Entity::find()
            .filter(plans::Column::Active.eq(true))
            .filter(plans::Column::Code.eq(product_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("unknown plan for product {}", product_id)))
    }

    /// Single atomic upsert keyed on (user_id, plan_id), last write wins.
    /// The storage layer's native conflict handling is the only guard
    /// against concurrent writers; the upstream store remains the durable
    /// source of truth and can always be re-queried.
    pub async fn upsert_subscription(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        entitlement: crate::services::reconcile::Entitlement,
        snapshot: serde_json::Value,
        now: OffsetDateTime,
    ) -> Result<user_subscriptions::Model> {
        let period_start = ms_to_datetime(entitlement.period_start_ms)?;
        let period_end = ms_to_datetime(entitlement.period_end_ms)?;

        let row = user_subscriptions::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            plan_id: Set(plan_id),
            status: Set(entitlement.status),
            current_period_start: Set(period_start),
            current_period_end: Set(period_end),
            last_receipt_snapshot: Set(Some(snapshot)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = user_subscriptions::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    user_subscriptions::Column::UserId,
                    user_subscriptions::Column::PlanId,
                ])
                .update_columns([
                    user_subscriptions::Column::Status,
                    user_subscriptions::Column::CurrentPeriodStart,
                    user_subscriptions::Column::CurrentPeriodEnd,
                    user_subscriptions::Column::LastReceiptSnapshot,
                    user_subscriptions::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_with_returning(&self.db)
            .await?;

        Ok(model)
    }
}

/// Pick the best-matching transaction: decode every candidate, skip ones
/// that miss the target product id, keep the strictly greatest
/// expiresDate (first seen wins ties). Absence is `None`, never an error;
/// malformed inner payloads do propagate.
pub fn select_transaction(
    response: &StatusResponse,
    target_product_id: Option<&str>,
) -> Result<Option<SelectedTransaction>> {
    let mut best: Option<SelectedTransaction> = None;

    for group in &response.data {
        for last in &group.last_transactions {
            let Some(candidate) = decode_candidate(last)? else {
                continue;
            };

            if let Some(target) = target_product_id {
                if candidate.transaction.product_id.as_deref() != Some(target) {
                    continue;
                }
            }

            let candidate_expiry = candidate.transaction.expires_date;
            let best_expiry = best.as_ref().and_then(|b| b.transaction.expires_date);

            let wins = match (candidate_expiry, best_expiry) {
                (Some(c), Some(b)) => c > b,
                // A dated candidate beats an undated holder; an undated
                // one only fills an empty slot.
                (Some(_), None) => true,
                (None, _) => best.is_none(),
            };
            if wins {
                best = Some(candidate);
            }
        }
    }

    Ok(best)
}

fn decode_candidate(last: &LastTransaction) -> Result<Option<SelectedTransaction>> {
    let Some(signed_transaction) = last.signed_transaction_info.as_deref() else {
        return Ok(None);
    };

    let transaction: TransactionPayload =
        serde_json::from_value(decode_jws_payload(signed_transaction).map_err(malformed)?)
            .map_err(|e| {
                ApiError::MalformedResponse(format!("unexpected transaction payload: {}", e))
            })?;

    let renewal = match last.signed_renewal_info.as_deref() {
        Some(signed_renewal) => {
            match decode_jws_payload(signed_renewal) {
                Ok(value) => serde_json::from_value(value).ok(),
                Err(e) => {
                    // Renewal info is auxiliary (grace period only); a
                    // broken one degrades rather than failing the call.
                    warn!("Ignoring undecodable renewal info: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    Ok(Some(SelectedTransaction {
        transaction,
        renewal,
    }))
}

fn malformed(e: crate::utils::jws::JwsError) -> ApiError {
    ApiError::MalformedResponse(e.to_string())
}

fn ms_to_datetime(ms: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|e| ApiError::MalformedResponse(format!("timestamp out of range: {}", e)))
}
