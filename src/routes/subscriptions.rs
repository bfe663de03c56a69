use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::{JsonBody, UserIdentity},
    models::subscription::{SubscriptionView, VerifyRequest, VerifyResponse},
};

/// POST /api/v1/subscriptions/verify
#[instrument(skip(state, request))]
pub async fn verify_subscription(
    State(state): State<AppState>,
    identity: UserIdentity,
    JsonBody(request): JsonBody<VerifyRequest>,
) -> Response {
    let debug_errors = state.config.application.debug_errors;

    match verify_inner(state, identity, request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response_with_debug(debug_errors),
    }
}

async fn verify_inner(
    state: AppState,
    identity: UserIdentity,
    request: VerifyRequest,
) -> Result<VerifyResponse> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(format!("Validation error: {}", e)))?;

    state
        .subscription_service
        .verify(
            identity.user_id,
            request.platform,
            &request.product_id,
            &request.receipt,
        )
        .await?;

    Ok(VerifyResponse { ok: true })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSubscriptionQuery {
    pub product_id: String,
}

/// GET /api/v1/subscriptions/me?productId=...
#[instrument(skip(state))]
pub async fn current_subscription(
    State(state): State<AppState>,
    identity: UserIdentity,
    Query(query): Query<CurrentSubscriptionQuery>,
) -> Response {
    let debug_errors = state.config.application.debug_errors;

    let result = async {
        let row = state
            .subscription_service
            .current_subscription(identity.user_id, &query.product_id)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!("no subscription for product {}", query.product_id))
            })?;

        let (subscription, plan) = row;
        Ok::<_, ApiError>(SubscriptionView {
            plan_code: plan.code,
            product_id: plan.product_id,
            status: subscription.status,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
        })
    }
    .await;

    match result {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response_with_debug(debug_errors),
    }
}
