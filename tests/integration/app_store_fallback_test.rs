use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use time::OffsetDateTime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use entity::sea_orm_active_enums::SubscriptionStatus;
use substation::error::ApiError;
use substation::models::apple::StatusResponse;
use substation::services::app_store_client::{AppStoreClient, Environment, FallbackReason};
use substation::services::reconcile::{reconcile, ReconcileInput};
use substation::services::subscription_service::select_transaction;

use crate::test_signer;

const TX_REF: &str = "1000000123456789";

fn client(production: &MockServer, sandbox: &MockServer) -> AppStoreClient {
    AppStoreClient::new(test_signer(), 5_000)
        .unwrap()
        .with_base_urls(&production.uri(), &sandbox.uri())
}

fn inner_jws(json: &str) -> String {
    format!("hdr.{}.sig", URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

/// A sandbox status body with one active transaction for the product.
fn sandbox_status_body(product_id: &str, now_ms: i64) -> serde_json::Value {
    let transaction = inner_jws(&format!(
        r#"{{"productId":"{}","purchaseDate":{},"expiresDate":{}}}"#,
        product_id,
        now_ms - 1_000,
        now_ms + 3_600_000
    ));
    serde_json::json!({
        "environment": "Sandbox",
        "bundleId": "com.example.app",
        "data": [{
            "subGroupIdentifier": "2070XXXX",
            "lastTransactions": [{
                "status": 1,
                "originalTransactionId": TX_REF,
                "signedTransactionInfo": transaction,
            }]
        }]
    })
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[tokio::test]
async fn production_404_falls_back_to_sandbox() {
    let production = MockServer::start().await;
    let sandbox = MockServer::start().await;
    let now = now_ms();

    Mock::given(method("GET"))
        .and(path(format!("/inApps/v1/subscriptions/{}", TX_REF)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&production)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/inApps/v1/subscriptions/{}", TX_REF)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(sandbox_status_body("com.example.pro", now)),
        )
        .expect(1)
        .mount(&sandbox)
        .await;

    let fetch = client(&production, &sandbox)
        .fetch_subscription_statuses(TX_REF)
        .await
        .unwrap();

    assert_eq!(fetch.environment, Environment::Sandbox);
    assert_eq!(
        fetch.fallback_reason,
        Some(FallbackReason::ProductionNotFound)
    );

    // The sandbox payload reconciles to an active entitlement.
    let response: StatusResponse = serde_json::from_value(fetch.payload).unwrap();
    let selected = select_transaction(&response, Some("com.example.pro"))
        .unwrap()
        .unwrap();
    let entitlement = reconcile(ReconcileInput {
        now_ms: now,
        purchase_date_ms: selected.transaction.purchase_date,
        expires_date_ms: selected.transaction.expires_date,
        grace_expires_ms: None,
        trial_days: 0,
    });
    assert_eq!(entitlement.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn production_success_is_used_without_fallback() {
    let production = MockServer::start().await;
    let sandbox = MockServer::start().await;
    let now = now_ms();

    let mut body = sandbox_status_body("com.example.pro", now);
    body["environment"] = serde_json::json!("Production");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&production)
        .await;

    // Sandbox must never be contacted.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&sandbox)
        .await;

    let fetch = client(&production, &sandbox)
        .fetch_subscription_statuses(TX_REF)
        .await
        .unwrap();

    assert_eq!(fetch.environment, Environment::Production);
    assert!(fetch.fallback_reason.is_none());
}

#[tokio::test]
async fn credential_rejection_is_never_retried() {
    let production = MockServer::start().await;
    let sandbox = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&production)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&sandbox)
        .await;

    let err = client(&production, &sandbox)
        .fetch_subscription_statuses(TX_REF)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized(_)));
}

#[tokio::test]
async fn sandbox_flavored_400_triggers_fallback() {
    let production = MockServer::start().await;
    let sandbox = MockServer::start().await;
    let now = now_ms();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "errorCode": 4040010,
            "errorMessage": "Transaction id belongs to the sandbox environment."
        })))
        .mount(&production)
        .await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(sandbox_status_body("com.example.pro", now)),
        )
        .mount(&sandbox)
        .await;

    let fetch = client(&production, &sandbox)
        .fetch_subscription_statuses(TX_REF)
        .await
        .unwrap();

    assert_eq!(fetch.environment, Environment::Sandbox);
    assert_eq!(
        fetch.fallback_reason,
        Some(FallbackReason::SandboxFlavoredError)
    );
}

#[tokio::test]
async fn both_environments_failing_is_an_upstream_error() {
    let production = MockServer::start().await;
    let sandbox = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&production)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("sandbox down"))
        .mount(&sandbox)
        .await;

    let err = client(&production, &sandbox)
        .fetch_subscription_statuses(TX_REF)
        .await
        .unwrap_err();

    match err {
        ApiError::Upstream(detail) => {
            assert!(detail.contains("404"));
            assert!(detail.contains("500"));
        }
        other => panic!("expected Upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn requests_carry_a_signed_bearer_token() {
    let production = MockServer::start().await;
    let sandbox = MockServer::start().await;
    let now = now_ms();

    Mock::given(method("GET"))
        .and(wiremock::matchers::header_exists("authorization"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(sandbox_status_body("com.example.pro", now)),
        )
        .expect(1)
        .mount(&production)
        .await;

    client(&production, &sandbox)
        .fetch_subscription_statuses(TX_REF)
        .await
        .unwrap();
}
