//! App Store Server API client with production→sandbox fallback.
//!
//! Apple publishes no formal contract for telling "this receipt belongs
//! to the other environment" apart from ordinary failures, so the
//! fallback decision is a prioritized list of independently testable
//! signal checks over the first response. Best effort; revisit if Apple
//! changes its error shapes.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{ApiError, Result},
    services::token_signer::TokenSigner,
};

const PRODUCTION_BASE: &str = "https://api.storekit.itunes.apple.com";
const SANDBOX_BASE: &str = "https://api.storekit-sandbox.itunes.apple.com";

/// Classic verifyReceipt code for "sandbox receipt sent to production";
/// still observed from the status endpoint for some accounts.
const SANDBOX_RECEIPT_CODE: i64 = 21007;

/// Cap on upstream body excerpts carried inside error detail.
const BODY_EXCERPT_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Sandbox,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Sandbox => "sandbox",
        }
    }
}

/// Which signal triggered the sandbox retry, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    SandboxReceiptCode,
    EnvironmentField,
    ProductionNotFound,
    SandboxFlavoredError,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SandboxReceiptCode => "sandbox_receipt_code",
            Self::EnvironmentField => "environment_field",
            Self::ProductionNotFound => "production_not_found",
            Self::SandboxFlavoredError => "sandbox_flavored_error",
        }
    }
}

/// Outcome of a status fetch: the decoded body plus where it came from.
#[derive(Debug)]
pub struct StatusFetch {
    pub payload: serde_json::Value,
    pub environment: Environment,
    pub fallback_reason: Option<FallbackReason>,
}

struct Attempt {
    status: u16,
    body: String,
    json: Option<serde_json::Value>,
}

pub struct AppStoreClient {
    http_client: reqwest::Client,
    signer: Arc<TokenSigner>,
    production_base: String,
    sandbox_base: String,
}

impl AppStoreClient {
    pub fn new(signer: Arc<TokenSigner>, request_timeout_ms: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms))
            .build()
            .map_err(|e| ApiError::Configuration(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http_client,
            signer,
            production_base: PRODUCTION_BASE.to_string(),
            sandbox_base: SANDBOX_BASE.to_string(),
        })
    }

    /// Point both environments at explicit base URLs (test servers).
    pub fn with_base_urls(mut self, production: &str, sandbox: &str) -> Self {
        self.production_base = production.trim_end_matches('/').to_string();
        self.sandbox_base = sandbox.trim_end_matches('/').to_string();
        self
    }

    /// Fetch subscription statuses for an original transaction id.
    ///
    /// Production is queried first. A sandbox signal in that response
    /// triggers one identical retry against sandbox; 401/403 is a hard
    /// credential failure and is never retried.
    #[tracing::instrument(skip(self, transaction_ref))]
    pub async fn fetch_subscription_statuses(&self, transaction_ref: &str) -> Result<StatusFetch> {
        let token = self.signer.bearer_token()?;

        let production = self
            .attempt(&self.production_base, transaction_ref, &token)
            .await?;

        if production.status == 401 || production.status == 403 {
            return Err(ApiError::Unauthorized(format!(
                "App Store rejected the API credentials (HTTP {})",
                production.status
            )));
        }

        let reason = sandbox_signal(&production);

        if let Some(reason) = reason {
            tracing::info!(reason = reason.as_str(), "Retrying against sandbox");

            let sandbox = self
                .attempt(&self.sandbox_base, transaction_ref, &token)
                .await?;

            return match (sandbox.status, sandbox.json) {
                (200..=299, Some(payload)) => Ok(StatusFetch {
                    payload,
                    environment: Environment::Sandbox,
                    fallback_reason: Some(reason),
                }),
                (200..=299, None) => Err(ApiError::MalformedResponse(format!(
                    "sandbox returned non-JSON body: {}",
                    excerpt(&sandbox.body)
                ))),
                _ => Err(ApiError::Upstream(format!(
                    "both environments failed: production HTTP {} ({}), sandbox HTTP {} ({})",
                    production.status,
                    excerpt(&production.body),
                    sandbox.status,
                    excerpt(&sandbox.body)
                ))),
            };
        }

        match (production.status, production.json) {
            (200..=299, Some(payload)) => Ok(StatusFetch {
                payload,
                environment: Environment::Production,
                fallback_reason: None,
            }),
            (200..=299, None) => Err(ApiError::MalformedResponse(format!(
                "production returned non-JSON body: {}",
                excerpt(&production.body)
            ))),
            _ => Err(ApiError::Upstream(format!(
                "production failed with HTTP {} and no sandbox signal: {}",
                production.status,
                excerpt(&production.body)
            ))),
        }
    }

    async fn attempt(&self, base: &str, transaction_ref: &str, token: &str) -> Result<Attempt> {
        let url = format!("{}/inApps/v1/subscriptions/{}", base, transaction_ref);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Upstream("App Store request timed out".to_string())
                } else {
                    ApiError::Upstream(format!("App Store request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Upstream(format!("Failed to read App Store response: {}", e)))?;
        let json = serde_json::from_str(&body).ok();

        Ok(Attempt { status, body, json })
    }
}

/// Evaluate the sandbox signals in priority order against the first
/// response. Returns the first signal that fires, or None.
fn sandbox_signal(attempt: &Attempt) -> Option<FallbackReason> {
    if has_sandbox_receipt_code(attempt) {
        return Some(FallbackReason::SandboxReceiptCode);
    }
    if has_sandbox_environment_field(attempt) {
        return Some(FallbackReason::EnvironmentField);
    }
    if attempt.status == 404 {
        return Some(FallbackReason::ProductionNotFound);
    }
    if has_sandbox_flavored_error(attempt) {
        return Some(FallbackReason::SandboxFlavoredError);
    }
    None
}

/// Signal 1: the numeric code 21007 anywhere in the body.
fn has_sandbox_receipt_code(attempt: &Attempt) -> bool {
    match &attempt.json {
        Some(json) => json_contains_number(json, SANDBOX_RECEIPT_CODE),
        None => attempt.body.contains("21007"),
    }
}

/// Signal 2: any "environment" field whose value mentions sandbox,
/// case-insensitive, at any nesting depth.
fn has_sandbox_environment_field(attempt: &Attempt) -> bool {
    fn walk(value: &serde_json::Value) -> bool {
        match value {
            serde_json::Value::Object(map) => map.iter().any(|(key, val)| {
                if key.eq_ignore_ascii_case("environment") {
                    if let Some(s) = val.as_str() {
                        if s.to_ascii_lowercase().contains("sandbox") {
                            return true;
                        }
                    }
                }
                walk(val)
            }),
            serde_json::Value::Array(items) => items.iter().any(walk),
            _ => false,
        }
    }

    attempt.json.as_ref().is_some_and(walk)
}

/// Signal 4: HTTP 400/409 whose errorCode/errorMessage mentions sandbox.
fn has_sandbox_flavored_error(attempt: &Attempt) -> bool {
    if attempt.status != 400 && attempt.status != 409 {
        return false;
    }
    let Some(json) = &attempt.json else {
        return attempt.body.to_ascii_lowercase().contains("sandbox");
    };

    ["errorCode", "errorMessage"].iter().any(|field| {
        json.get(*field)
            .map(|v| v.to_string().to_ascii_lowercase().contains("sandbox"))
            .unwrap_or(false)
    })
}

fn json_contains_number(value: &serde_json::Value, needle: i64) -> bool {
    match value {
        serde_json::Value::Number(n) => n.as_i64() == Some(needle),
        serde_json::Value::Object(map) => map.values().any(|v| json_contains_number(v, needle)),
        serde_json::Value::Array(items) => items.iter().any(|v| json_contains_number(v, needle)),
        _ => false,
    }
}

fn excerpt(body: &str) -> &str {
    if body.len() <= BODY_EXCERPT_LEN {
        return body;
    }
    let mut end = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(status: u16, body: &str) -> Attempt {
        Attempt {
            status,
            body: body.to_string(),
            json: serde_json::from_str(body).ok(),
        }
    }

    #[test]
    fn receipt_code_21007_fires_first() {
        let a = attempt(400, r#"{"status":21007,"environment":"Sandbox"}"#);
        assert_eq!(
            sandbox_signal(&a),
            Some(FallbackReason::SandboxReceiptCode)
        );
    }

    #[test]
    fn nested_environment_field_fires() {
        let a = attempt(
            200,
            r#"{"data":[{"inner":{"environment":"SANDBOX"}}]}"#,
        );
        assert_eq!(sandbox_signal(&a), Some(FallbackReason::EnvironmentField));
    }

    #[test]
    fn environment_field_is_case_insensitive() {
        let a = attempt(409, r#"{"Environment":"the sandbox tier"}"#);
        assert_eq!(sandbox_signal(&a), Some(FallbackReason::EnvironmentField));
    }

    #[test]
    fn http_404_fires() {
        let a = attempt(404, "");
        assert_eq!(sandbox_signal(&a), Some(FallbackReason::ProductionNotFound));
    }

    #[test]
    fn sandbox_flavored_400_fires() {
        let a = attempt(
            400,
            r#"{"errorCode":4040010,"errorMessage":"Transaction id belongs to the sandbox environment."}"#,
        );
        assert_eq!(
            sandbox_signal(&a),
            Some(FallbackReason::SandboxFlavoredError)
        );
    }

    #[test]
    fn plain_production_success_has_no_signal() {
        let a = attempt(200, r#"{"environment":"Production","data":[]}"#);
        assert_eq!(sandbox_signal(&a), None);
    }

    #[test]
    fn unrelated_500_has_no_signal() {
        let a = attempt(500, r#"{"errorMessage":"internal"}"#);
        assert_eq!(sandbox_signal(&a), None);
    }

    #[test]
    fn code_21007_in_non_json_body_fires() {
        let a = attempt(400, "error 21007");
        assert_eq!(
            sandbox_signal(&a),
            Some(FallbackReason::SandboxReceiptCode)
        );
    }
}
