use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::time::Instant;

/// Middleware that logs request and response bodies.
///
/// Receipt material is never written to logs: the `receipt` field is
/// replaced by a sha256 fingerprint so correlating repeated submissions
/// stays possible without retaining the reference itself.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let (parts, body) = request.into_parts();

    // Read the request body (limit to 1MB to prevent memory issues)
    let bytes = match to_bytes(body, 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read request body: {}", e);
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    let request_body = redact_receipt(&String::from_utf8_lossy(&bytes));
    let truncated_request = truncate_body(&request_body, 2000);

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        body = %truncated_request,
        "→ Request"
    );

    // Reconstruct the request with the body
    let request = Request::from_parts(parts, Body::from(bytes));

    let response = next.run(request).await;

    let status = response.status();
    let (parts, body) = response.into_parts();

    let bytes = match to_bytes(body, 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read response body: {}", e);
            Bytes::new()
        }
    };

    let response_body = String::from_utf8_lossy(&bytes);
    let truncated_response = truncate_body(&response_body, 2000);
    let latency = start.elapsed();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        body = %truncated_response,
        "← Response"
    );

    Response::from_parts(parts, Body::from(bytes))
}

/// Replace a JSON `receipt` field with its sha256 fingerprint. Non-JSON
/// bodies pass through unchanged.
fn redact_receipt(body: &str) -> String {
    let Ok(mut value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };

    if let Some(receipt) = value.get("receipt").and_then(|v| v.as_str()) {
        let digest = Sha256::digest(receipt.as_bytes());
        value["receipt"] = serde_json::Value::String(format!("sha256:{:x}", digest));
        return value.to_string();
    }

    body.to_string()
}

/// Truncate body for logging, adding ellipsis if truncated. The cut is
/// walked back to a char boundary so multibyte UTF-8 never splits.
fn truncate_body(body: &str, max_len: usize) -> String {
    let body = body.trim();
    if body.len() <= max_len {
        body.to_string()
    } else {
        let mut end = max_len;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}...[truncated, {} bytes total]",
            &body[..end],
            body.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_field_is_fingerprinted() {
        let redacted = redact_receipt(r#"{"platform":"apple","receipt":"1000000123456789"}"#);
        assert!(!redacted.contains("1000000123456789"));
        assert!(redacted.contains("sha256:"));
        assert!(redacted.contains("apple"));
    }

    #[test]
    fn non_json_bodies_pass_through() {
        assert_eq!(redact_receipt("plain"), "plain");
    }

    #[test]
    fn truncation_respects_multibyte_boundaries() {
        // A euro sign straddling the cut point must not split.
        let mut body = "a".repeat(1999);
        body.push('€');
        body.push_str(&"b".repeat(100));

        let truncated = truncate_body(&body, 2000);
        assert!(truncated.starts_with(&"a".repeat(1999)));
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn short_bodies_are_untouched() {
        assert_eq!(truncate_body("  short  ", 2000), "short");
    }
}
