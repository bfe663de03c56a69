use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON body extractor that keeps deserialization failures inside the
/// API error envelope instead of axum's default plain-text rejection.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(map_rejection(rejection)),
        }
    }
}

fn map_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::Validation(format!("Invalid request body: {}", rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subscription::VerifyRequest;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::IntoResponse,
    };

    fn json_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn missing_fields_map_to_validation_error() {
        let req = json_request(r#"{"platform":"apple"}"#);

        let err = JsonBody::<VerifyRequest>::from_request(req, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::Validation(_)));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unknown_platform_maps_to_validation_error() {
        let req = json_request(r#"{"platform":"amazon","productId":"p","receipt":"r"}"#);

        let err = JsonBody::<VerifyRequest>::from_request(req, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn well_formed_bodies_deserialize() {
        let req = json_request(r#"{"platform":"apple","productId":"com.app.monthly","receipt":"abc"}"#);

        let JsonBody(parsed) = JsonBody::<VerifyRequest>::from_request(req, &())
            .await
            .unwrap();
        assert_eq!(parsed.product_id, "com.app.monthly");
    }
}
