// Mapping of core errors onto HTTP responses
use crate::application::provider_registry::ProviderError;
use crate::application::schema_store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(e) => match e {
                StoreError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                StoreError::Conflict { .. } | StoreError::CodeImmutable { .. } => {
                    StatusCode::CONFLICT
                }
                StoreError::Invalid(_) | StoreError::UnsupportedId(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::Provider(e) => match e {
                ProviderError::UnknownBinding(_) => StatusCode::NOT_FOUND,
                ProviderError::Failed(_) => StatusCode::SERVICE_UNAVAILABLE,
                ProviderError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dashboard::SchemaError;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::NotFound("dashboard `x`".into()), StatusCode::NOT_FOUND),
            (
                StoreError::StorageUnavailable("down".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                StoreError::Conflict { code: "a".into(), existing_id: "1".into() }.into(),
                StatusCode::CONFLICT,
            ),
            (StoreError::Invalid(SchemaError::EmptyCode).into(), StatusCode::BAD_REQUEST),
            (ProviderError::UnknownBinding("cpu".into()).into(), StatusCode::NOT_FOUND),
            (ProviderError::Failed("boom".into()).into(), StatusCode::SERVICE_UNAVAILABLE),
            (
                ProviderError::Timeout(Duration::from_secs(1)).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{}", error);
        }
    }
}
