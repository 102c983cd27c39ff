//! API error type shared by the HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use bazaar_core::order::OrderError;

use crate::db::StoreError;
use crate::payments::PaymentError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient stock: {0}")]
    OutOfStock(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("payment gateway error: {0}")]
    Payment(#[from] PaymentError),

    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ProductNotFound(_) => ApiError::NotFound("product"),
            StoreError::BookingNotFound(_) => ApiError::NotFound("booking"),
            StoreError::InsufficientStock(detail) => ApiError::OutOfStock(detail),
            other => ApiError::Store(other),
        }
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::OutOfStock(_) => (StatusCode::CONFLICT, "insufficient_stock"),
            ApiError::Order(_) => (StatusCode::BAD_REQUEST, "invalid_order"),
            ApiError::Payment(_) => (StatusCode::BAD_GATEWAY, "payment_gateway_error"),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let message = match &self {
            // Internal and processor detail stays out of responses.
            ApiError::Store(_) => "internal storage error".to_string(),
            ApiError::Payment(_) => "payment processing error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_api_semantics() {
        let err: ApiError = StoreError::InsufficientStock("widget".into()).into();
        assert!(matches!(err, ApiError::OutOfStock(_)));
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);
    }

    #[test]
    fn database_errors_do_not_leak_detail() {
        let err = ApiError::Store(StoreError::Duplicate("tenants.name"));
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "storage_error");
    }
}
