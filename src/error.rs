//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::store::StoreError;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Domain errors (4xx)
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Ledger store unavailable")]
    StoreUnavailable(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable label used for metrics and error codes
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Domain(e) => e.code(),
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Domain(DomainError::InsufficientFunds { .. }) => StatusCode::BAD_REQUEST,
            AppError::Domain(DomainError::AccountNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let details = match &self {
            AppError::Domain(DomainError::AccountNotFound(id)) => Some(id.to_string()),
            AppError::Domain(_) => None,
            AppError::StoreUnavailable(e) => {
                tracing::error!("Store error: {:?}", e);
                None
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                None
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: self.code().to_string(),
            details,
        };

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::from(DomainError::validation("bad")), StatusCode::BAD_REQUEST),
            (
                AppError::from(DomainError::insufficient_funds(dec!(150), dec!(100))),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(DomainError::AccountNotFound(Uuid::nil())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(StoreError::Timeout(Duration::from_secs(5))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (AppError::Internal("boom".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{}", err);
        }
    }

    #[test]
    fn test_store_detail_not_exposed() {
        let err = AppError::from(StoreError::Corrupt("row 42".to_string()));
        assert_eq!(err.code(), "store_unavailable");
        assert!(!err.to_string().contains("row 42"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
