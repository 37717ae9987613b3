//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orders::OrderError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Engine error.
    #[error(transparent)]
    Order(#[from] OrderError),
}

impl ApiError {
    /// Returns the HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Order(err) => match err {
                OrderError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                OrderError::UserNotFound(_)
                | OrderError::ProductNotFound(_)
                | OrderError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                OrderError::InsufficientStock { .. } | OrderError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                }
                OrderError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, OrderStatus, ProductId};
    use store::StoreError;

    use super::*;

    #[test]
    fn business_errors_map_to_client_statuses() {
        let shortage = ApiError::from(OrderError::InsufficientStock {
            product_id: ProductId::new(),
            requested: 2,
            available: 1,
        });
        assert_eq!(shortage.status(), StatusCode::CONFLICT);

        let shipped = ApiError::from(OrderError::InvalidTransition {
            order_id: OrderId::new(),
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled,
        });
        assert_eq!(shipped.status(), StatusCode::CONFLICT);

        let missing = ApiError::from(OrderError::OrderNotFound(OrderId::new()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid = ApiError::from(OrderError::InvalidRequest("items".into()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_errors_are_internal() {
        let err = ApiError::from(OrderError::Storage(StoreError::Unavailable(
            "connection refused".into(),
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
