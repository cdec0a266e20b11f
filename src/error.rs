use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ports::RepositoryError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Repository(e) => match e {
                RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
                RepositoryError::OrderExists(_)
                | RepositoryError::OrderOwnedByOther(_)
                | RepositoryError::WithdrawalExists(_) => StatusCode::CONFLICT,
                RepositoryError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
                RepositoryError::Corrupt(_) | RepositoryError::Database(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderNumber;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation(ValidationError::new("order", "failed the Luhn check"));
        assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::Repository(RepositoryError::NotFound("order 18".to_string()));
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_status_codes() {
        let number = OrderNumber::new_unchecked("18");
        for error in [
            RepositoryError::OrderExists(number.clone()),
            RepositoryError::OrderOwnedByOther(number.clone()),
            RepositoryError::WithdrawalExists(number),
        ] {
            assert_eq!(AppError::from(error).status_code(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn test_insufficient_funds_status_code() {
        let error = AppError::from(RepositoryError::InsufficientFunds);
        assert_eq!(error.status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::from(RepositoryError::Database(sqlx::Error::RowNotFound));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_bad_request_error_status_code() {
        let error = AppError::BadRequest("Bad request".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unauthorized_error_status_code() {
        let error = AppError::Unauthorized("missing user".to_string());
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_insufficient_funds_response() {
        let response = AppError::from(RepositoryError::InsufficientFunds).into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn test_corrupt_record_response() {
        let response =
            AppError::from(RepositoryError::Corrupt("balance of alice overflows".to_string()))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
