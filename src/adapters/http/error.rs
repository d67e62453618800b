use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use tracing::warn;

use crate::application::dto::ErrorResponse;
use crate::domain::errors::DomainError;

/// Error de la API: banner genérico más el texto de la causa.
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::ModelLoad { .. } | DomainError::OperationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let error = match &self.0 {
            DomainError::InvalidInput(msg) => msg.clone(),
            DomainError::Decode(_) => "Error occurred while opening the image.".to_string(),
            other => other.to_string(),
        };
        warn!("API {}: {}", status, self.0);
        (status, Json(ErrorResponse { error, detail: self.0.detail() })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
