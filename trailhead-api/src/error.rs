use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::WithRejection;
use serde_json::json;
use trailhead_booking::BookingError;
use trailhead_core::repository::BoxError;

/// JSON body whose parse failures answer with the usual `{ "error": ... }` body.
pub type JsonBody<T> = WithRejection<Json<T>, AppError>;

/// Query string extractor with the same rejection handling as [`JsonBody`].
pub type QueryParams<T> = WithRejection<Query<T>, AppError>;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    /// Payment gateway or storage failure. The message is returned to the
    /// client for diagnostics.
    UpstreamError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UpstreamError(msg) => {
                tracing::error!("Upstream failure: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation { .. }
            | BookingError::Signature(_)
            | BookingError::MissingMetadata(_) => AppError::ValidationError(err.to_string()),
            BookingError::ShiftNotFound(_)
            | BookingError::TourNotFound(_)
            | BookingError::ReservationNotFound(_) => AppError::NotFoundError(err.to_string()),
            BookingError::Unavailable(conflict) => AppError::ConflictError(conflict.reason().to_string()),
            BookingError::PaymentProvider(_) | BookingError::Store(_) => AppError::UpstreamError(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<BoxError> for AppError {
    fn from(err: BoxError) -> Self {
        AppError::UpstreamError(format!("Storage error: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Anyhow(err)
    }
}
