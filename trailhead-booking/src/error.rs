use trailhead_core::repository::BoxError;
use trailhead_core::Conflict;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Shift not found: {0}")]
    ShiftNotFound(Uuid),

    #[error("Tour not found: {0}")]
    TourNotFound(Uuid),

    #[error("Booking not found: {0}")]
    ReservationNotFound(Uuid),

    #[error("{0}")]
    Unavailable(Conflict),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("Invalid webhook signature: {0}")]
    Signature(String),

    #[error("Missing booking metadata on {0}")]
    MissingMetadata(String),
}

impl BookingError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BookingError::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn store(err: BoxError) -> Self {
        BookingError::Store(err.to_string())
    }

    pub(crate) fn provider(err: BoxError) -> Self {
        BookingError::PaymentProvider(err.to_string())
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
