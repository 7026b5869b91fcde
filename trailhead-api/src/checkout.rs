use axum::{extract::State, Json};
use axum_extra::extract::WithRejection;
use trailhead_booking::{BookingRequest, CheckoutStarted};
use trailhead_shared::MaskedEmail;

use crate::error::{AppError, JsonBody};
use crate::state::AppState;

/// POST /api/checkout
/// Validates the booking, writes a pending reservation and opens a hosted
/// checkout session for it.
pub async fn create_checkout(
    State(state): State<AppState>,
    WithRejection(Json(request), _): JsonBody<BookingRequest>,
) -> Result<Json<CheckoutStarted>, AppError> {
    tracing::info!(
        tour_id = ?request.tour_id,
        shift_id = ?request.shift_id,
        date = ?request.date,
        email = %MaskedEmail(request.customer_email.as_deref().unwrap_or("")),
        "Checkout requested"
    );

    let started = state.checkout.start(&request).await?;

    Ok(Json(started))
}
