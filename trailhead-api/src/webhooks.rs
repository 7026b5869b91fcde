use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use trailhead_booking::WebhookOutcome;
use trailhead_core::repository::ConfirmOutcome;

use crate::error::AppError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /api/webhooks/stripe
/// The raw body is needed for signature verification, so it is taken as
/// bytes and parsed only after the signature checks out.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok());

    let outcome = state.reconciler.handle_webhook(&body, signature).await?;

    match &outcome {
        WebhookOutcome::Confirmation(ConfirmOutcome::Confirmed(reservation)) => {
            tracing::info!(booking_id = %reservation.id, "Booking confirmed via webhook");
        }
        WebhookOutcome::Ignored { event_type } => {
            tracing::debug!("Ignoring webhook event {}", event_type);
        }
        other => tracing::debug!(outcome = ?other, "Webhook processed"),
    }

    Ok(Json(json!({ "received": true })))
}
