use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use trailhead_core::payment::{metadata_keys, IntentStatus, PaymentGateway, SessionPaymentStatus};
use trailhead_core::repository::{ConfirmOutcome, PaymentConfirmation, ReservationRepository};
use trailhead_core::Reservation;
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::signature::WebhookVerifier;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";
pub const CHARGE_FAILED: &str = "charge.failed";

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: Value,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Confirmation(ConfirmOutcome),
    /// The intent has not succeeded yet; nothing was written.
    PaymentNotSucceeded { booking_id: Uuid },
    PaymentFailed { booking_id: Uuid, recorded: bool },
    Ignored { event_type: String },
}

fn booking_id_from(object: &Value, source: &str) -> BookingResult<Uuid> {
    object
        .get("metadata")
        .and_then(|m| m.get(metadata_keys::BOOKING_ID))
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| BookingError::MissingMetadata(source.to_string()))
}

fn string_field(object: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(object, |value, key| value.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Confirms reservations from payment evidence. Both the webhook and the
/// success-page fallback end in the same guarded store write, so either may
/// run any number of times.
pub struct PaymentReconciler {
    reservations: Arc<dyn ReservationRepository>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: WebhookVerifier,
}

impl PaymentReconciler {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
    ) -> Self {
        Self {
            reservations,
            gateway,
            verifier,
        }
    }

    /// Verifies and dispatches one webhook delivery. An error means the
    /// delivery should be answered with a non-2xx status.
    pub async fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> BookingResult<WebhookOutcome> {
        let signature = signature.ok_or_else(|| BookingError::Signature("missing Stripe-Signature header".into()))?;
        self.verifier.verify(payload, signature).map_err(|e| {
            tracing::warn!("Rejected webhook: {}", e);
            e
        })?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| BookingError::validation("payload", e.to_string()))?;
        tracing::info!(event_id = %event.id, event_type = %event.kind, "Received payment webhook");

        match event.kind.as_str() {
            CHECKOUT_SESSION_COMPLETED => self.on_session_completed(&event.data.object).await,
            PAYMENT_INTENT_FAILED => self.on_payment_failed(&event.data.object, "payment intent").await,
            CHARGE_FAILED => self.on_payment_failed(&event.data.object, "charge").await,
            other => {
                tracing::debug!("Ignoring webhook event type {}", other);
                Ok(WebhookOutcome::Ignored {
                    event_type: other.to_string(),
                })
            }
        }
    }

    async fn on_session_completed(&self, session: &Value) -> BookingResult<WebhookOutcome> {
        let booking_id = booking_id_from(session, "checkout session")?;

        let Some(intent_id) = string_field(session, &["payment_intent"]) else {
            tracing::warn!(%booking_id, "Completed session carries no payment intent");
            return Ok(WebhookOutcome::PaymentNotSucceeded { booking_id });
        };

        // The event body is only a hint; the intent is the evidence.
        let intent = self
            .gateway
            .retrieve_payment_intent(&intent_id)
            .await
            .map_err(BookingError::provider)?;
        if intent.status != IntentStatus::Succeeded {
            tracing::info!(%booking_id, intent = %intent.id, status = ?intent.status, "Payment not succeeded yet");
            return Ok(WebhookOutcome::PaymentNotSucceeded { booking_id });
        }

        let confirmation = PaymentConfirmation {
            payment_intent_id: Some(intent.id),
            details: intent.charge.filter(|c| !c.is_empty()),
            customer_name: string_field(session, &["customer_details", "name"]),
            customer_email: string_field(session, &["customer_details", "email"]),
        };
        let outcome = self.confirm(booking_id, &confirmation).await?;
        Ok(WebhookOutcome::Confirmation(outcome))
    }

    async fn on_payment_failed(&self, object: &Value, source: &str) -> BookingResult<WebhookOutcome> {
        let booking_id = booking_id_from(object, source)?;
        let recorded = self
            .reservations
            .mark_payment_failed(booking_id)
            .await
            .map_err(BookingError::store)?;

        if recorded {
            tracing::warn!(%booking_id, "Payment failed");
        } else {
            tracing::info!(%booking_id, "Payment failure ignored; booking unknown or payment already settled");
        }
        Ok(WebhookOutcome::PaymentFailed { booking_id, recorded })
    }

    /// Success-page fallback for deployments where webhooks do not arrive.
    pub async fn reconcile_from_session(&self, reservation_id: Uuid, session_id: &str) -> BookingResult<Reservation> {
        let reservation = self
            .reservations
            .get_reservation(reservation_id)
            .await
            .map_err(BookingError::store)?
            .ok_or(BookingError::ReservationNotFound(reservation_id))?;

        if reservation.is_settled() {
            return Ok(reservation);
        }
        if reservation.payment_recorded() {
            tracing::debug!(
                booking_id = %reservation_id,
                status = ?reservation.booking_status,
                "Payment already recorded; awaiting manual resolution"
            );
            return Ok(reservation);
        }

        if let Some(stored) = &reservation.stripe_session_id {
            if stored != session_id {
                return Err(BookingError::validation("session_id", "does not belong to this booking"));
            }
        }

        let session = self
            .gateway
            .retrieve_checkout_session(session_id)
            .await
            .map_err(BookingError::provider)?;

        let owner = session.metadata.get(metadata_keys::BOOKING_ID).map(String::as_str);
        if owner != Some(reservation_id.to_string().as_str()) {
            tracing::warn!(booking_id = %reservation_id, session_id, "Session metadata names a different booking");
            return Err(BookingError::validation("session_id", "does not belong to this booking"));
        }

        if session.payment_status != SessionPaymentStatus::Paid {
            return Ok(reservation);
        }

        let customer = session.customer.unwrap_or_default();
        let confirmation = PaymentConfirmation {
            payment_intent_id: session.payment_intent_id,
            details: session
                .payment_intent
                .and_then(|intent| intent.charge)
                .filter(|c| !c.is_empty()),
            customer_name: customer.name.filter(|n| !n.is_empty()),
            customer_email: customer.email.filter(|e| !e.is_empty()),
        };

        match self.confirm(reservation_id, &confirmation).await? {
            ConfirmOutcome::Confirmed(r)
            | ConfirmOutcome::AlreadyConfirmed(r)
            | ConfirmOutcome::NotConfirmable(r)
            | ConfirmOutcome::SlotTaken { reservation: r, .. } => Ok(r),
            ConfirmOutcome::NotFound => Err(BookingError::ReservationNotFound(reservation_id)),
        }
    }

    async fn confirm(&self, booking_id: Uuid, confirmation: &PaymentConfirmation) -> BookingResult<ConfirmOutcome> {
        let outcome = self
            .reservations
            .confirm_payment(booking_id, confirmation)
            .await
            .map_err(BookingError::store)?;

        match &outcome {
            ConfirmOutcome::Confirmed(r) => {
                tracing::info!(%booking_id, date = %r.tour_date, "Booking confirmed");
            }
            ConfirmOutcome::AlreadyConfirmed(_) => {
                tracing::debug!(%booking_id, "Booking already confirmed");
            }
            ConfirmOutcome::SlotTaken { reservation, conflict } => {
                tracing::error!(
                    %booking_id,
                    date = %reservation.tour_date,
                    intent = ?reservation.stripe_payment_intent_id,
                    "Payment captured but slot was taken ({}); manual refund required",
                    conflict
                );
            }
            ConfirmOutcome::NotConfirmable(r) => {
                tracing::error!(
                    %booking_id,
                    status = %r.booking_status,
                    "Payment received for a booking that cannot be confirmed; manual refund required"
                );
            }
            ConfirmOutcome::NotFound => {
                tracing::warn!(%booking_id, "Payment evidence for unknown booking");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::signature_header;
    use crate::testing::{Fixture, WEBHOOK_SECRET};
    use chrono::NaiveDate;
    use serde_json::json;
    use trailhead_core::payment::{CustomerDetails, PaymentIntent};
    use trailhead_core::{BookingStatus, PaymentDetails, PaymentStatus};
    use trailhead_shared::Clock;

    fn visa() -> PaymentDetails {
        PaymentDetails {
            card_brand: Some("visa".into()),
            card_last4: Some("4242".into()),
            card_exp_month: Some(12),
            card_exp_year: Some(2030),
            receipt_url: Some("https://pay.stripe.com/receipts/1".into()),
        }
    }

    fn event(kind: &str, object: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({ "id": "evt_1", "type": kind, "data": { "object": object } })).unwrap()
    }

    fn sign(fx: &Fixture, payload: &[u8]) -> String {
        signature_header(WEBHOOK_SECRET, fx.clock.now().timestamp(), payload)
    }

    /// A pending booking with an open mock session that the customer has paid.
    async fn paid_booking(fx: &Fixture, date: NaiveDate) -> (Reservation, String, String) {
        let r = fx.pending_booking(date, &fx.morning).await;
        let redirect = fx.initiator().create_checkout_session(&r, &fx.tour).await.unwrap();
        let intent = fx.gateway.complete_session(&redirect.session_id, visa()).unwrap();
        (r, redirect.session_id, intent)
    }

    fn session_completed(r: &Reservation, session_id: &str, intent_id: &str) -> Vec<u8> {
        event(
            CHECKOUT_SESSION_COMPLETED,
            json!({
                "id": session_id,
                "payment_intent": intent_id,
                "payment_status": "paid",
                "metadata": { "booking_id": r.id.to_string() },
                "customer_details": { "name": "Jane Doe", "email": "jane@example.com" }
            }),
        )
    }

    #[tokio::test]
    async fn test_webhook_confirms_and_is_idempotent() {
        let fx = Fixture::new().await;
        let (r, session_id, intent_id) = paid_booking(&fx, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()).await;
        let payload = session_completed(&r, &session_id, &intent_id);
        let header = sign(&fx, &payload);
        let reconciler = fx.reconciler();

        let first = reconciler.handle_webhook(&payload, Some(&header)).await.unwrap();
        let WebhookOutcome::Confirmation(ConfirmOutcome::Confirmed(confirmed)) = first else {
            panic!("expected confirmation, got {:?}", first);
        };
        assert!(confirmed.is_settled());
        assert_eq!(confirmed.stripe_payment_intent_id.as_deref(), Some(intent_id.as_str()));
        assert_eq!(confirmed.payment_details, Some(visa()));

        let second = reconciler.handle_webhook(&payload, Some(&header)).await.unwrap();
        assert!(matches!(second, WebhookOutcome::Confirmation(ConfirmOutcome::AlreadyConfirmed(_))));

        let stored = fx.store.get_reservation(r.id).await.unwrap().unwrap();
        assert_eq!(stored, confirmed);
    }

    #[tokio::test]
    async fn test_invalid_signature_changes_nothing() {
        let fx = Fixture::new().await;
        let (r, session_id, intent_id) = paid_booking(&fx, NaiveDate::from_ymd_opt(2026, 7, 2).unwrap()).await;
        let payload = session_completed(&r, &session_id, &intent_id);
        let forged = signature_header("whsec_forged", fx.clock.now().timestamp(), &payload);
        let reconciler = fx.reconciler();
        let retrievals = fx.gateway.retrievals();

        for header in [Some(forged.as_str()), None] {
            let err = reconciler.handle_webhook(&payload, header).await.unwrap_err();
            assert!(matches!(err, BookingError::Signature(_)));
        }

        let stored = fx.store.get_reservation(r.id).await.unwrap().unwrap();
        assert_eq!(stored.booking_status, BookingStatus::Pending);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(fx.gateway.retrievals(), retrievals);
    }

    #[tokio::test]
    async fn test_unsucceeded_intent_is_not_confirmed() {
        let fx = Fixture::new().await;
        let r = fx.pending_booking(NaiveDate::from_ymd_opt(2026, 7, 3).unwrap(), &fx.morning).await;
        fx.gateway.insert_intent(PaymentIntent {
            id: "pi_processing".into(),
            status: IntentStatus::Processing,
            metadata: Default::default(),
            charge: None,
        });

        let payload = session_completed(&r, "cs_x", "pi_processing");
        let outcome = fx
            .reconciler()
            .handle_webhook(&payload, Some(&sign(&fx, &payload)))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::PaymentNotSucceeded { booking_id: r.id });
        let stored = fx.store.get_reservation(r.id).await.unwrap().unwrap();
        assert_eq!(stored.booking_status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_rejected() {
        let fx = Fixture::new().await;
        let payload = event(CHECKOUT_SESSION_COMPLETED, json!({ "id": "cs_1", "metadata": {} }));
        let err = fx
            .reconciler()
            .handle_webhook(&payload, Some(&sign(&fx, &payload)))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::MissingMetadata(_)));
    }

    #[tokio::test]
    async fn test_payment_failure_never_touches_booking_status() {
        let fx = Fixture::new().await;
        let r = fx.pending_booking(NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(), &fx.morning).await;
        let reconciler = fx.reconciler();

        let failed = event(PAYMENT_INTENT_FAILED, json!({ "id": "pi_1", "metadata": { "booking_id": r.id.to_string() } }));
        let outcome = reconciler.handle_webhook(&failed, Some(&sign(&fx, &failed))).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::PaymentFailed { booking_id: r.id, recorded: true });

        let stored = fx.store.get_reservation(r.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Failed);
        assert_eq!(stored.booking_status, BookingStatus::Pending);
        assert!(!stored.is_deleted);
    }

    #[tokio::test]
    async fn test_charge_failure_after_success_is_ignored() {
        let fx = Fixture::new().await;
        let r = fx.confirmed_booking(NaiveDate::from_ymd_opt(2026, 7, 5).unwrap(), &fx.morning).await;

        let failed = event(CHARGE_FAILED, json!({ "id": "ch_1", "metadata": { "booking_id": r.id.to_string() } }));
        let outcome = fx.reconciler().handle_webhook(&failed, Some(&sign(&fx, &failed))).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::PaymentFailed { booking_id: r.id, recorded: false });

        let stored = fx.store.get_reservation(r.id).await.unwrap().unwrap();
        assert!(stored.is_settled());
    }

    #[tokio::test]
    async fn test_other_events_are_acknowledged() {
        let fx = Fixture::new().await;
        let payload = event("customer.created", json!({ "id": "cus_1" }));
        let outcome = fx
            .reconciler()
            .handle_webhook(&payload, Some(&sign(&fx, &payload)))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored { event_type: "customer.created".into() });
    }

    #[tokio::test]
    async fn test_success_page_fallback_confirms_with_card_details() {
        let fx = Fixture::new().await;
        let (r, session_id, _) = paid_booking(&fx, NaiveDate::from_ymd_opt(2026, 7, 6).unwrap()).await;

        let confirmed = fx.reconciler().reconcile_from_session(r.id, &session_id).await.unwrap();
        assert_eq!(confirmed.booking_status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment_status, PaymentStatus::Succeeded);
        let details = confirmed.payment_details.unwrap();
        assert_eq!(details.card_brand.as_deref(), Some("visa"));
        assert_eq!(details.card_last4.as_deref(), Some("4242"));
    }

    #[tokio::test]
    async fn test_fallback_skips_gateway_once_settled() {
        let fx = Fixture::new().await;
        let (r, session_id, _) = paid_booking(&fx, NaiveDate::from_ymd_opt(2026, 7, 7).unwrap()).await;
        let reconciler = fx.reconciler();

        reconciler.reconcile_from_session(r.id, &session_id).await.unwrap();
        let after_first = fx.gateway.retrievals();
        let again = reconciler.reconcile_from_session(r.id, &session_id).await.unwrap();

        assert!(again.is_settled());
        assert_eq!(fx.gateway.retrievals(), after_first);
    }

    #[tokio::test]
    async fn test_fallback_and_webhook_converge() {
        let fx = Fixture::new().await;
        let (r, session_id, intent_id) = paid_booking(&fx, NaiveDate::from_ymd_opt(2026, 7, 8).unwrap()).await;
        let reconciler = fx.reconciler();
        let payload = session_completed(&r, &session_id, &intent_id);
        let header = sign(&fx, &payload);

        let (a, b) = tokio::join!(
            reconciler.reconcile_from_session(r.id, &session_id),
            reconciler.handle_webhook(&payload, Some(&header)),
        );
        a.unwrap();
        b.unwrap();

        let stored = fx.store.get_reservation(r.id).await.unwrap().unwrap();
        assert!(stored.is_settled());
        assert_eq!(stored.stripe_payment_intent_id.as_deref(), Some(intent_id.as_str()));
    }

    #[tokio::test]
    async fn test_fallback_unpaid_session_changes_nothing() {
        let fx = Fixture::new().await;
        let r = fx.pending_booking(NaiveDate::from_ymd_opt(2026, 7, 9).unwrap(), &fx.morning).await;
        let redirect = fx.initiator().create_checkout_session(&r, &fx.tour).await.unwrap();

        let unchanged = fx.reconciler().reconcile_from_session(r.id, &redirect.session_id).await.unwrap();
        assert_eq!(unchanged.booking_status, BookingStatus::Pending);
        assert_eq!(unchanged.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_fallback_rejects_foreign_session() {
        let fx = Fixture::new().await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 10).unwrap();
        let (mine, my_session, _) = paid_booking(&fx, date).await;
        let other = fx.pending_booking(date, &fx.afternoon).await;
        let reconciler = fx.reconciler();

        // Stored session id mismatch.
        let err = reconciler.reconcile_from_session(mine.id, "cs_someone_else").await.unwrap_err();
        assert!(matches!(err, BookingError::Validation { field: "session_id", .. }));

        // No stored session, but the session's metadata names another booking.
        let err = reconciler.reconcile_from_session(other.id, &my_session).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation { field: "session_id", .. }));

        let stored = fx.store.get_reservation(other.id).await.unwrap().unwrap();
        assert_eq!(stored.booking_status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_fallback_backfills_missing_customer() {
        let fx = Fixture::new().await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 11).unwrap();
        let mut r = fx.pending_booking(date, &fx.morning).await;
        r.id = Uuid::new_v4();
        r.customer_name = String::new();
        fx.store.insert_reservation(&r).await.unwrap();

        let redirect = fx.initiator().create_checkout_session(&r, &fx.tour).await.unwrap();
        fx.gateway.set_customer(
            &redirect.session_id,
            CustomerDetails {
                name: Some("Jane Doe".into()),
                email: Some("other@example.com".into()),
            },
        );
        fx.gateway.complete_session(&redirect.session_id, visa()).unwrap();

        let confirmed = fx.reconciler().reconcile_from_session(r.id, &redirect.session_id).await.unwrap();
        assert_eq!(confirmed.customer_name, "Jane Doe");
        assert_eq!(confirmed.customer_email, "jane@example.com");
    }

    #[tokio::test]
    async fn test_unknown_booking_is_not_found() {
        let fx = Fixture::new().await;
        let err = fx.reconciler().reconcile_from_session(Uuid::new_v4(), "cs_1").await.unwrap_err();
        assert!(matches!(err, BookingError::ReservationNotFound(_)));
    }

    #[tokio::test]
    async fn test_late_payment_on_taken_slot_keeps_booking_unconfirmed() {
        let fx = Fixture::new().await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 12).unwrap();
        let (r, session_id, intent_id) = paid_booking(&fx, date).await;
        fx.confirmed_booking(date, &fx.whole_day).await;

        let payload = session_completed(&r, &session_id, &intent_id);
        let outcome = fx
            .reconciler()
            .handle_webhook(&payload, Some(&sign(&fx, &payload)))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::Confirmation(ConfirmOutcome::SlotTaken { .. })
        ));

        let stored = fx.store.get_reservation(r.id).await.unwrap().unwrap();
        assert_eq!(stored.booking_status, BookingStatus::Pending);
        assert_eq!(stored.payment_status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_paid_booking_on_taken_slot_is_not_reconciled_again() {
        let fx = Fixture::new().await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 13).unwrap();
        let (r, session_id, _) = paid_booking(&fx, date).await;
        fx.confirmed_booking(date, &fx.whole_day).await;

        let first = fx.reconciler().reconcile_from_session(r.id, &session_id).await.unwrap();
        assert_eq!(first.booking_status, BookingStatus::Pending);
        assert_eq!(first.payment_status, PaymentStatus::Succeeded);
        let calls = fx.gateway.retrievals();

        for _ in 0..3 {
            let again = fx.reconciler().reconcile_from_session(r.id, &session_id).await.unwrap();
            assert_eq!(again.booking_status, BookingStatus::Pending);
        }
        assert_eq!(fx.gateway.retrievals(), calls);
    }
}
