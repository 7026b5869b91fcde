use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use trailhead_core::payment::{metadata_keys, CheckoutSessionRequest, LineItem, PaymentGateway};
use trailhead_core::repository::ReservationRepository;
use trailhead_core::{Reservation, Tour};
use uuid::Uuid;

use crate::availability::AvailabilityChecker;
use crate::error::{BookingError, BookingResult};
use crate::writer::{BookingRequest, ReservationWriter};

/// Placeholder Stripe substitutes with the real session id on redirect.
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutRedirect {
    pub redirect_url: String,
    pub session_id: String,
}

/// Creates hosted checkout sessions for pending reservations.
pub struct PaymentSessionInitiator {
    gateway: Arc<dyn PaymentGateway>,
    reservations: Arc<dyn ReservationRepository>,
    public_url: String,
    currency: String,
}

impl PaymentSessionInitiator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        reservations: Arc<dyn ReservationRepository>,
        public_url: &str,
        currency: &str,
    ) -> Self {
        Self {
            gateway,
            reservations,
            public_url: public_url.trim_end_matches('/').to_string(),
            currency: currency.to_lowercase(),
        }
    }

    pub fn session_request(&self, reservation: &Reservation, tour: &Tour) -> CheckoutSessionRequest {
        let mut line_items = vec![LineItem {
            name: tour.title.clone(),
            unit_amount_cents: tour.base_price_cents,
            quantity: 1,
        }];
        line_items.extend(reservation.addons.iter().map(|addon| LineItem {
            name: addon.name.clone(),
            unit_amount_cents: addon.price_cents,
            quantity: reservation.guest_number,
        }));

        let metadata = BTreeMap::from([
            (metadata_keys::BOOKING_ID.to_string(), reservation.id.to_string()),
            (metadata_keys::TOUR_ID.to_string(), reservation.tour_id.to_string()),
            (metadata_keys::SHIFT_ID.to_string(), reservation.shift_id.to_string()),
            (metadata_keys::TOUR_DATE.to_string(), reservation.tour_date.to_string()),
            (metadata_keys::GUEST_NUMBER.to_string(), reservation.guest_number.to_string()),
        ]);

        CheckoutSessionRequest {
            currency: self.currency.clone(),
            line_items,
            metadata,
            success_url: format!(
                "{}/booking/success?booking_id={}&tour_id={}&session_id={}",
                self.public_url, reservation.id, reservation.tour_id, SESSION_ID_PLACEHOLDER
            ),
            cancel_url: format!(
                "{}/tours/{}?booking_id={}&cancelled=true",
                self.public_url, reservation.tour_id, reservation.id
            ),
            customer_email: Some(reservation.customer_email.clone()),
        }
    }

    /// Requests the session and links it to the reservation before handing
    /// back the redirect.
    pub async fn create_checkout_session(
        &self,
        reservation: &Reservation,
        tour: &Tour,
    ) -> BookingResult<CheckoutRedirect> {
        let request = self.session_request(reservation, tour);
        let session = self
            .gateway
            .create_checkout_session(&request)
            .await
            .map_err(|e| {
                tracing::error!(booking_id = %reservation.id, "Checkout session creation failed: {}", e);
                BookingError::provider(e)
            })?;

        let redirect_url = session.url.clone().ok_or_else(|| {
            BookingError::PaymentProvider(format!("Checkout session {} has no payment page URL", session.id))
        })?;

        let attached = self
            .reservations
            .attach_checkout_session(reservation.id, &session.id)
            .await
            .map_err(BookingError::store)?;
        if !attached {
            return Err(BookingError::ReservationNotFound(reservation.id));
        }

        tracing::info!(booking_id = %reservation.id, session_id = %session.id, "Checkout session attached");
        Ok(CheckoutRedirect {
            redirect_url,
            session_id: session.id,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutStarted {
    pub url: String,
    pub booking_id: Uuid,
    pub session_id: String,
}

/// Validate, check availability, write the pending row, then open the
/// payment session.
pub struct CheckoutFlow {
    checker: Arc<AvailabilityChecker>,
    writer: Arc<ReservationWriter>,
    initiator: Arc<PaymentSessionInitiator>,
}

impl CheckoutFlow {
    pub fn new(
        checker: Arc<AvailabilityChecker>,
        writer: Arc<ReservationWriter>,
        initiator: Arc<PaymentSessionInitiator>,
    ) -> Self {
        Self { checker, writer, initiator }
    }

    pub async fn start(&self, request: &BookingRequest) -> BookingResult<CheckoutStarted> {
        let booking = self.writer.validate(request)?;

        let shift = self.checker.active_shift(booking.shift_id).await?;
        let availability = self.checker.check_shift(booking.date, &shift).await?;
        if let Some(conflict) = availability.conflict {
            return Err(BookingError::Unavailable(conflict));
        }

        // No compensation if the session call fails: the row stays pending
        // until the expiry sweeper collects it.
        let created = self.writer.write(&booking).await?;
        let redirect = self
            .initiator
            .create_checkout_session(&created.reservation, &created.tour)
            .await?;

        Ok(CheckoutStarted {
            url: redirect.redirect_url,
            booking_id: created.reservation.id,
            session_id: redirect.session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use chrono::NaiveDate;
    use serde_json::json;
    use trailhead_core::{BookingStatus, Conflict};

    fn request(fx: &Fixture, shift_id: Uuid, date: &str) -> BookingRequest {
        serde_json::from_value(json!({
            "tour_id": fx.tour.id.to_string(),
            "shift_id": shift_id.to_string(),
            "date": date,
            "guest_number": 2,
            "customer_name": "Jane Doe",
            "customer_email": "jane@example.com",
            "addons": [{ "name": "Lobster Roll", "price": 18 }, { "name": "", "price": 3 }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_checkout_creates_session_with_items_and_metadata() {
        let fx = Fixture::new().await;
        let started = fx.flow().start(&request(&fx, fx.morning.id, "2026-06-10")).await.unwrap();

        let sent = fx.gateway.requests();
        assert_eq!(sent.len(), 1);
        let req = &sent[0];
        assert_eq!(req.amount_total_cents(), 13_600);
        assert_eq!(req.line_items[0].name, fx.tour.title);
        assert_eq!(req.line_items[1].quantity, 2);
        assert_eq!(req.customer_email.as_deref(), Some("jane@example.com"));
        assert_eq!(
            req.metadata.get(metadata_keys::BOOKING_ID),
            Some(&started.booking_id.to_string())
        );
        assert_eq!(req.metadata.get(metadata_keys::TOUR_DATE).map(String::as_str), Some("2026-06-10"));
        assert!(req.success_url.starts_with("https://tours.example.com/booking/success?booking_id="));
        assert!(req.success_url.ends_with("&session_id={CHECKOUT_SESSION_ID}"));
        assert!(req.cancel_url.ends_with("&cancelled=true"));

        let stored = fx.store.get_reservation(started.booking_id).await.unwrap().unwrap();
        assert_eq!(stored.stripe_session_id.as_deref(), Some(started.session_id.as_str()));
        assert_eq!(stored.booking_status, BookingStatus::Pending);
        assert_eq!(stored.total_price_cents, 13_600);
    }

    #[tokio::test]
    async fn test_unavailable_slot_writes_nothing() {
        let fx = Fixture::new().await;
        let date = NaiveDate::from_ymd_opt(2026, 6, 11).unwrap();
        fx.confirmed_booking(date, &fx.whole_day).await;

        let err = fx.flow().start(&request(&fx, fx.morning.id, "2026-06-11")).await.unwrap_err();
        assert!(matches!(err, BookingError::Unavailable(Conflict::WholeDayBooked)));
        assert!(fx.gateway.requests().is_empty());
        assert_eq!(fx.all_reservations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_pending_row() {
        let fx = Fixture::new().await;
        fx.gateway.fail_session_creation(true);

        let err = fx.flow().start(&request(&fx, fx.morning.id, "2026-06-12")).await.unwrap_err();
        assert!(matches!(err, BookingError::PaymentProvider(_)));

        let rows = fx.all_reservations().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].booking_status, BookingStatus::Pending);
        assert!(rows[0].stripe_session_id.is_none());
    }

    #[tokio::test]
    async fn test_unknown_shift_is_not_found() {
        let fx = Fixture::new().await;
        let err = fx.flow().start(&request(&fx, Uuid::new_v4(), "2026-06-12")).await.unwrap_err();
        assert!(matches!(err, BookingError::ShiftNotFound(_)));
    }
}
