use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use trailhead_catalog::{sanitize_addons, AddonSelection, PricingEngine};
use trailhead_core::repository::{ReservationRepository, TourRepository};
use trailhead_core::{BookingStatus, PaymentStatus, Reservation, Specialty, Tour};
use trailhead_shared::{Clock, MaskedEmail};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};

/// Checkout input as received from the client. Every field is optional at
/// this stage so validation can name exactly what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingRequest {
    #[serde(default)]
    pub tour_id: Option<String>,
    #[serde(default)]
    pub shift_id: Option<String>,
    #[serde(default, alias = "tour_date")]
    pub date: Option<String>,
    /// Number or numeric string.
    #[serde(default)]
    pub guest_number: Option<Value>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
    #[serde(
        default,
        alias = "specialties",
        deserialize_with = "trailhead_catalog::addons::lenient_selections"
    )]
    pub addons: Vec<AddonSelection>,
}

/// A request that passed validation. Add-ons are already sanitized.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBooking {
    pub tour_id: Uuid,
    pub shift_id: Uuid,
    pub date: NaiveDate,
    pub guest_number: u32,
    pub customer_name: String,
    pub customer_email: String,
    pub additional_info: Option<String>,
    pub addons: Vec<Specialty>,
}

/// The persisted pending row together with the tour it was priced from.
#[derive(Debug, Clone)]
pub struct CreatedReservation {
    pub reservation: Reservation,
    pub tour: Tour,
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> BookingResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BookingError::validation(field, "is required"))
}

fn parse_uuid(field: &'static str, value: &Option<String>) -> BookingResult<Uuid> {
    let raw = required(field, value)?;
    Uuid::parse_str(raw).map_err(|_| BookingError::validation(field, format!("'{}' is not a valid id", raw)))
}

fn parse_date(value: &Option<String>) -> BookingResult<NaiveDate> {
    let raw = required("date", value)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| BookingError::validation("date", format!("'{}' is not a YYYY-MM-DD date", raw)))
}

fn parse_guests(value: &Option<Value>) -> BookingResult<u32> {
    let guests = match value {
        None | Some(Value::Null) => return Err(BookingError::validation("guest_number", "is required")),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    match guests {
        Some(n) if n >= 1 => u32::try_from(n).map_err(|_| BookingError::validation("guest_number", "is too large")),
        Some(_) => Err(BookingError::validation("guest_number", "must be at least 1")),
        None => Err(BookingError::validation("guest_number", "must be a whole number")),
    }
}

/// Syntax check only: one `@`, a non-empty local part, a dotted domain and
/// no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

/// Creates provisional reservations, priced server-side.
pub struct ReservationWriter {
    tours: Arc<dyn TourRepository>,
    reservations: Arc<dyn ReservationRepository>,
    pricing: PricingEngine,
    clock: Arc<dyn Clock>,
}

impl ReservationWriter {
    pub fn new(
        tours: Arc<dyn TourRepository>,
        reservations: Arc<dyn ReservationRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tours,
            reservations,
            pricing: PricingEngine::new(),
            clock,
        }
    }

    /// Field checks in a fixed order; the first failure wins.
    pub fn validate(&self, request: &BookingRequest) -> BookingResult<ValidatedBooking> {
        let tour_id = parse_uuid("tour_id", &request.tour_id)?;
        let shift_id = parse_uuid("shift_id", &request.shift_id)?;
        let date = parse_date(&request.date)?;
        let customer_name = required("customer_name", &request.customer_name)?.to_string();

        let customer_email = required("customer_email", &request.customer_email)?.to_string();
        if !is_valid_email(&customer_email) {
            return Err(BookingError::validation("customer_email", "is not a valid email address"));
        }

        let guest_number = parse_guests(&request.guest_number)?;

        Ok(ValidatedBooking {
            tour_id,
            shift_id,
            date,
            guest_number,
            customer_name,
            customer_email,
            additional_info: request
                .additional_info
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            addons: sanitize_addons(&request.addons),
        })
    }

    /// Validates and writes in one step.
    pub async fn create(&self, request: &BookingRequest) -> BookingResult<CreatedReservation> {
        let booking = self.validate(request)?;
        self.write(&booking).await
    }

    /// Prices the booking against the stored tour and inserts it as
    /// pending/pending.
    pub async fn write(&self, booking: &ValidatedBooking) -> BookingResult<CreatedReservation> {
        let tour = self
            .tours
            .get_tour(booking.tour_id)
            .await
            .map_err(BookingError::store)?
            .filter(|t| t.is_active)
            .ok_or(BookingError::TourNotFound(booking.tour_id))?;

        let quote = self
            .pricing
            .quote(tour.base_price_cents, &booking.addons, booking.guest_number);

        let now = self.clock.now();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            tour_id: tour.id,
            shift_id: booking.shift_id,
            tour_date: booking.date,
            booking_status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_price_cents: quote.total_cents,
            guest_number: booking.guest_number,
            addons: booking.addons.clone(),
            customer_name: booking.customer_name.clone(),
            customer_email: booking.customer_email.clone(),
            additional_info: booking.additional_info.clone(),
            is_deleted: false,
            stripe_session_id: None,
            stripe_payment_intent_id: None,
            payment_details: None,
            created_at: now,
            updated_at: now,
        };

        self.reservations
            .insert_reservation(&reservation)
            .await
            .map_err(BookingError::store)?;

        tracing::info!(
            booking_id = %reservation.id,
            tour = %tour.title,
            date = %reservation.tour_date,
            total_cents = reservation.total_price_cents,
            customer = %MaskedEmail(&reservation.customer_email),
            "Created pending booking"
        );

        Ok(CreatedReservation { reservation, tour })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use serde_json::json;

    fn request(fx: &Fixture, body: Value) -> BookingRequest {
        let mut base = json!({
            "tour_id": fx.tour.id.to_string(),
            "shift_id": fx.morning.id.to_string(),
            "date": "2026-06-10",
            "guest_number": 2,
            "customer_name": "Jane Doe",
            "customer_email": "jane@example.com",
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), body.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn test_email_syntax() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("j.doe+tours@mail.example.co"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane@@example.com"));
        assert!(!is_valid_email("jane doe@example.com"));
        assert!(!is_valid_email("jane@example."));
    }

    #[tokio::test]
    async fn test_lobster_roll_for_two_totals_136() {
        let fx = Fixture::new().await;
        let req = request(&fx, json!({ "addons": [{ "name": "Lobster Roll", "price": 18 }] }));

        let created = fx.writer().create(&req).await.unwrap();
        let r = &created.reservation;
        assert_eq!(r.total_price_cents, 13_600);
        assert_eq!(r.booking_status, BookingStatus::Pending);
        assert_eq!(r.payment_status, PaymentStatus::Pending);
        assert_eq!(r.created_at, fx.clock.now());
        assert_eq!(r.addons.len(), 1);

        let stored = fx.store.get_reservation(r.id).await.unwrap().unwrap();
        assert_eq!(&stored, r);
    }

    #[tokio::test]
    async fn test_malformed_addons_contribute_nothing() {
        let fx = Fixture::new().await;
        let req = request(
            &fx,
            json!({ "addons": [{ "name": "", "price": 10 }, { "name": "Soup", "price": -5 }] }),
        );

        let created = fx.writer().create(&req).await.unwrap();
        assert_eq!(created.reservation.total_price_cents, fx.tour.base_price_cents);
        assert!(created.reservation.addons.is_empty());
    }

    #[tokio::test]
    async fn test_wrongly_typed_addons_do_not_fail_the_booking() {
        let fx = Fixture::new().await;
        let req = request(
            &fx,
            json!({ "addons": [
                { "name": "Lobster Roll", "price": 18 },
                { "name": 5, "price": 10 },
                { "name": "Soup", "price": 3, "description": 7 },
                "Bread"
            ] }),
        );

        let created = fx.writer().create(&req).await.unwrap();
        let names: Vec<&str> = created.reservation.addons.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Lobster Roll", "Soup"]);
        assert_eq!(created.reservation.total_price_cents, 10_000 + 2 * (1_800 + 300));
    }

    #[tokio::test]
    async fn test_non_list_addons_mean_no_addons() {
        let fx = Fixture::new().await;
        let req = request(&fx, json!({ "addons": { "name": "Lobster Roll", "price": 18 } }));
        let created = fx.writer().create(&req).await.unwrap();
        assert!(created.reservation.addons.is_empty());
        assert_eq!(created.reservation.total_price_cents, 10_000);
    }

    #[tokio::test]
    async fn test_client_cannot_set_the_price() {
        let fx = Fixture::new().await;
        let req = request(&fx, json!({ "total_price": 1, "base_price": 1 }));
        let created = fx.writer().create(&req).await.unwrap();
        assert_eq!(created.reservation.total_price_cents, 10_000);
    }

    #[tokio::test]
    async fn test_validation_names_the_field() {
        let fx = Fixture::new().await;
        let writer = fx.writer();
        let cases = [
            (json!({ "tour_id": null }), "tour_id"),
            (json!({ "shift_id": "nope" }), "shift_id"),
            (json!({ "date": "10/06/2026" }), "date"),
            (json!({ "customer_name": "   " }), "customer_name"),
            (json!({ "customer_email": "jane.example.com" }), "customer_email"),
            (json!({ "guest_number": 0 }), "guest_number"),
            (json!({ "guest_number": "two" }), "guest_number"),
        ];

        for (body, expected) in cases {
            match writer.validate(&request(&fx, body)) {
                Err(BookingError::Validation { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected validation error on {}, got {:?}", expected, other),
            }
        }
    }

    #[tokio::test]
    async fn test_guest_number_accepts_numeric_string() {
        let fx = Fixture::new().await;
        let booking = fx.writer().validate(&request(&fx, json!({ "guest_number": "3" }))).unwrap();
        assert_eq!(booking.guest_number, 3);
    }

    #[tokio::test]
    async fn test_unknown_tour_is_not_found() {
        let fx = Fixture::new().await;
        let req = request(&fx, json!({ "tour_id": Uuid::new_v4().to_string() }));
        assert!(matches!(fx.writer().create(&req).await, Err(BookingError::TourNotFound(_))));
    }
}
