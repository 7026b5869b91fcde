//! Shared fixture for the unit tests: an in-memory store seeded with one
//! tour and three shifts, a mock gateway and a manual clock.

use chrono::{NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use trailhead_core::payment::MockPaymentGateway;
use trailhead_core::repository::{
    ConfirmOutcome, PaymentConfirmation, ReservationFilter, ReservationRepository, ShiftRepository,
    TourRepository,
};
use trailhead_core::{BookingStatus, PaymentStatus, Reservation, Shift, ShiftType, Tour};
use trailhead_shared::{Clock, ManualClock};
use trailhead_store::MemoryStore;
use uuid::Uuid;

use crate::availability::AvailabilityChecker;
use crate::checkout::{CheckoutFlow, PaymentSessionInitiator};
use crate::queries::BookingQueries;
use crate::reconcile::PaymentReconciler;
use crate::signature::WebhookVerifier;
use crate::writer::ReservationWriter;

pub const WEBHOOK_SECRET: &str = "whsec_unit";

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockPaymentGateway>,
    pub clock: Arc<ManualClock>,
    pub tour: Tour,
    pub whole_day: Shift,
    pub morning: Shift,
    pub afternoon: Shift,
}

fn shift(name: &str, shift_type: ShiftType, hours: Option<(u32, u32)>) -> Shift {
    let mut shift = Shift::new(name, shift_type);
    if let Some((start, end)) = hours {
        shift.start_time = NaiveTime::from_hms_opt(start, 0, 0);
        shift.end_time = NaiveTime::from_hms_opt(end, 0, 0);
    }
    shift
}

impl Fixture {
    pub async fn new() -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));

        let tour = Tour::new("Harbor Lights Walk", 10_000);
        let whole_day = shift("Full Day", ShiftType::WholeDay, None);
        let morning = shift("Morning", ShiftType::Hourly, Some((9, 12)));
        let afternoon = shift("Afternoon", ShiftType::Hourly, Some((13, 16)));

        store.create_tour(&tour).await.unwrap();
        for s in [&whole_day, &morning, &afternoon] {
            store.create_shift(s).await.unwrap();
        }

        Self {
            store,
            gateway: Arc::new(MockPaymentGateway::new()),
            clock,
            tour,
            whole_day,
            morning,
            afternoon,
        }
    }

    pub fn checker(&self) -> AvailabilityChecker {
        AvailabilityChecker::new(self.store.clone(), self.store.clone())
    }

    pub fn writer(&self) -> ReservationWriter {
        ReservationWriter::new(self.store.clone(), self.store.clone(), self.clock.clone())
    }

    pub fn initiator(&self) -> PaymentSessionInitiator {
        PaymentSessionInitiator::new(
            self.gateway.clone(),
            self.store.clone(),
            "https://tours.example.com/",
            "usd",
        )
    }

    pub fn flow(&self) -> CheckoutFlow {
        CheckoutFlow::new(
            Arc::new(self.checker()),
            Arc::new(self.writer()),
            Arc::new(self.initiator()),
        )
    }

    pub fn reconciler(&self) -> PaymentReconciler {
        PaymentReconciler::new(
            self.store.clone(),
            self.gateway.clone(),
            WebhookVerifier::new(WEBHOOK_SECRET, chrono::Duration::seconds(300), self.clock.clone()),
        )
    }

    pub fn queries(&self) -> BookingQueries {
        BookingQueries::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            Arc::new(self.reconciler()),
        )
    }

    pub async fn pending_booking(&self, date: NaiveDate, shift: &Shift) -> Reservation {
        let now = self.clock.now();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            tour_id: self.tour.id,
            shift_id: shift.id,
            tour_date: date,
            booking_status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_price_cents: self.tour.base_price_cents,
            guest_number: 1,
            addons: vec![],
            customer_name: "Jane Doe".into(),
            customer_email: "jane@example.com".into(),
            additional_info: None,
            is_deleted: false,
            stripe_session_id: None,
            stripe_payment_intent_id: None,
            payment_details: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_reservation(&reservation).await.unwrap();
        reservation
    }

    pub async fn confirmed_booking(&self, date: NaiveDate, shift: &Shift) -> Reservation {
        let pending = self.pending_booking(date, shift).await;
        let confirmation = PaymentConfirmation {
            payment_intent_id: Some(format!("pi_seed_{}", pending.id.simple())),
            ..Default::default()
        };
        match self.store.confirm_payment(pending.id, &confirmation).await.unwrap() {
            ConfirmOutcome::Confirmed(r) => r,
            other => panic!("seed booking not confirmed: {:?}", other),
        }
    }

    pub async fn all_reservations(&self) -> Vec<Reservation> {
        self.store
            .list_reservations(&ReservationFilter {
                include_deleted: true,
                ..Default::default()
            })
            .await
            .unwrap()
    }
}
