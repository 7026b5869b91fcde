use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::availability::{BookedSlot, Conflict};
use crate::models::{BookingStatus, PaymentDetails, Reservation, Shift, Tour};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Repository trait for tour data access
#[async_trait]
pub trait TourRepository: Send + Sync {
    async fn get_tour(&self, id: Uuid) -> Result<Option<Tour>, BoxError>;

    async fn list_tours(&self, include_inactive: bool) -> Result<Vec<Tour>, BoxError>;

    async fn create_tour(&self, tour: &Tour) -> Result<(), BoxError>;

    /// Returns `false` when no tour has that id.
    async fn update_tour(&self, tour: &Tour) -> Result<bool, BoxError>;

    /// Tours are referenced by reservations, so they are hidden, not removed.
    async fn deactivate_tour(&self, id: Uuid) -> Result<bool, BoxError>;
}

/// Repository trait for shift definitions
#[async_trait]
pub trait ShiftRepository: Send + Sync {
    async fn get_shift(&self, id: Uuid) -> Result<Option<Shift>, BoxError>;

    async fn list_shifts(&self, include_inactive: bool) -> Result<Vec<Shift>, BoxError>;

    async fn create_shift(&self, shift: &Shift) -> Result<(), BoxError>;

    async fn update_shift(&self, shift: &Shift) -> Result<bool, BoxError>;
}

/// Evidence of a successful payment, applied by [`ReservationRepository::confirm_payment`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentConfirmation {
    pub payment_intent_id: Option<String>,
    pub details: Option<PaymentDetails>,
    /// Only written when the reservation has no customer name yet.
    pub customer_name: Option<String>,
    /// Only written when the reservation has no customer email yet.
    pub customer_email: Option<String>,
}

/// Result of the guarded confirmation write.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// This call moved the reservation to confirmed/succeeded.
    Confirmed(Reservation),
    /// Someone else got there first; nothing was written.
    AlreadyConfirmed(Reservation),
    /// Payment recorded as succeeded, but a competing confirmed booking now
    /// holds the slot. The reservation stays unconfirmed.
    SlotTaken {
        reservation: Reservation,
        conflict: Conflict,
    },
    /// Cancelled or deleted; the payment cannot confirm it.
    NotConfirmable(Reservation),
    NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub tour_date: Option<NaiveDate>,
    pub booking_status: Option<BookingStatus>,
    pub include_deleted: bool,
}

/// Repository trait for reservations. The reservation row is the system of
/// record for booking state.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), BoxError>;

    /// Non-deleted reservation by id.
    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, BoxError>;

    async fn attach_checkout_session(&self, id: Uuid, session_id: &str) -> Result<bool, BoxError>;

    /// Confirmed, non-deleted reservations on a date, with their shift type.
    async fn booked_slots_on(&self, date: NaiveDate) -> Result<Vec<BookedSlot>, BoxError>;

    /// Conditional transition to confirmed/succeeded. Re-checks the
    /// availability rules for the reservation's slot inside the same critical
    /// section, so concurrent confirmations cannot double-book.
    async fn confirm_payment(
        &self,
        id: Uuid,
        confirmation: &PaymentConfirmation,
    ) -> Result<ConfirmOutcome, BoxError>;

    /// Sets payment status to failed unless it already succeeded. Booking
    /// status is left alone. Returns `false` when nothing changed.
    async fn mark_payment_failed(&self, id: Uuid) -> Result<bool, BoxError>;

    /// Moves pending/pending reservations created before `cutoff` to expired.
    async fn expire_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, BoxError>;

    async fn list_reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, BoxError>;

    async fn cancel_reservation(&self, id: Uuid) -> Result<bool, BoxError>;

    async fn soft_delete_reservation(&self, id: Uuid) -> Result<bool, BoxError>;
}
