use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use trailhead_core::repository::{ReservationRepository, ShiftRepository, TourRepository};
use trailhead_core::{BookingStatus, PaymentDetails, PaymentStatus, Reservation, ShiftType, Specialty};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::reconcile::PaymentReconciler;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingStatusView {
    pub booking_id: Uuid,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_price_cents: i64,
    pub tour_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingDetailsView {
    pub booking_id: Uuid,
    pub tour_id: Uuid,
    pub tour_title: Option<String>,
    pub shift_id: Uuid,
    pub shift_name: Option<String>,
    pub shift_type: Option<ShiftType>,
    pub shift_time: Option<String>,
    pub tour_date: NaiveDate,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_price_cents: i64,
    pub guest_number: u32,
    pub addons: Vec<Specialty>,
    pub customer_name: String,
    pub customer_email: String,
    pub additional_info: Option<String>,
    pub payment_details: Option<PaymentDetails>,
    pub created_at: DateTime<Utc>,
}

/// Read side of the booking flow, used by the success page.
pub struct BookingQueries {
    reservations: Arc<dyn ReservationRepository>,
    tours: Arc<dyn TourRepository>,
    shifts: Arc<dyn ShiftRepository>,
    reconciler: Arc<PaymentReconciler>,
}

impl BookingQueries {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        tours: Arc<dyn TourRepository>,
        shifts: Arc<dyn ShiftRepository>,
        reconciler: Arc<PaymentReconciler>,
    ) -> Self {
        Self {
            reservations,
            tours,
            shifts,
            reconciler,
        }
    }

    /// Current reservation state. With a session id, runs the fallback
    /// reconciliation first if the booking is not settled yet.
    async fn load(&self, id: Uuid, session_id: Option<&str>) -> BookingResult<Reservation> {
        let reservation = self
            .reservations
            .get_reservation(id)
            .await
            .map_err(BookingError::store)?
            .ok_or(BookingError::ReservationNotFound(id))?;

        let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
            return Ok(reservation);
        };
        if reservation.payment_recorded() {
            return Ok(reservation);
        }

        match self.reconciler.reconcile_from_session(id, session_id).await {
            Ok(updated) => Ok(updated),
            // The page still renders from the stored row; the webhook may
            // confirm it later.
            Err(BookingError::PaymentProvider(message)) => {
                tracing::warn!(booking_id = %id, "Fallback reconciliation unavailable: {}", message);
                Ok(reservation)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn booking_status(&self, id: Uuid, session_id: Option<&str>) -> BookingResult<BookingStatusView> {
        let r = self.load(id, session_id).await?;
        Ok(BookingStatusView {
            booking_id: r.id,
            booking_status: r.booking_status,
            payment_status: r.payment_status,
            total_price_cents: r.total_price_cents,
            tour_date: r.tour_date,
        })
    }

    pub async fn booking_details(&self, id: Uuid, session_id: Option<&str>) -> BookingResult<BookingDetailsView> {
        let r = self.load(id, session_id).await?;
        let tour = self.tours.get_tour(r.tour_id).await.map_err(BookingError::store)?;
        let shift = self.shifts.get_shift(r.shift_id).await.map_err(BookingError::store)?;

        Ok(BookingDetailsView {
            booking_id: r.id,
            tour_id: r.tour_id,
            tour_title: tour.map(|t| t.title),
            shift_id: r.shift_id,
            shift_name: shift.as_ref().map(|s| s.name.clone()),
            shift_type: shift.as_ref().map(|s| s.shift_type),
            shift_time: shift.as_ref().and_then(|s| s.time_label()),
            tour_date: r.tour_date,
            booking_status: r.booking_status,
            payment_status: r.payment_status,
            total_price_cents: r.total_price_cents,
            guest_number: r.guest_number,
            addons: r.addons,
            customer_name: r.customer_name,
            customer_email: r.customer_email,
            additional_info: r.additional_info,
            payment_details: r.payment_details,
            created_at: r.created_at,
        })
    }
}
