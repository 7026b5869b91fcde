use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;
use trailhead_core::availability::{evaluate, BookedSlot};
use trailhead_core::repository::{
    BoxError, ConfirmOutcome, PaymentConfirmation, ReservationFilter, ReservationRepository,
    ShiftRepository, TourRepository,
};
use trailhead_core::{BookingStatus, PaymentStatus, Reservation, Shift, Tour};
use trailhead_shared::{Clock, SystemClock};

/// In-process store implementing every repository trait.
///
/// Used by the test suites and by the API when no database is configured.
/// Lock order is always shifts before reservations.
pub struct MemoryStore {
    tours: RwLock<HashMap<Uuid, Tour>>,
    shifts: RwLock<HashMap<Uuid, Shift>>,
    reservations: Mutex<HashMap<Uuid, Reservation>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tours: RwLock::new(HashMap::new()),
            shifts: RwLock::new(HashMap::new()),
            reservations: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Raw read that also sees soft-deleted rows.
    pub async fn reservation_snapshot(&self, id: Uuid) -> Option<Reservation> {
        self.reservations.lock().await.get(&id).cloned()
    }
}

fn slots_on(
    reservations: &HashMap<Uuid, Reservation>,
    shifts: &HashMap<Uuid, Shift>,
    date: NaiveDate,
) -> Vec<BookedSlot> {
    reservations
        .values()
        .filter(|r| {
            r.tour_date == date && r.booking_status == BookingStatus::Confirmed && !r.is_deleted
        })
        .filter_map(|r| {
            shifts.get(&r.shift_id).map(|s| BookedSlot {
                reservation_id: r.id,
                shift_id: r.shift_id,
                shift_type: s.shift_type,
            })
        })
        .collect()
}

#[async_trait]
impl TourRepository for MemoryStore {
    async fn get_tour(&self, id: Uuid) -> Result<Option<Tour>, BoxError> {
        Ok(self.tours.read().await.get(&id).cloned())
    }

    async fn list_tours(&self, include_inactive: bool) -> Result<Vec<Tour>, BoxError> {
        let mut tours: Vec<Tour> = self
            .tours
            .read()
            .await
            .values()
            .filter(|t| include_inactive || t.is_active)
            .cloned()
            .collect();
        tours.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(tours)
    }

    async fn create_tour(&self, tour: &Tour) -> Result<(), BoxError> {
        let mut tours = self.tours.write().await;
        if tours.contains_key(&tour.id) {
            return Err(format!("Tour {} already exists", tour.id).into());
        }
        tours.insert(tour.id, tour.clone());
        Ok(())
    }

    async fn update_tour(&self, tour: &Tour) -> Result<bool, BoxError> {
        let mut tours = self.tours.write().await;
        match tours.get_mut(&tour.id) {
            Some(existing) => {
                *existing = Tour {
                    created_at: existing.created_at,
                    updated_at: self.clock.now(),
                    ..tour.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_tour(&self, id: Uuid) -> Result<bool, BoxError> {
        let mut tours = self.tours.write().await;
        match tours.get_mut(&id) {
            Some(tour) if tour.is_active => {
                tour.is_active = false;
                tour.updated_at = self.clock.now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ShiftRepository for MemoryStore {
    async fn get_shift(&self, id: Uuid) -> Result<Option<Shift>, BoxError> {
        Ok(self.shifts.read().await.get(&id).cloned())
    }

    async fn list_shifts(&self, include_inactive: bool) -> Result<Vec<Shift>, BoxError> {
        let mut shifts: Vec<Shift> = self
            .shifts
            .read()
            .await
            .values()
            .filter(|s| include_inactive || s.is_active)
            .cloned()
            .collect();
        shifts.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.name.cmp(&b.name)));
        Ok(shifts)
    }

    async fn create_shift(&self, shift: &Shift) -> Result<(), BoxError> {
        let mut shifts = self.shifts.write().await;
        if shifts.contains_key(&shift.id) {
            return Err(format!("Shift {} already exists", shift.id).into());
        }
        shifts.insert(shift.id, shift.clone());
        Ok(())
    }

    async fn update_shift(&self, shift: &Shift) -> Result<bool, BoxError> {
        let mut shifts = self.shifts.write().await;
        match shifts.get_mut(&shift.id) {
            Some(existing) => {
                *existing = shift.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), BoxError> {
        let mut reservations = self.reservations.lock().await;
        if reservations.contains_key(&reservation.id) {
            return Err(format!("Reservation {} already exists", reservation.id).into());
        }
        reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, BoxError> {
        Ok(self
            .reservations
            .lock()
            .await
            .get(&id)
            .filter(|r| !r.is_deleted)
            .cloned())
    }

    async fn attach_checkout_session(&self, id: Uuid, session_id: &str) -> Result<bool, BoxError> {
        let mut reservations = self.reservations.lock().await;
        match reservations.get_mut(&id) {
            Some(r) => {
                r.stripe_session_id = Some(session_id.to_string());
                r.updated_at = self.clock.now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn booked_slots_on(&self, date: NaiveDate) -> Result<Vec<BookedSlot>, BoxError> {
        let shifts = self.shifts.read().await;
        let reservations = self.reservations.lock().await;
        Ok(slots_on(&reservations, &shifts, date))
    }

    async fn confirm_payment(
        &self,
        id: Uuid,
        confirmation: &PaymentConfirmation,
    ) -> Result<ConfirmOutcome, BoxError> {
        let shifts = self.shifts.read().await;
        let mut reservations = self.reservations.lock().await;

        let Some(current) = reservations.get(&id).cloned() else {
            return Ok(ConfirmOutcome::NotFound);
        };
        if current.booking_status == BookingStatus::Confirmed {
            return Ok(ConfirmOutcome::AlreadyConfirmed(current));
        }
        if current.is_deleted || !current.booking_status.is_confirmable() {
            return Ok(ConfirmOutcome::NotConfirmable(current));
        }

        let shift_type = shifts
            .get(&current.shift_id)
            .map(|s| s.shift_type)
            .ok_or_else(|| format!("Shift {} not found", current.shift_id))?;
        let conflict = evaluate(
            current.shift_id,
            shift_type,
            &slots_on(&reservations, &shifts, current.tour_date),
        );

        let now = self.clock.now();
        let Some(reservation) = reservations.get_mut(&id) else {
            return Ok(ConfirmOutcome::NotFound);
        };
        reservation.payment_status = PaymentStatus::Succeeded;
        if let Some(intent_id) = &confirmation.payment_intent_id {
            reservation.stripe_payment_intent_id = Some(intent_id.clone());
        }
        if let Some(details) = &confirmation.details {
            reservation.payment_details = Some(details.clone());
        }
        reservation.updated_at = now;

        if let Some(conflict) = conflict {
            return Ok(ConfirmOutcome::SlotTaken {
                reservation: reservation.clone(),
                conflict,
            });
        }

        reservation.booking_status = BookingStatus::Confirmed;
        if reservation.customer_name.is_empty() {
            if let Some(name) = &confirmation.customer_name {
                reservation.customer_name = name.clone();
            }
        }
        if reservation.customer_email.is_empty() {
            if let Some(email) = &confirmation.customer_email {
                reservation.customer_email = email.clone();
            }
        }
        Ok(ConfirmOutcome::Confirmed(reservation.clone()))
    }

    async fn mark_payment_failed(&self, id: Uuid) -> Result<bool, BoxError> {
        let mut reservations = self.reservations.lock().await;
        match reservations.get_mut(&id) {
            Some(r) if r.payment_status == PaymentStatus::Pending => {
                r.payment_status = PaymentStatus::Failed;
                r.updated_at = self.clock.now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, BoxError> {
        let now = self.clock.now();
        let mut expired = 0;
        for r in self.reservations.lock().await.values_mut() {
            if r.booking_status == BookingStatus::Pending
                && r.payment_status == PaymentStatus::Pending
                && !r.is_deleted
                && r.created_at < cutoff
            {
                r.booking_status = BookingStatus::Expired;
                r.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn list_reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, BoxError> {
        let mut list: Vec<Reservation> = self
            .reservations
            .lock()
            .await
            .values()
            .filter(|r| filter.include_deleted || !r.is_deleted)
            .filter(|r| filter.tour_date.map_or(true, |d| r.tour_date == d))
            .filter(|r| filter.booking_status.map_or(true, |s| r.booking_status == s))
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            b.tour_date
                .cmp(&a.tour_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(list)
    }

    async fn cancel_reservation(&self, id: Uuid) -> Result<bool, BoxError> {
        let mut reservations = self.reservations.lock().await;
        match reservations.get_mut(&id) {
            Some(r) if !r.is_deleted && r.booking_status != BookingStatus::Cancelled => {
                r.booking_status = BookingStatus::Cancelled;
                r.updated_at = self.clock.now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn soft_delete_reservation(&self, id: Uuid) -> Result<bool, BoxError> {
        let mut reservations = self.reservations.lock().await;
        match reservations.get_mut(&id) {
            Some(r) if !r.is_deleted => {
                r.is_deleted = true;
                r.updated_at = self.clock.now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
