use chrono::NaiveDate;
use std::sync::Arc;
use trailhead_core::repository::{ReservationRepository, ShiftRepository};
use trailhead_core::{evaluate, Availability, Shift};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};

/// Decides whether a new reservation may be made for a date and shift.
pub struct AvailabilityChecker {
    shifts: Arc<dyn ShiftRepository>,
    reservations: Arc<dyn ReservationRepository>,
}

impl AvailabilityChecker {
    pub fn new(shifts: Arc<dyn ShiftRepository>, reservations: Arc<dyn ReservationRepository>) -> Self {
        Self { shifts, reservations }
    }

    /// Loads an active shift. Missing and inactive shifts look the same to
    /// callers.
    pub async fn active_shift(&self, shift_id: Uuid) -> BookingResult<Shift> {
        self.shifts
            .get_shift(shift_id)
            .await
            .map_err(BookingError::store)?
            .filter(|s| s.is_active)
            .ok_or(BookingError::ShiftNotFound(shift_id))
    }

    pub async fn check(&self, date: NaiveDate, shift_id: Uuid) -> BookingResult<Availability> {
        let shift = self.active_shift(shift_id).await?;
        self.check_shift(date, &shift).await
    }

    pub async fn check_shift(&self, date: NaiveDate, shift: &Shift) -> BookingResult<Availability> {
        let booked = self
            .reservations
            .booked_slots_on(date)
            .await
            .map_err(BookingError::store)?;

        Ok(match evaluate(shift.id, shift.shift_type, &booked) {
            Some(conflict) => {
                tracing::debug!(%date, shift = %shift.name, "Slot unavailable: {}", conflict);
                Availability::blocked(conflict)
            }
            None => Availability::available(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use trailhead_core::{Conflict, ShiftType};

    #[tokio::test]
    async fn test_whole_day_booking_blocks_hourly_with_whole_day_reason() {
        let fx = Fixture::new().await;
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        fx.confirmed_booking(date, &fx.whole_day).await;

        let checker = fx.checker();
        let morning = checker.check(date, fx.morning.id).await.unwrap();
        assert!(!morning.available);
        assert_eq!(morning.conflict, Some(Conflict::WholeDayBooked));

        let full = checker.check(date, fx.whole_day.id).await.unwrap();
        assert_eq!(full.conflict, Some(Conflict::DayAlreadyBooked));

        let next_day = checker.check(date.succ_opt().unwrap(), fx.morning.id).await.unwrap();
        assert!(next_day.available);
    }

    #[tokio::test]
    async fn test_hourly_shifts_do_not_block_each_other() {
        let fx = Fixture::new().await;
        let date = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        fx.confirmed_booking(date, &fx.morning).await;

        let checker = fx.checker();
        assert_eq!(
            checker.check(date, fx.morning.id).await.unwrap().conflict,
            Some(Conflict::ShiftAlreadyBooked)
        );
        assert!(checker.check(date, fx.afternoon.id).await.unwrap().available);
        assert!(!checker.check(date, fx.whole_day.id).await.unwrap().available);
    }

    #[tokio::test]
    async fn test_pending_bookings_do_not_block() {
        let fx = Fixture::new().await;
        let date = NaiveDate::from_ymd_opt(2026, 5, 3).unwrap();
        fx.pending_booking(date, &fx.whole_day).await;

        assert!(fx.checker().check(date, fx.morning.id).await.unwrap().available);
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_shift_is_not_found() {
        let fx = Fixture::new().await;
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let checker = fx.checker();

        assert!(matches!(
            checker.check(date, Uuid::new_v4()).await,
            Err(BookingError::ShiftNotFound(_))
        ));

        let mut retired = Shift::new("Retired", ShiftType::Hourly);
        retired.is_active = false;
        fx.store.create_shift(&retired).await.unwrap();
        assert!(matches!(
            checker.check(date, retired.id).await,
            Err(BookingError::ShiftNotFound(_))
        ));
    }
}
