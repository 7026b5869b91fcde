use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use trailhead_core::repository::ReservationRepository;
use trailhead_shared::Clock;

use crate::error::{BookingError, BookingResult};

/// How long an unpaid booking may stay pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingExpiryPolicy {
    pub max_age: Duration,
}

impl PendingExpiryPolicy {
    /// `None` (the default configuration) disables expiry. Windows beyond
    /// what chrono can represent saturate at `Duration::MAX`.
    pub fn from_minutes(minutes: Option<u64>) -> Option<Self> {
        minutes.filter(|m| *m > 0).map(|m| Self {
            max_age: i64::try_from(m)
                .ok()
                .and_then(Duration::try_minutes)
                .unwrap_or(Duration::MAX),
        })
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.max_age).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Moves abandoned pending bookings to expired.
pub struct ExpirySweeper {
    reservations: Arc<dyn ReservationRepository>,
    policy: PendingExpiryPolicy,
    clock: Arc<dyn Clock>,
}

impl ExpirySweeper {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        policy: PendingExpiryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reservations,
            policy,
            clock,
        }
    }

    pub async fn sweep(&self) -> BookingResult<u64> {
        let cutoff = self.policy.cutoff(self.clock.now());
        let expired = self
            .reservations
            .expire_pending(cutoff)
            .await
            .map_err(BookingError::store)?;
        if expired > 0 {
            tracing::info!(%cutoff, "Expired {} pending booking(s)", expired);
        }
        Ok(expired)
    }
}
