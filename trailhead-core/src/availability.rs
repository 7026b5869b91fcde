use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::models::ShiftType;

/// A confirmed, non-deleted reservation as seen by the availability rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedSlot {
    pub reservation_id: Uuid,
    pub shift_id: Uuid,
    pub shift_type: ShiftType,
}

/// Why a date/shift cannot take another booking.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Conflict {
    /// A whole-day shift was requested but the date already has a booking.
    DayAlreadyBooked,
    /// A whole-day booking blocks every shift on the date.
    WholeDayBooked,
    /// This exact hourly shift is already booked on the date.
    ShiftAlreadyBooked,
}

impl Conflict {
    pub fn reason(&self) -> &'static str {
        match self {
            Conflict::DayAlreadyBooked => {
                "This date already has a booking, so the whole-day tour is unavailable"
            }
            Conflict::WholeDayBooked => "A whole-day tour is already booked on this date",
            Conflict::ShiftAlreadyBooked => "This shift is already booked on this date",
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Answer returned to callers of the availability check.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
}

impl Availability {
    pub fn available() -> Self {
        Self {
            available: true,
            reason: None,
            conflict: None,
        }
    }

    pub fn blocked(conflict: Conflict) -> Self {
        Self {
            available: false,
            reason: Some(conflict.reason().to_string()),
            conflict: Some(conflict),
        }
    }
}

/// Applies the exclusivity rules for one date.
///
/// `booked` must hold only confirmed, non-deleted reservations on that date.
pub fn evaluate(shift_id: Uuid, shift_type: ShiftType, booked: &[BookedSlot]) -> Option<Conflict> {
    match shift_type {
        ShiftType::WholeDay => {
            if booked.is_empty() {
                None
            } else {
                Some(Conflict::DayAlreadyBooked)
            }
        }
        ShiftType::Hourly => {
            if booked.iter().any(|b| b.shift_type == ShiftType::WholeDay) {
                Some(Conflict::WholeDayBooked)
            } else if booked.iter().any(|b| b.shift_id == shift_id) {
                Some(Conflict::ShiftAlreadyBooked)
            } else {
                None
            }
        }
    }
}
