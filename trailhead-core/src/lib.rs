pub mod availability;
pub mod models;
pub mod payment;
pub mod repository;

pub use availability::{evaluate, Availability, BookedSlot, Conflict};
pub use models::{
    BookingStatus, Difficulty, ItineraryEntry, PaymentDetails, PaymentStatus, Reservation,
    Shift, ShiftType, Specialty, Tour,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown {kind} value: {value}")]
    UnknownValue { kind: &'static str, value: String },
}
