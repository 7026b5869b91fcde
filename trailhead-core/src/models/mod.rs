mod reservation;
mod shift;
mod tour;

pub use reservation::{BookingStatus, PaymentDetails, PaymentStatus, Reservation};
pub use shift::{Shift, ShiftType};
pub use tour::{Difficulty, ItineraryEntry, Specialty, Tour};
