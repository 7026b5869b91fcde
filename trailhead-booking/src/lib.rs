pub mod availability;
pub mod checkout;
pub mod error;
pub mod expiry;
pub mod queries;
pub mod reconcile;
pub mod signature;
pub mod writer;

#[cfg(test)]
mod testing;

pub use availability::AvailabilityChecker;
pub use checkout::{CheckoutFlow, CheckoutRedirect, CheckoutStarted, PaymentSessionInitiator};
pub use error::{BookingError, BookingResult};
pub use expiry::{ExpirySweeper, PendingExpiryPolicy};
pub use queries::{BookingDetailsView, BookingQueries, BookingStatusView};
pub use reconcile::{PaymentReconciler, WebhookOutcome};
pub use signature::{signature_header, WebhookVerifier};
pub use writer::{is_valid_email, BookingRequest, CreatedReservation, ReservationWriter, ValidatedBooking};
