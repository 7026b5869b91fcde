use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::tour::Specialty;
use crate::CoreError;

/// Booking lifecycle. `Pending -> Confirmed` happens at most once and is
/// never reversed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Expired,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Expired => "expired",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// States a successful payment may still move to `Confirmed`.
    pub fn is_confirmable(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Expired)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "expired" => Ok(BookingStatus::Expired),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::UnknownValue {
                kind: "booking status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(CoreError::UnknownValue {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

/// Card and receipt facts copied from the gateway once a payment succeeds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentDetails {
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub card_exp_month: Option<u32>,
    pub card_exp_year: Option<u32>,
    pub receipt_url: Option<String>,
}

impl PaymentDetails {
    pub fn is_empty(&self) -> bool {
        *self == PaymentDetails::default()
    }
}

/// A booking of one tour, on one date, in one shift.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub tour_id: Uuid,
    pub shift_id: Uuid,
    pub tour_date: NaiveDate,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_price_cents: i64,
    pub guest_number: u32,
    pub addons: Vec<Specialty>,
    pub customer_name: String,
    pub customer_email: String,
    pub additional_info: Option<String>,
    pub is_deleted: bool,
    pub stripe_session_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub payment_details: Option<PaymentDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Terminal success: both the booking and its payment are settled.
    pub fn is_settled(&self) -> bool {
        self.booking_status == BookingStatus::Confirmed
            && self.payment_status == PaymentStatus::Succeeded
    }

    /// The gateway has nothing more to tell us once the payment is recorded
    /// as succeeded. A paid booking whose slot was taken stays unconfirmed
    /// until an operator refunds or moves it.
    pub fn payment_recorded(&self) -> bool {
        self.payment_status == PaymentStatus::Succeeded
    }
}
