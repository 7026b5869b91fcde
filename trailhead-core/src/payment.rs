use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::PaymentDetails;
use crate::repository::BoxError;

/// Metadata keys attached to every checkout session and the payment intent
/// it spawns, so asynchronous confirmation can find the reservation.
pub mod metadata_keys {
    pub const BOOKING_ID: &str = "booking_id";
    pub const TOUR_ID: &str = "tour_id";
    pub const SHIFT_ID: &str = "shift_id";
    pub const TOUR_DATE: &str = "tour_date";
    pub const GUEST_NUMBER: &str = "guest_number";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    pub unit_amount_cents: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub currency: String,
    pub line_items: Vec<LineItem>,
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
}

impl CheckoutSessionRequest {
    pub fn amount_total_cents(&self) -> i64 {
        self.line_items
            .iter()
            .map(|item| item.unit_amount_cents * i64::from(item.quantity))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    pub metadata: BTreeMap<String, String>,
    /// Card and receipt data from the latest charge, when the gateway
    /// returned it expanded.
    pub charge: Option<PaymentDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerDetails {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page. Only present while the session is open.
    pub url: Option<String>,
    pub payment_status: SessionPaymentStatus,
    pub payment_intent_id: Option<String>,
    /// Present when the session was retrieved with the intent expanded.
    pub payment_intent: Option<PaymentIntent>,
    pub metadata: BTreeMap<String, String>,
    pub customer: Option<CustomerDetails>,
}

/// Hosted-checkout payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, BoxError>;

    /// Retrieve a session with its payment intent and latest charge expanded.
    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, BoxError>;

    /// Retrieve a payment intent with its latest charge expanded.
    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, BoxError>;
}

/// In-process gateway for development and tests. Sessions stay unpaid until
/// [`MockPaymentGateway::complete_session`] is called.
#[derive(Default)]
pub struct MockPaymentGateway {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    intents: Mutex<HashMap<String, PaymentIntent>>,
    requests: Mutex<Vec<CheckoutSessionRequest>>,
    sequence: AtomicUsize,
    retrievals: AtomicUsize,
    fail_create: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create_checkout_session` calls fail.
    pub fn fail_session_creation(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Simulate the customer paying on the hosted page.
    /// Returns the id of the succeeded payment intent.
    pub fn complete_session(&self, session_id: &str, charge: PaymentDetails) -> Option<String> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions.get_mut(session_id)?;

        let intent_id = format!("pi_mock_{}", self.sequence.fetch_add(1, Ordering::SeqCst));
        let intent = PaymentIntent {
            id: intent_id.clone(),
            status: IntentStatus::Succeeded,
            metadata: session.metadata.clone(),
            charge: Some(charge),
        };

        session.payment_status = SessionPaymentStatus::Paid;
        session.payment_intent_id = Some(intent_id.clone());
        session.payment_intent = Some(intent.clone());
        session.url = None;

        self.intents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(intent_id.clone(), intent);
        Some(intent_id)
    }

    /// Register an intent directly, e.g. one that failed.
    pub fn insert_intent(&self, intent: PaymentIntent) {
        self.intents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(intent.id.clone(), intent);
    }

    pub fn set_customer(&self, session_id: &str, customer: CustomerDetails) {
        if let Some(session) = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(session_id)
        {
            session.customer = Some(customer);
        }
    }

    /// Every session request received so far, oldest first.
    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of retrieve calls (sessions and intents) served.
    pub fn retrievals(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, BoxError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err("Simulated payment gateway failure".into());
        }

        let id = format!("cs_mock_{}", self.sequence.fetch_add(1, Ordering::SeqCst));
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.mock/pay/{}", id)),
            payment_status: SessionPaymentStatus::Unpaid,
            payment_intent_id: None,
            payment_intent: None,
            metadata: request.metadata.clone(),
            customer: request.customer_email.clone().map(|email| CustomerDetails {
                name: None,
                email: Some(email),
            }),
        };

        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, BoxError> {
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
            .ok_or_else(|| format!("No such checkout session: {}", session_id).into())
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, BoxError> {
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        self.intents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(intent_id)
            .cloned()
            .ok_or_else(|| format!("No such payment intent: {}", intent_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            currency: "usd".into(),
            line_items: vec![
                LineItem { name: "Tour".into(), unit_amount_cents: 10_000, quantity: 1 },
                LineItem { name: "Lobster Roll".into(), unit_amount_cents: 1_800, quantity: 2 },
            ],
            metadata: BTreeMap::from([(metadata_keys::BOOKING_ID.to_string(), "b-1".to_string())]),
            success_url: "https://example.com/ok".into(),
            cancel_url: "https://example.com/cancel".into(),
            customer_email: Some("jane@example.com".into()),
        }
    }

    #[test]
    fn test_amount_total_multiplies_quantities() {
        assert_eq!(request().amount_total_cents(), 13_600);
    }

    #[tokio::test]
    async fn test_mock_session_lifecycle() {
        let gateway = MockPaymentGateway::new();
        let session = gateway.create_checkout_session(&request()).await.unwrap();
        assert_eq!(session.payment_status, SessionPaymentStatus::Unpaid);
        assert!(session.url.is_some());

        let intent_id = gateway
            .complete_session(&session.id, PaymentDetails::default())
            .unwrap();

        let paid = gateway.retrieve_checkout_session(&session.id).await.unwrap();
        assert_eq!(paid.payment_status, SessionPaymentStatus::Paid);
        assert_eq!(paid.payment_intent_id.as_deref(), Some(intent_id.as_str()));

        let intent = gateway.retrieve_payment_intent(&intent_id).await.unwrap();
        assert_eq!(intent.status, IntentStatus::Succeeded);
        assert_eq!(intent.metadata.get(metadata_keys::BOOKING_ID).map(String::as_str), Some("b-1"));
        assert_eq!(gateway.retrievals(), 2);
    }

    #[tokio::test]
    async fn test_mock_failure_switch() {
        let gateway = MockPaymentGateway::new();
        gateway.fail_session_creation(true);
        assert!(gateway.create_checkout_session(&request()).await.is_err());
        assert!(gateway.requests().is_empty());
    }
}
