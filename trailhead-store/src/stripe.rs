use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use trailhead_core::payment::{
    CheckoutSession, CheckoutSessionRequest, CustomerDetails, IntentStatus, PaymentGateway,
    PaymentIntent, SessionPaymentStatus,
};
use trailhead_core::repository::BoxError;
use trailhead_core::PaymentDetails;

use crate::app_config::StripeConfig;

const API_VERSION: &str = "2024-06-20";

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("Stripe request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected Stripe response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Stripe REST client. Requests are form-encoded, responses are JSON with
/// expandable sub-objects.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self::from_client(http, &config.api_base, &config.secret_key))
    }

    pub fn from_client(http: reqwest::Client, api_base: &str, secret_key: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, StripeError> {
        let response = request
            .bearer_auth(&self.secret_key)
            .header("Stripe-Version", API_VERSION)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<WireError>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| status.to_string());
            tracing::warn!(status = status.as_u16(), "Stripe returned an error: {}", message);
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

/// Flattens a session request into Stripe's bracketed form keys.
pub fn checkout_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("payment_method_types[]".to_string(), "card".to_string()),
    ];

    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }

    for (i, item) in request.line_items.iter().enumerate() {
        form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        form.push((format!("line_items[{i}][price_data][currency]"), request.currency.clone()));
        form.push((
            format!("line_items[{i}][price_data][unit_amount]"),
            item.unit_amount_cents.to_string(),
        ));
        form.push((format!("line_items[{i}][price_data][product_data][name]"), item.name.clone()));
    }

    // Copied to the intent so payment_intent.* webhooks can be traced back.
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
        form.push((format!("payment_intent_data[metadata][{key}]"), value.clone()));
    }

    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, BoxError> {
        let wire: WireSession = self
            .send(self.http.post(self.url("checkout/sessions")).form(&checkout_form(request)))
            .await?;
        tracing::info!(session_id = %wire.id, "Created Stripe checkout session");
        Ok(wire.into())
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, BoxError> {
        let wire: WireSession = self
            .send(
                self.http
                    .get(self.url(&format!("checkout/sessions/{}", session_id)))
                    .query(&[
                        ("expand[]", "payment_intent"),
                        ("expand[]", "payment_intent.latest_charge"),
                    ]),
            )
            .await?;
        Ok(wire.into())
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, BoxError> {
        let wire: WireIntent = self
            .send(
                self.http
                    .get(self.url(&format!("payment_intents/{}", intent_id)))
                    .query(&[("expand[]", "latest_charge")]),
            )
            .await?;
        Ok(wire.into())
    }
}

// Wire types

#[derive(Deserialize)]
#[serde(untagged)]
enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T> Expandable<T> {
    fn into_object(self) -> Option<T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => Some(*obj),
        }
    }
}

#[derive(Deserialize)]
struct WireSession {
    id: String,
    url: Option<String>,
    payment_status: SessionPaymentStatus,
    payment_intent: Option<Expandable<WireIntent>>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    customer_details: Option<WireCustomer>,
}

#[derive(Deserialize)]
struct WireCustomer {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct WireIntent {
    id: String,
    status: IntentStatus,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    latest_charge: Option<Expandable<WireCharge>>,
}

#[derive(Deserialize)]
struct WireCharge {
    receipt_url: Option<String>,
    payment_method_details: Option<WireMethodDetails>,
}

#[derive(Deserialize)]
struct WireMethodDetails {
    card: Option<WireCard>,
}

#[derive(Deserialize)]
struct WireCard {
    brand: Option<String>,
    last4: Option<String>,
    exp_month: Option<u32>,
    exp_year: Option<u32>,
}

#[derive(Deserialize)]
struct WireError {
    error: WireErrorBody,
}

#[derive(Deserialize)]
struct WireErrorBody {
    message: Option<String>,
}

impl From<WireCharge> for PaymentDetails {
    fn from(charge: WireCharge) -> Self {
        let card = charge.payment_method_details.and_then(|d| d.card);
        PaymentDetails {
            card_brand: card.as_ref().and_then(|c| c.brand.clone()),
            card_last4: card.as_ref().and_then(|c| c.last4.clone()),
            card_exp_month: card.as_ref().and_then(|c| c.exp_month),
            card_exp_year: card.as_ref().and_then(|c| c.exp_year),
            receipt_url: charge.receipt_url,
        }
    }
}

impl From<WireIntent> for PaymentIntent {
    fn from(wire: WireIntent) -> Self {
        PaymentIntent {
            id: wire.id,
            status: wire.status,
            metadata: wire.metadata,
            charge: wire
                .latest_charge
                .and_then(Expandable::into_object)
                .map(PaymentDetails::from),
        }
    }
}

impl From<WireSession> for CheckoutSession {
    fn from(wire: WireSession) -> Self {
        let (payment_intent_id, payment_intent) = match wire.payment_intent {
            Some(Expandable::Id(id)) => (Some(id), None),
            Some(Expandable::Object(intent)) => {
                let intent = PaymentIntent::from(*intent);
                (Some(intent.id.clone()), Some(intent))
            }
            None => (None, None),
        };

        CheckoutSession {
            id: wire.id,
            url: wire.url,
            payment_status: wire.payment_status,
            payment_intent_id,
            payment_intent,
            metadata: wire.metadata,
            customer: wire.customer_details.map(|c| CustomerDetails {
                name: c.name,
                email: c.email,
            }),
        }
    }
}
