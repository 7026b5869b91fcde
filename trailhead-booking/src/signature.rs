use chrono::Duration;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use trailhead_shared::Clock;

use crate::error::{BookingError, BookingResult};

type HmacSha256 = Hmac<Sha256>;

/// Checks `Stripe-Signature` headers (`t=<unix>,v1=<hex>[,v1=...]`).
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
    clock: Arc<dyn Clock>,
}

impl WebhookVerifier {
    pub fn new(secret: &str, tolerance: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.to_string(),
            tolerance,
            clock,
        }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> BookingResult<()> {
        if self.secret.is_empty() {
            return Err(BookingError::Signature("webhook secret is not configured".into()));
        }

        let mut timestamp: Option<i64> = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| BookingError::Signature("missing timestamp".into()))?;
        if candidates.is_empty() {
            return Err(BookingError::Signature("no v1 signature".into()));
        }

        let tolerance = u64::try_from(self.tolerance.num_seconds()).unwrap_or(0);
        if self.clock.now().timestamp().abs_diff(timestamp) > tolerance {
            return Err(BookingError::Signature("timestamp outside tolerance".into()));
        }

        let mac = signed_payload_mac(&self.secret, timestamp, payload)?;
        let matched = candidates.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            Err(BookingError::Signature("no matching signature".into()))
        }
    }
}

fn signed_payload_mac(secret: &str, timestamp: i64, payload: &[u8]) -> BookingResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BookingError::Signature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Builds a header the way Stripe does. Used by tests and local tooling.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    match signed_payload_mac(secret, timestamp, payload) {
        Ok(mac) => format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes())),
        Err(_) => format!("t={}", timestamp),
    }
}
