use std::sync::Arc;
use std::time::Duration as StdDuration;

use trailhead_booking::{
    AvailabilityChecker, BookingQueries, CheckoutFlow, PaymentReconciler, PaymentSessionInitiator,
    ReservationWriter, WebhookVerifier,
};
use trailhead_core::payment::PaymentGateway;
use trailhead_core::repository::{ReservationRepository, ShiftRepository, TourRepository};
use trailhead_shared::Clock;
use trailhead_store::app_config::Config;
use trailhead_store::{RedisClient, RequestCache};

use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    pub admin_email: String,
    pub admin_password_hash: String,
}

#[derive(Clone)]
pub struct ResiliencyState {
    pub payment_cb: Arc<CircuitBreaker>,
}

/// Storage, payment gateway and clock the services are built on. `main`
/// passes the Postgres/Stripe implementations, tests the in-memory ones.
#[derive(Clone)]
pub struct Backends {
    pub tours: Arc<dyn TourRepository>,
    pub shifts: Arc<dyn ShiftRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub clock: Arc<dyn Clock>,
}

/// Cached catalog responses are stored as rendered JSON.
pub type ResponseCache = RequestCache<serde_json::Value, String>;

#[derive(Clone)]
pub struct AppState {
    pub tours: Arc<dyn TourRepository>,
    pub shifts: Arc<dyn ShiftRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub checker: Arc<AvailabilityChecker>,
    pub checkout: Arc<CheckoutFlow>,
    pub reconciler: Arc<PaymentReconciler>,
    pub queries: Arc<BookingQueries>,
    pub cache: Arc<ResponseCache>,
    pub redis: Option<Arc<RedisClient>>,
    pub requests_per_minute: i64,
    pub auth: AuthConfig,
    pub resiliency: ResiliencyState,
}

impl AppState {
    pub fn new(backends: Backends, config: &Config, redis: Option<Arc<RedisClient>>) -> Self {
        let Backends {
            tours,
            shifts,
            reservations,
            gateway,
            clock,
        } = backends;

        let checker = Arc::new(AvailabilityChecker::new(shifts.clone(), reservations.clone()));
        let writer = Arc::new(ReservationWriter::new(
            tours.clone(),
            reservations.clone(),
            clock.clone(),
        ));
        let initiator = Arc::new(PaymentSessionInitiator::new(
            gateway.clone(),
            reservations.clone(),
            &config.server.public_url,
            &config.stripe.currency,
        ));
        let checkout = Arc::new(CheckoutFlow::new(checker.clone(), writer, initiator));

        let verifier = WebhookVerifier::new(
            &config.stripe.webhook_secret,
            chrono::Duration::seconds(config.stripe.webhook_tolerance_seconds),
            clock.clone(),
        );
        let reconciler = Arc::new(PaymentReconciler::new(reservations.clone(), gateway, verifier));
        let queries = Arc::new(BookingQueries::new(
            reservations.clone(),
            tours.clone(),
            shifts.clone(),
            reconciler.clone(),
        ));

        let ttl = chrono::Duration::seconds(i64::try_from(config.cache.ttl_seconds).unwrap_or(i64::MAX / 1000));
        let cache = Arc::new(RequestCache::new(ttl, clock));

        Self {
            tours,
            shifts,
            reservations,
            checker,
            checkout,
            reconciler,
            queries,
            cache,
            redis,
            requests_per_minute: config.redis.requests_per_minute,
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
                admin_email: config.auth.admin_email.clone(),
                admin_password_hash: config.auth.admin_password_hash.clone(),
            },
            resiliency: ResiliencyState {
                payment_cb: Arc::new(CircuitBreaker::new("payment", 5, StdDuration::from_secs(30))),
            },
        }
    }
}
