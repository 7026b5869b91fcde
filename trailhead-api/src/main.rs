use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trailhead_api::{app, worker, AppState, Backends};
use trailhead_booking::{ExpirySweeper, PendingExpiryPolicy};
use trailhead_core::payment::{MockPaymentGateway, PaymentGateway};
use trailhead_shared::{Clock, SystemClock};
use trailhead_store::app_config::Config;
use trailhead_store::{
    DbClient, RedisClient, StoreReservationRepository, StoreShiftRepository, StoreTourRepository,
    StripeGateway,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trailhead_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Trailhead API on port {}", config.server.port);

    // Database Connection
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis Connection (rate limiting only)
    let redis = match &config.redis.url {
        Some(url) => Some(Arc::new(
            RedisClient::new(url).await.context("Failed to connect to Redis")?,
        )),
        None => {
            tracing::warn!("No Redis configured, rate limiting disabled");
            None
        }
    };

    let gateway: Arc<dyn PaymentGateway> = if config.stripe.secret_key.is_empty() {
        tracing::warn!("No Stripe secret key configured, using the mock payment gateway");
        Arc::new(MockPaymentGateway::new())
    } else {
        Arc::new(StripeGateway::new(&config.stripe).context("Failed to build Stripe client")?)
    };
    if config.stripe.webhook_secret.is_empty() {
        tracing::warn!("No Stripe webhook secret configured, every webhook will be rejected");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let reservations = Arc::new(StoreReservationRepository::new(db.pool.clone()));
    let backends = Backends {
        tours: Arc::new(StoreTourRepository::new(db.pool.clone())),
        shifts: Arc::new(StoreShiftRepository::new(db.pool.clone())),
        reservations: reservations.clone(),
        gateway,
        clock: clock.clone(),
    };

    let app_state = AppState::new(backends, &config, redis);

    // Background housekeeping
    let sweeper = PendingExpiryPolicy::from_minutes(config.booking.pending_expiry_minutes)
        .map(|policy| Arc::new(ExpirySweeper::new(reservations, policy, clock)));
    tokio::spawn(worker::start_housekeeping_worker(
        sweeper,
        app_state.cache.clone(),
        tokio::time::Duration::from_secs(config.booking.sweep_interval_seconds.max(1)),
    ));

    let cache = app_state.cache.clone();
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Shutting down");
    cache.clear();
    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
