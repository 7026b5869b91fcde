use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod availability;
pub mod bookings;
pub mod checkout;
pub mod error;
pub mod middleware;
pub mod state;
pub mod tours;
pub mod webhooks;
pub mod worker;

pub use state::{AppState, Backends};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let checkout_routes = Router::new()
        .route("/api/checkout", post(checkout::create_checkout))
        .route_layer(from_fn_with_state(state.clone(), middleware::circuit_breaker_middleware));

    let public_routes = Router::new()
        .route("/api/availability", get(availability::check_availability))
        .route("/api/bookings/{id}", get(bookings::get_booking_details))
        .route("/api/bookings/{id}/status", get(bookings::get_booking_status))
        .route("/api/tours", get(tours::list_tours))
        .route("/api/tours/{id}", get(tours::get_tour))
        .route("/api/shifts", get(tours::list_shifts))
        .route("/api/admin/login", post(auth::admin_login))
        .merge(checkout_routes)
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware));

    let admin_routes = Router::new()
        .route("/api/admin/tours", get(admin::list_tours).post(admin::create_tour))
        .route("/api/admin/tours/{id}", put(admin::update_tour).delete(admin::deactivate_tour))
        .route("/api/admin/shifts", get(admin::list_shifts).post(admin::create_shift))
        .route("/api/admin/shifts/{id}", put(admin::update_shift))
        .route("/api/admin/bookings", get(admin::list_bookings))
        .route("/api/admin/bookings/{id}", get(admin::get_booking).delete(admin::delete_booking))
        .route("/api/admin/bookings/{id}/cancel", post(admin::cancel_booking))
        .route_layer(from_fn_with_state(state.clone(), middleware::admin_auth_middleware));

    // Webhooks are not rate limited.
    Router::new()
        .route("/health", get(health))
        .route("/api/webhooks/stripe", post(webhooks::handle_stripe_webhook))
        .merge(public_routes)
        .merge(admin_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Fixed-window limit per client IP. Skipped when Redis is not configured
/// or the peer address is unknown; Redis errors fail open.
async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let (Some(redis), Some(ConnectInfo(addr))) = (
        state.redis.as_ref(),
        req.extensions().get::<ConnectInfo<SocketAddr>>().cloned(),
    ) else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());

    match redis.check_rate_limit(&key, state.requests_per_minute, 60).await {
        Ok(true) => next.run(req).await,
        Ok(false) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Rate limit exceeded" })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
            next.run(req).await
        }
    }
}
