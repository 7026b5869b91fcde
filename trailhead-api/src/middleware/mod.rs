pub mod auth;
pub mod resiliency;

pub use auth::{admin_auth_middleware, AdminClaims};
pub use resiliency::{circuit_breaker_middleware, CircuitBreaker};
