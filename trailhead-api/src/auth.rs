use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use axum::{extract::State, Json};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use trailhead_shared::MaskedEmail;

use crate::error::{AppError, JsonBody};
use crate::middleware::auth::{AdminClaims, ADMIN_ROLE};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
}

/// Checks `password` against an Argon2 PHC string. A malformed hash is a
/// configuration error, not a failed login.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::InternalServerError(format!("Invalid password hash format: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::InternalServerError(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

/// Unix timestamp `lifetime_secs` after `now`. Lifetimes too large for the
/// calendar saturate at chrono's maximum date.
pub fn token_expiry(now: DateTime<Utc>, lifetime_secs: u64) -> usize {
    let expires_at = i64::try_from(lifetime_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    usize::try_from(expires_at.timestamp()).unwrap_or(usize::MAX)
}

/// POST /api/admin/login
pub async fn admin_login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let invalid = || AppError::AuthenticationError("Invalid email or password".to_string());

    if state.auth.admin_password_hash.is_empty() {
        tracing::warn!("Admin login attempted but no admin password hash is configured");
        return Err(invalid());
    }

    let email_matches = req.email.trim().eq_ignore_ascii_case(&state.auth.admin_email);
    if !email_matches || !verify_password(&req.password, &state.auth.admin_password_hash)? {
        tracing::warn!(email = %MaskedEmail(&req.email), "Rejected admin login");
        return Err(invalid());
    }

    let claims = AdminClaims {
        sub: "admin".to_owned(),
        email: state.auth.admin_email.clone(),
        role: ADMIN_ROLE.to_owned(),
        exp: token_expiry(Utc::now(), state.auth.expiration),
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(state.auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    tracing::info!("Admin logged in");
    Ok(Json(AuthResponse { token }))
}
