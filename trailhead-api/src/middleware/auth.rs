use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub const ADMIN_ROLE: &str = "ADMIN";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

pub fn decode_admin_token(token: &str, secret: &str) -> Result<AdminClaims, AppError> {
    let token_data = decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthenticationError("Invalid or expired token".to_string()))?;

    if token_data.claims.role != ADMIN_ROLE {
        return Err(AppError::AuthenticationError("Admin role required".to_string()));
    }

    Ok(token_data.claims)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let claims = decode_admin_token(bearer.token(), &state.auth.secret)?;
    tracing::debug!(admin = %claims.sub, "Admin request authorized");

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(role: &str, exp: i64) -> String {
        let claims = AdminClaims {
            sub: "admin".into(),
            email: "admin@example.com".into(),
            role: role.into(),
            exp: exp as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap()
    }

    #[test]
    fn test_decode_admin_token() {
        let exp = chrono::Utc::now().timestamp() + 600;
        assert!(decode_admin_token(&token(ADMIN_ROLE, exp), "secret").is_ok());
        assert!(decode_admin_token(&token(ADMIN_ROLE, exp), "other").is_err());
        assert!(decode_admin_token(&token("GUEST", exp), "secret").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let exp = chrono::Utc::now().timestamp() - 3600;
        assert!(decode_admin_token(&token(ADMIN_ROLE, exp), "secret").is_err());
    }
}
