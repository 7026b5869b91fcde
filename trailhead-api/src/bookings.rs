use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use trailhead_booking::{BookingDetailsView, BookingStatusView};
use uuid::Uuid;

use crate::error::{AppError, QueryParams};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

impl SessionQuery {
    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

pub(crate) fn parse_id(raw: &str, field: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::ValidationError(format!("Invalid {}: {}", field, raw)))
}

/// GET /api/bookings/{id}/status?session_id=
pub async fn get_booking_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    WithRejection(Query(query), _): QueryParams<SessionQuery>,
) -> Result<Json<BookingStatusView>, AppError> {
    let id = parse_id(&id, "booking id")?;
    let view = state.queries.booking_status(id, query.session_id()).await?;
    Ok(Json(view))
}

/// GET /api/bookings/{id}?session_id=
pub async fn get_booking_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
    WithRejection(Query(query), _): QueryParams<SessionQuery>,
) -> Result<Json<BookingDetailsView>, AppError> {
    let id = parse_id(&id, "booking id")?;
    let view = state.queries.booking_details(id, query.session_id()).await?;
    Ok(Json(view))
}
