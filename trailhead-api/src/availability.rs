use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::NaiveDate;
use serde::Deserialize;
use trailhead_core::Availability;

use crate::bookings::parse_id;
use crate::error::{AppError, QueryParams};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: Option<String>,
    pub shift_id: Option<String>,
}

/// GET /api/availability?date=YYYY-MM-DD&shift_id=
pub async fn check_availability(
    State(state): State<AppState>,
    WithRejection(Query(query), _): QueryParams<AvailabilityQuery>,
) -> Result<Json<Availability>, AppError> {
    let date = query
        .date
        .as_deref()
        .ok_or_else(|| AppError::ValidationError("date is required".to_string()))?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::ValidationError(format!("Invalid date: {}", date)))?;
    let shift_id = query
        .shift_id
        .as_deref()
        .ok_or_else(|| AppError::ValidationError("shift_id is required".to_string()))?;
    let shift_id = parse_id(shift_id, "shift_id")?;

    let availability = state.checker.check(date, shift_id).await?;
    Ok(Json(availability))
}
