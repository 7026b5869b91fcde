use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use trailhead_store::CacheKey;

use crate::bookings::parse_id;
use crate::error::AppError;
use crate::state::AppState;

pub const TOURS_ENDPOINT: &str = "/api/tours";
pub const SHIFTS_ENDPOINT: &str = "/api/shifts";

/// GET /api/tours
pub async fn list_tours(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let tours = state.tours.clone();
    let body = state
        .cache
        .get_or_fetch(CacheKey::endpoint(TOURS_ENDPOINT), move || async move {
            let tours = tours.list_tours(false).await.map_err(|e| e.to_string())?;
            serde_json::to_value(tours).map_err(|e| e.to_string())
        })
        .await
        .map_err(AppError::UpstreamError)?;

    Ok(Json(body))
}

/// GET /api/tours/{id}
/// A missing or hidden tour is cached as `null` until the next catalog write.
pub async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id, "tour id")?;
    let tours = state.tours.clone();
    let key = CacheKey::endpoint(&format!("{}/{}", TOURS_ENDPOINT, id));

    let body = state
        .cache
        .get_or_fetch(key, move || async move {
            let tour = tours
                .get_tour(id)
                .await
                .map_err(|e| e.to_string())?
                .filter(|t| t.is_active);
            serde_json::to_value(tour).map_err(|e| e.to_string())
        })
        .await
        .map_err(AppError::UpstreamError)?;

    if body.is_null() {
        return Err(AppError::NotFoundError(format!("Tour {} not found", id)));
    }
    Ok(Json(body))
}

/// GET /api/shifts
pub async fn list_shifts(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let shifts = state.shifts.clone();
    let body = state
        .cache
        .get_or_fetch(CacheKey::endpoint(SHIFTS_ENDPOINT), move || async move {
            let shifts = shifts.list_shifts(false).await.map_err(|e| e.to_string())?;
            serde_json::to_value(shifts).map_err(|e| e.to_string())
        })
        .await
        .map_err(AppError::UpstreamError)?;

    Ok(Json(body))
}
