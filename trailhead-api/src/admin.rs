use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use axum_extra::extract::WithRejection;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use trailhead_booking::BookingDetailsView;
use trailhead_core::repository::ReservationFilter;
use trailhead_core::{
    BookingStatus, Difficulty, ItineraryEntry, Reservation, Shift, ShiftType, Specialty, Tour,
};
use trailhead_store::CacheKey;
use uuid::Uuid;

use crate::bookings::parse_id;
use crate::error::{AppError, JsonBody, QueryParams};
use crate::middleware::AdminClaims;
use crate::state::AppState;
use crate::tours::{SHIFTS_ENDPOINT, TOURS_ENDPOINT};

// ============================================================================
// Request Types
// ============================================================================

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct TourRequest {
    pub title: String,
    pub description: Option<String>,
    pub base_price_cents: i64,
    pub duration: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub itinerary: Vec<ItineraryEntry>,
    #[serde(default)]
    pub specialties: Vec<Specialty>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl TourRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::ValidationError("title is required".to_string()));
        }
        if self.base_price_cents < 0 {
            return Err(AppError::ValidationError("base_price_cents must not be negative".to_string()));
        }
        if let Some(bad) = self
            .specialties
            .iter()
            .find(|s| s.name.trim().is_empty() || s.price_cents < 0)
        {
            return Err(AppError::ValidationError(format!(
                "Invalid specialty '{}': a name and a non-negative price are required",
                bad.name
            )));
        }
        Ok(())
    }

    fn apply(self, tour: &mut Tour) {
        tour.title = self.title.trim().to_string();
        tour.description = self.description;
        tour.base_price_cents = self.base_price_cents;
        tour.duration = self.duration;
        tour.difficulty = self.difficulty;
        tour.itinerary = self.itinerary;
        tour.specialties = self.specialties;
        tour.is_active = self.is_active;
        tour.updated_at = Utc::now();
    }
}

#[derive(Debug, Deserialize)]
pub struct ShiftRequest {
    pub name: String,
    pub shift_type: ShiftType,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn parse_time(raw: Option<&str>, field: &str) -> Result<Option<NaiveTime>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map(Some)
        .map_err(|_| AppError::ValidationError(format!("Invalid {}: {} (expected HH:MM)", field, raw)))
}

impl ShiftRequest {
    fn into_shift(self, id: Uuid) -> Result<Shift, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("name is required".to_string()));
        }
        let start_time = parse_time(self.start_time.as_deref(), "start_time")?;
        let end_time = parse_time(self.end_time.as_deref(), "end_time")?;
        if let (Some(start), Some(end)) = (start_time, end_time) {
            if start >= end {
                return Err(AppError::ValidationError("start_time must be before end_time".to_string()));
            }
        }

        Ok(Shift {
            id,
            name: name.to_string(),
            shift_type: self.shift_type,
            start_time,
            end_time,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    pub date: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl BookingListQuery {
    fn into_filter(self) -> Result<ReservationFilter, AppError> {
        let tour_date = self
            .date
            .as_deref()
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d")
                    .map_err(|_| AppError::ValidationError(format!("Invalid date: {}", d)))
            })
            .transpose()?;
        let booking_status = self
            .status
            .as_deref()
            .map(|s| s.parse::<BookingStatus>().map_err(|e| AppError::ValidationError(e.to_string())))
            .transpose()?;

        Ok(ReservationFilter {
            tour_date,
            booking_status,
            include_deleted: self.include_deleted,
        })
    }
}

// ============================================================================
// Tours
// ============================================================================

/// GET /api/admin/tours
/// Includes inactive tours.
pub async fn list_tours(State(state): State<AppState>) -> Result<Json<Vec<Tour>>, AppError> {
    Ok(Json(state.tours.list_tours(true).await?))
}

/// POST /api/admin/tours
pub async fn create_tour(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminClaims>,
    WithRejection(Json(req), _): JsonBody<TourRequest>,
) -> Result<(StatusCode, Json<Tour>), AppError> {
    req.validate()?;
    let mut tour = Tour::new(req.title.trim(), req.base_price_cents);
    req.apply(&mut tour);

    state.tours.create_tour(&tour).await?;
    state.cache.invalidate_prefix(TOURS_ENDPOINT);

    tracing::info!(admin = %admin.sub, tour_id = %tour.id, "Tour created");
    Ok((StatusCode::CREATED, Json(tour)))
}

/// PUT /api/admin/tours/{id}
pub async fn update_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
    WithRejection(Json(req), _): JsonBody<TourRequest>,
) -> Result<Json<Tour>, AppError> {
    let id = parse_id(&id, "tour id")?;
    req.validate()?;

    let mut tour = state
        .tours
        .get_tour(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Tour {} not found", id)))?;
    req.apply(&mut tour);

    if !state.tours.update_tour(&tour).await? {
        return Err(AppError::NotFoundError(format!("Tour {} not found", id)));
    }
    state.cache.invalidate_prefix(TOURS_ENDPOINT);

    tracing::info!(tour_id = %id, "Tour updated");
    Ok(Json(tour))
}

/// DELETE /api/admin/tours/{id}
/// Reservations keep pointing at the tour, so it is only hidden.
pub async fn deactivate_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id, "tour id")?;
    if !state.tours.deactivate_tour(id).await? {
        return Err(AppError::NotFoundError(format!("Tour {} not found", id)));
    }
    state.cache.invalidate_prefix(TOURS_ENDPOINT);

    tracing::info!(tour_id = %id, "Tour deactivated");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Shifts
// ============================================================================

/// GET /api/admin/shifts
pub async fn list_shifts(State(state): State<AppState>) -> Result<Json<Vec<Shift>>, AppError> {
    Ok(Json(state.shifts.list_shifts(true).await?))
}

/// POST /api/admin/shifts
pub async fn create_shift(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<ShiftRequest>,
) -> Result<(StatusCode, Json<Shift>), AppError> {
    let shift = req.into_shift(Uuid::new_v4())?;

    state.shifts.create_shift(&shift).await?;
    state.cache.invalidate(&CacheKey::endpoint(SHIFTS_ENDPOINT));

    tracing::info!(shift_id = %shift.id, shift_type = %shift.shift_type, "Shift created");
    Ok((StatusCode::CREATED, Json(shift)))
}

/// PUT /api/admin/shifts/{id}
pub async fn update_shift(
    State(state): State<AppState>,
    Path(id): Path<String>,
    WithRejection(Json(req), _): JsonBody<ShiftRequest>,
) -> Result<Json<Shift>, AppError> {
    let id = parse_id(&id, "shift id")?;
    let shift = req.into_shift(id)?;

    if !state.shifts.update_shift(&shift).await? {
        return Err(AppError::NotFoundError(format!("Shift {} not found", id)));
    }
    state.cache.invalidate(&CacheKey::endpoint(SHIFTS_ENDPOINT));

    tracing::info!(shift_id = %id, "Shift updated");
    Ok(Json(shift))
}

// ============================================================================
// Bookings
// ============================================================================

/// GET /api/admin/bookings?date=&status=
pub async fn list_bookings(
    State(state): State<AppState>,
    WithRejection(Query(query), _): QueryParams<BookingListQuery>,
) -> Result<Json<Vec<Reservation>>, AppError> {
    let filter = query.into_filter()?;
    Ok(Json(state.reservations.list_reservations(&filter).await?))
}

/// GET /api/admin/bookings/{id}
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingDetailsView>, AppError> {
    let id = parse_id(&id, "booking id")?;
    Ok(Json(state.queries.booking_details(id, None).await?))
}

/// POST /api/admin/bookings/{id}/cancel
/// Frees the slot. Refunds are issued in the payment provider's dashboard.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminClaims>,
    Path(id): Path<String>,
) -> Result<Json<Reservation>, AppError> {
    let id = parse_id(&id, "booking id")?;

    state
        .reservations
        .get_reservation(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Booking {} not found", id)))?;

    if !state.reservations.cancel_reservation(id).await? {
        return Err(AppError::ConflictError(format!("Booking {} is already cancelled", id)));
    }

    let cancelled = state
        .reservations
        .get_reservation(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Booking {} not found", id)))?;

    if cancelled.payment_status == trailhead_core::PaymentStatus::Succeeded {
        tracing::warn!(admin = %admin.sub, booking_id = %id, "Cancelled a paid booking; refund it manually");
    } else {
        tracing::info!(admin = %admin.sub, booking_id = %id, "Booking cancelled");
    }
    Ok(Json(cancelled))
}

/// DELETE /api/admin/bookings/{id}
pub async fn delete_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id, "booking id")?;
    if !state.reservations.soft_delete_reservation(id).await? {
        return Err(AppError::NotFoundError(format!("Booking {} not found", id)));
    }

    tracing::info!(booking_id = %id, "Booking deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift_request(start: Option<&str>, end: Option<&str>) -> ShiftRequest {
        ShiftRequest {
            name: "Morning".into(),
            shift_type: ShiftType::Hourly,
            start_time: start.map(String::from),
            end_time: end.map(String::from),
            is_active: true,
        }
    }

    #[test]
    fn test_shift_time_formats() {
        let shift = shift_request(Some("09:00"), Some("12:30:00")).into_shift(Uuid::nil()).unwrap();
        assert_eq!(shift.time_label().as_deref(), Some("09:00 - 12:30"));

        assert!(shift_request(Some("9am"), None).into_shift(Uuid::nil()).is_err());
        assert!(shift_request(Some("12:00"), Some("09:00")).into_shift(Uuid::nil()).is_err());
    }

    #[test]
    fn test_booking_filter_parsing() {
        let filter = BookingListQuery {
            date: Some("2026-05-01".into()),
            status: Some("confirmed".into()),
            include_deleted: false,
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.booking_status, Some(BookingStatus::Confirmed));
        assert_eq!(filter.tour_date, NaiveDate::from_ymd_opt(2026, 5, 1));

        let bad = BookingListQuery {
            date: None,
            status: Some("refunded".into()),
            include_deleted: false,
        };
        assert!(bad.into_filter().is_err());
    }

    #[test]
    fn test_tour_request_rejects_negative_specialty() {
        let req: TourRequest = serde_json::from_value(serde_json::json!({
            "title": "Harbor Lights Walk",
            "base_price_cents": 10000,
            "specialties": [{"name": "Soup", "price_cents": -5}]
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }
}
