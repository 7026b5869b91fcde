use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use trailhead_core::repository::{BoxError, TourRepository};
use trailhead_core::{Difficulty, ItineraryEntry, Specialty, Tour};

pub struct StoreTourRepository {
    pool: PgPool,
}

impl StoreTourRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TOUR_COLUMNS: &str = "id, title, description, base_price_cents, duration, difficulty, \
    itinerary, specialties, is_active, created_at, updated_at";

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct TourRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    base_price_cents: i64,
    duration: Option<String>,
    difficulty: String,
    itinerary: Json<Vec<ItineraryEntry>>,
    specialties: Json<Vec<Specialty>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TourRow> for Tour {
    fn from(row: TourRow) -> Self {
        Tour {
            id: row.id,
            title: row.title,
            description: row.description,
            base_price_cents: row.base_price_cents,
            duration: row.duration,
            difficulty: Difficulty::from_stored(&row.difficulty),
            itinerary: row.itinerary.0,
            specialties: row.specialties.0,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl TourRepository for StoreTourRepository {
    async fn get_tour(&self, id: Uuid) -> Result<Option<Tour>, BoxError> {
        let row: Option<TourRow> = sqlx::query_as(&format!("SELECT {TOUR_COLUMNS} FROM tours WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Tour::from))
    }

    async fn list_tours(&self, include_inactive: bool) -> Result<Vec<Tour>, BoxError> {
        let rows: Vec<TourRow> = sqlx::query_as(&format!(
            "SELECT {TOUR_COLUMNS} FROM tours WHERE is_active OR $1 ORDER BY title"
        ))
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Tour::from).collect())
    }

    async fn create_tour(&self, tour: &Tour) -> Result<(), BoxError> {
        sqlx::query(
            r#"
            INSERT INTO tours (id, title, description, base_price_cents, duration, difficulty, itinerary, specialties, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(tour.id)
        .bind(&tour.title)
        .bind(&tour.description)
        .bind(tour.base_price_cents)
        .bind(&tour.duration)
        .bind(tour.difficulty.as_str())
        .bind(Json(&tour.itinerary))
        .bind(Json(&tour.specialties))
        .bind(tour.is_active)
        .bind(tour.created_at)
        .bind(tour.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_tour(&self, tour: &Tour) -> Result<bool, BoxError> {
        let result = sqlx::query(
            r#"
            UPDATE tours
            SET title = $2, description = $3, base_price_cents = $4, duration = $5, difficulty = $6,
                itinerary = $7, specialties = $8, is_active = $9, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(tour.id)
        .bind(&tour.title)
        .bind(&tour.description)
        .bind(tour.base_price_cents)
        .bind(&tour.duration)
        .bind(tour.difficulty.as_str())
        .bind(Json(&tour.itinerary))
        .bind(Json(&tour.specialties))
        .bind(tour.is_active)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_tour(&self, id: Uuid) -> Result<bool, BoxError> {
        let result = sqlx::query("UPDATE tours SET is_active = FALSE, updated_at = NOW() WHERE id = $1 AND is_active")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
