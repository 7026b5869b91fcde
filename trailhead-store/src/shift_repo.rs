use async_trait::async_trait;
use chrono::NaiveTime;
use sqlx::PgPool;
use uuid::Uuid;
use trailhead_core::repository::{BoxError, ShiftRepository};
use trailhead_core::{Shift, ShiftType};

pub struct StoreShiftRepository {
    pool: PgPool,
}

impl StoreShiftRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ShiftRow {
    id: Uuid,
    name: String,
    shift_type: String,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    is_active: bool,
}

impl TryFrom<ShiftRow> for Shift {
    type Error = BoxError;

    fn try_from(row: ShiftRow) -> Result<Self, Self::Error> {
        Ok(Shift {
            id: row.id,
            name: row.name,
            shift_type: row.shift_type.parse::<ShiftType>()?,
            start_time: row.start_time,
            end_time: row.end_time,
            is_active: row.is_active,
        })
    }
}

#[async_trait]
impl ShiftRepository for StoreShiftRepository {
    async fn get_shift(&self, id: Uuid) -> Result<Option<Shift>, BoxError> {
        let row: Option<ShiftRow> = sqlx::query_as(
            "SELECT id, name, shift_type, start_time, end_time, is_active FROM shifts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Shift::try_from).transpose()
    }

    async fn list_shifts(&self, include_inactive: bool) -> Result<Vec<Shift>, BoxError> {
        let rows: Vec<ShiftRow> = sqlx::query_as(
            "SELECT id, name, shift_type, start_time, end_time, is_active FROM shifts \
             WHERE is_active OR $1 ORDER BY start_time NULLS FIRST, name",
        )
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Shift::try_from).collect()
    }

    async fn create_shift(&self, shift: &Shift) -> Result<(), BoxError> {
        sqlx::query(
            "INSERT INTO shifts (id, name, shift_type, start_time, end_time, is_active) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(shift.id)
        .bind(&shift.name)
        .bind(shift.shift_type.as_str())
        .bind(shift.start_time)
        .bind(shift.end_time)
        .bind(shift.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_shift(&self, shift: &Shift) -> Result<bool, BoxError> {
        let result = sqlx::query(
            "UPDATE shifts SET name = $2, shift_type = $3, start_time = $4, end_time = $5, is_active = $6 WHERE id = $1",
        )
        .bind(shift.id)
        .bind(&shift.name)
        .bind(shift.shift_type.as_str())
        .bind(shift.start_time)
        .bind(shift.end_time)
        .bind(shift.is_active)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
