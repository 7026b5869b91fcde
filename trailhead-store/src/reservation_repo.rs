use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use trailhead_core::availability::{evaluate, BookedSlot};
use trailhead_core::repository::{
    BoxError, ConfirmOutcome, PaymentConfirmation, ReservationFilter, ReservationRepository,
};
use trailhead_core::{BookingStatus, PaymentDetails, Reservation, ShiftType, Specialty};

pub struct StoreReservationRepository {
    pool: PgPool,
}

impl StoreReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RESERVATION_COLUMNS: &str = "id, tour_id, shift_id, tour_date, booking_status, payment_status, \
    total_price_cents, guest_number, addons, customer_name, customer_email, additional_info, \
    is_deleted, stripe_session_id, stripe_payment_intent_id, payment_details, created_at, updated_at";

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    tour_id: Uuid,
    shift_id: Uuid,
    tour_date: NaiveDate,
    booking_status: String,
    payment_status: String,
    total_price_cents: i64,
    guest_number: i32,
    addons: Json<Vec<Specialty>>,
    customer_name: String,
    customer_email: String,
    additional_info: Option<String>,
    is_deleted: bool,
    stripe_session_id: Option<String>,
    stripe_payment_intent_id: Option<String>,
    payment_details: Option<Json<PaymentDetails>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = BoxError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: row.id,
            tour_id: row.tour_id,
            shift_id: row.shift_id,
            tour_date: row.tour_date,
            booking_status: row.booking_status.parse()?,
            payment_status: row.payment_status.parse()?,
            total_price_cents: row.total_price_cents,
            guest_number: u32::try_from(row.guest_number)?,
            addons: row.addons.0,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            additional_info: row.additional_info,
            is_deleted: row.is_deleted,
            stripe_session_id: row.stripe_session_id,
            stripe_payment_intent_id: row.stripe_payment_intent_id,
            payment_details: row.payment_details.map(|d| d.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookedSlotRow {
    id: Uuid,
    shift_id: Uuid,
    shift_type: String,
}

async fn booked_slots<'e, E>(executor: E, date: NaiveDate) -> Result<Vec<BookedSlot>, BoxError>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows: Vec<BookedSlotRow> = sqlx::query_as(
        r#"
        SELECT b.id, b.shift_id, s.shift_type
        FROM bookings b
        JOIN shifts s ON s.id = b.shift_id
        WHERE b.tour_date = $1 AND b.booking_status = 'confirmed' AND NOT b.is_deleted
        "#,
    )
    .bind(date)
    .fetch_all(executor)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(BookedSlot {
                reservation_id: row.id,
                shift_id: row.shift_id,
                shift_type: row.shift_type.parse::<ShiftType>()?,
            })
        })
        .collect()
}

#[async_trait]
impl ReservationRepository for StoreReservationRepository {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), BoxError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, tour_id, shift_id, tour_date, booking_status, payment_status, total_price_cents,
                                  guest_number, addons, customer_name, customer_email, additional_info, is_deleted,
                                  stripe_session_id, stripe_payment_intent_id, payment_details, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.tour_id)
        .bind(reservation.shift_id)
        .bind(reservation.tour_date)
        .bind(reservation.booking_status.as_str())
        .bind(reservation.payment_status.as_str())
        .bind(reservation.total_price_cents)
        .bind(i32::try_from(reservation.guest_number)?)
        .bind(Json(&reservation.addons))
        .bind(&reservation.customer_name)
        .bind(&reservation.customer_email)
        .bind(&reservation.additional_info)
        .bind(reservation.is_deleted)
        .bind(&reservation.stripe_session_id)
        .bind(&reservation.stripe_payment_intent_id)
        .bind(reservation.payment_details.as_ref().map(Json))
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, BoxError> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM bookings WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Reservation::try_from).transpose()
    }

    async fn attach_checkout_session(&self, id: Uuid, session_id: &str) -> Result<bool, BoxError> {
        let result = sqlx::query("UPDATE bookings SET stripe_session_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn booked_slots_on(&self, date: NaiveDate) -> Result<Vec<BookedSlot>, BoxError> {
        booked_slots(&self.pool, date).await
    }

    async fn confirm_payment(
        &self,
        id: Uuid,
        confirmation: &PaymentConfirmation,
    ) -> Result<ConfirmOutcome, BoxError> {
        let mut tx = self.pool.begin().await?;

        // Row lock: a second confirmation of the same booking waits here and
        // then sees it already confirmed.
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(ConfirmOutcome::NotFound);
        };
        let current = Reservation::try_from(row)?;

        if current.booking_status == BookingStatus::Confirmed {
            return Ok(ConfirmOutcome::AlreadyConfirmed(current));
        }
        if current.is_deleted || !current.booking_status.is_confirmable() {
            return Ok(ConfirmOutcome::NotConfirmable(current));
        }

        // Date lock: confirmations for different shifts on the same date are
        // serialized so the whole-day rule cannot be raced.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("bookings:{}", current.tour_date))
            .execute(&mut *tx)
            .await?;

        let shift_type: String = sqlx::query_scalar("SELECT shift_type FROM shifts WHERE id = $1")
            .bind(current.shift_id)
            .fetch_one(&mut *tx)
            .await?;
        let shift_type = shift_type.parse::<ShiftType>()?;

        let booked = booked_slots(&mut *tx, current.tour_date).await?;
        let intent_id = confirmation.payment_intent_id.as_deref();
        let details = confirmation.details.as_ref().map(Json);

        if let Some(conflict) = evaluate(current.shift_id, shift_type, &booked) {
            let row: ReservationRow = sqlx::query_as(&format!(
                r#"
                UPDATE bookings
                SET payment_status = 'succeeded',
                    stripe_payment_intent_id = COALESCE($2, stripe_payment_intent_id),
                    payment_details = COALESCE($3, payment_details),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {RESERVATION_COLUMNS}
                "#
            ))
            .bind(id)
            .bind(intent_id)
            .bind(details)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;

            return Ok(ConfirmOutcome::SlotTaken {
                reservation: Reservation::try_from(row)?,
                conflict,
            });
        }

        let row: ReservationRow = sqlx::query_as(&format!(
            r#"
            UPDATE bookings
            SET booking_status = 'confirmed',
                payment_status = 'succeeded',
                stripe_payment_intent_id = COALESCE($2, stripe_payment_intent_id),
                payment_details = COALESCE($3, payment_details),
                customer_name = CASE WHEN customer_name = '' THEN COALESCE($4, customer_name) ELSE customer_name END,
                customer_email = CASE WHEN customer_email = '' THEN COALESCE($5, customer_email) ELSE customer_email END,
                updated_at = NOW()
            WHERE id = $1 AND booking_status IN ('pending', 'expired') AND NOT is_deleted
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(intent_id)
        .bind(details)
        .bind(confirmation.customer_name.as_deref())
        .bind(confirmation.customer_email.as_deref())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(ConfirmOutcome::Confirmed(Reservation::try_from(row)?))
    }

    async fn mark_payment_failed(&self, id: Uuid) -> Result<bool, BoxError> {
        let result = sqlx::query(
            "UPDATE bookings SET payment_status = 'failed', updated_at = NOW() WHERE id = $1 AND payment_status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn expire_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, BoxError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings SET booking_status = 'expired', updated_at = NOW()
            WHERE booking_status = 'pending' AND payment_status = 'pending' AND NOT is_deleted AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, BoxError> {
        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {RESERVATION_COLUMNS} FROM bookings WHERE TRUE"));
        if !filter.include_deleted {
            query.push(" AND NOT is_deleted");
        }
        if let Some(date) = filter.tour_date {
            query.push(" AND tour_date = ").push_bind(date);
        }
        if let Some(status) = filter.booking_status {
            query.push(" AND booking_status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY tour_date DESC, created_at DESC");

        let rows: Vec<ReservationRow> = query.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn cancel_reservation(&self, id: Uuid) -> Result<bool, BoxError> {
        let result = sqlx::query(
            "UPDATE bookings SET booking_status = 'cancelled', updated_at = NOW() \
             WHERE id = $1 AND NOT is_deleted AND booking_status <> 'cancelled'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete_reservation(&self, id: Uuid) -> Result<bool, BoxError> {
        let result = sqlx::query("UPDATE bookings SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1 AND NOT is_deleted")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
