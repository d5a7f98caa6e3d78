use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use skybook_core::booking::{
    Booking, BookingExtra, BookingHistory, BookingPassenger, BookingSegment, BookingTotals,
    PaymentRecord,
};
use skybook_core::fare::{CabinFare, DynamicPricingRule, PriceAdjustment, Promotion, SeasonalPricing};
use skybook_core::flight::{Aircraft, AircraftSeat, CabinClass, Flight};
use skybook_core::repository::{
    BookingRepository, FareRepository, FlightRepository, SeatRepository, UnitOfWork,
};
use skybook_core::seat::{FlightSeat, PassengerSeat};
use skybook_core::{Change, ChangeSet, StoreError, StoreResult};
use skybook_shared::Masked;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres-backed `Store`. Change sets run in one transaction; versioned
/// updates that match no row abort it with `StoreError::Conflict`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn db_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

fn parse<T>(value: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = skybook_core::UnknownVariant>,
{
    Ok(value.parse::<T>()?)
}

fn adjustment(kind: &str, value: f64) -> StoreResult<PriceAdjustment> {
    match kind {
        "PERCENTAGE" => Ok(PriceAdjustment::Percentage(value)),
        "FIXED" => Ok(PriceAdjustment::Fixed(value.round() as i32)),
        other => Err(StoreError::Corrupt(format!("Unknown adjustment kind: {}", other))),
    }
}

fn adjustment_parts(adjustment: &PriceAdjustment) -> (&'static str, f64) {
    match adjustment {
        PriceAdjustment::Percentage(pct) => ("PERCENTAGE", *pct),
        PriceAdjustment::Fixed(amount) => ("FIXED", *amount as f64),
    }
}

// Row structs

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: Uuid,
    flight_number: String,
    airline_code: String,
    origin: String,
    destination: String,
    aircraft_id: Uuid,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    status: String,
    version: i32,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FlightRow> for Flight {
    type Error = StoreError;

    fn try_from(row: FlightRow) -> StoreResult<Self> {
        Ok(Flight {
            id: row.id,
            flight_number: row.flight_number,
            airline_code: row.airline_code,
            origin: row.origin,
            destination: row.destination,
            aircraft_id: row.aircraft_id,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            status: parse(&row.status)?,
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AircraftRow {
    id: Uuid,
    model: String,
    registration: String,
    total_seats: i32,
}

#[derive(sqlx::FromRow)]
struct AircraftSeatRow {
    id: Uuid,
    aircraft_id: Uuid,
    seat_number: String,
    cabin_class: String,
    base_fee_nuc: i32,
}

#[derive(sqlx::FromRow)]
struct FlightSeatRow {
    id: Uuid,
    flight_id: Uuid,
    seat_id: Uuid,
    seat_number: String,
    cabin_class: String,
    status: String,
    lock_owner: Option<String>,
    lock_expires_at: Option<DateTime<Utc>>,
    booking_id: Option<Uuid>,
    base_fee_nuc: i32,
    price_override_nuc: Option<i32>,
    version: i32,
    updated_at: DateTime<Utc>,
    updated_by: Option<String>,
}

impl TryFrom<FlightSeatRow> for FlightSeat {
    type Error = StoreError;

    fn try_from(row: FlightSeatRow) -> StoreResult<Self> {
        Ok(FlightSeat {
            id: row.id,
            flight_id: row.flight_id,
            seat_id: row.seat_id,
            seat_number: row.seat_number,
            cabin_class: parse(&row.cabin_class)?,
            status: parse(&row.status)?,
            lock_owner: row.lock_owner,
            lock_expires_at: row.lock_expires_at,
            booking_id: row.booking_id,
            base_fee_nuc: row.base_fee_nuc,
            price_override_nuc: row.price_override_nuc,
            version: row.version,
            updated_at: row.updated_at,
            updated_by: row.updated_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PassengerSeatRow {
    id: Uuid,
    booking_id: Uuid,
    passenger_id: Uuid,
    segment_id: Uuid,
    flight_seat_id: Uuid,
    seat_number: String,
    fee_nuc: i32,
    created_at: DateTime<Utc>,
}

impl From<PassengerSeatRow> for PassengerSeat {
    fn from(row: PassengerSeatRow) -> Self {
        PassengerSeat {
            id: row.id,
            booking_id: row.booking_id,
            passenger_id: row.passenger_id,
            segment_id: row.segment_id,
            flight_seat_id: row.flight_seat_id,
            seat_number: row.seat_number,
            fee_nuc: row.fee_nuc,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    user_id: String,
    status: String,
    payment_status: String,
    currency: String,
    base_fare_nuc: i32,
    tax_nuc: i32,
    service_fee_nuc: i32,
    seat_selection_fees_nuc: i32,
    extras_fees_nuc: i32,
    discount_nuc: i32,
    total_nuc: i32,
    expires_at: Option<DateTime<Utc>>,
    promotion_code: Option<String>,
    cancellation_reason: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    updated_by: Option<String>,
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    passenger_type: String,
    email: Option<String>,
}

#[derive(sqlx::FromRow)]
struct SegmentRow {
    id: Uuid,
    flight_id: Uuid,
    cabin_class: String,
    departure_time: DateTime<Utc>,
    fare_nuc: i32,
}

#[derive(sqlx::FromRow)]
struct ExtraRow {
    id: Uuid,
    booking_id: Uuid,
    segment_id: Option<Uuid>,
    passenger_id: Option<Uuid>,
    amenity_id: Option<Uuid>,
    extra_type: String,
    description: String,
    unit_price_nuc: i32,
    quantity: i32,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    booking_id: Uuid,
    action: String,
    old_value: Option<Value>,
    new_value: Option<Value>,
    actor: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    kind: String,
    amount_nuc: i32,
    method: String,
    transaction_reference: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CabinFareRow {
    flight_id: Uuid,
    cabin_class: String,
    base_fare_nuc: i32,
    currency: String,
}

#[derive(sqlx::FromRow)]
struct PricingRuleRow {
    id: Uuid,
    name: String,
    cabin_class: Option<String>,
    valid_from: Option<NaiveDate>,
    valid_to: Option<NaiveDate>,
    days_of_week: Vec<i32>,
    min_load_factor: Option<f64>,
    min_days_before_departure: Option<i64>,
    max_days_before_departure: Option<i64>,
    adjustment_kind: String,
    adjustment_value: f64,
    priority: i32,
    is_active: bool,
}

impl TryFrom<PricingRuleRow> for DynamicPricingRule {
    type Error = StoreError;

    fn try_from(row: PricingRuleRow) -> StoreResult<Self> {
        Ok(DynamicPricingRule {
            id: row.id,
            name: row.name,
            cabin_class: row.cabin_class.as_deref().map(parse).transpose()?,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            days_of_week: row.days_of_week.into_iter().map(|d| d as u32).collect(),
            min_load_factor: row.min_load_factor,
            min_days_before_departure: row.min_days_before_departure,
            max_days_before_departure: row.max_days_before_departure,
            adjustment: adjustment(&row.adjustment_kind, row.adjustment_value)?,
            priority: row.priority,
            is_active: row.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeasonRow {
    id: Uuid,
    name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    multiplier: f64,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct PromotionRow {
    id: Uuid,
    code: String,
    description: String,
    discount_kind: String,
    discount_value: f64,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    usage_limit: Option<i32>,
    used_count: i32,
    min_purchase_nuc: i32,
    is_active: bool,
    version: i32,
}

impl TryFrom<PromotionRow> for Promotion {
    type Error = StoreError;

    fn try_from(row: PromotionRow) -> StoreResult<Self> {
        Ok(Promotion {
            id: row.id,
            code: row.code,
            description: row.description,
            discount: adjustment(&row.discount_kind, row.discount_value)?,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            usage_limit: row.usage_limit,
            used_count: row.used_count,
            min_purchase_nuc: row.min_purchase_nuc,
            is_active: row.is_active,
            version: row.version,
        })
    }
}

const FLIGHT_SEAT_COLUMNS: &str = "id, flight_id, seat_id, seat_number, cabin_class, status, \
    lock_owner, lock_expires_at, booking_id, base_fee_nuc, price_override_nuc, version, \
    updated_at, updated_by";

const BOOKING_COLUMNS: &str = "id, reference, user_id, status, payment_status, currency, \
    base_fare_nuc, tax_nuc, service_fee_nuc, seat_selection_fees_nuc, extras_fees_nuc, \
    discount_nuc, total_nuc, expires_at, promotion_code, cancellation_reason, version, \
    created_at, updated_at, updated_by";

impl PostgresStore {
    async fn hydrate_booking(&self, row: BookingRow) -> StoreResult<Booking> {
        let passengers = sqlx::query_as::<_, PassengerRow>(
            "SELECT id, first_name, last_name, passenger_type, email \
             FROM booking_passengers WHERE booking_id = $1 ORDER BY position",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let segments = sqlx::query_as::<_, SegmentRow>(
            "SELECT id, flight_id, cabin_class, departure_time, fare_nuc \
             FROM booking_segments WHERE booking_id = $1 ORDER BY position",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let totals = BookingTotals::from_parts(
            row.base_fare_nuc,
            row.tax_nuc,
            row.service_fee_nuc,
            row.seat_selection_fees_nuc,
            row.extras_fees_nuc,
            row.discount_nuc,
            row.total_nuc,
        )?;

        let passengers = passengers
            .into_iter()
            .map(|p| {
                Ok(BookingPassenger {
                    id: p.id,
                    first_name: p.first_name,
                    last_name: p.last_name,
                    passenger_type: parse(&p.passenger_type)?,
                    email: p.email.map(Masked::new),
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let segments = segments
            .into_iter()
            .map(|s| {
                Ok(BookingSegment {
                    id: s.id,
                    flight_id: s.flight_id,
                    cabin_class: parse(&s.cabin_class)?,
                    departure_time: s.departure_time,
                    fare_nuc: s.fare_nuc,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Booking {
            id: row.id,
            reference: row.reference,
            user_id: row.user_id,
            status: parse(&row.status)?,
            payment_status: parse(&row.payment_status)?,
            currency: row.currency,
            totals,
            expires_at: row.expires_at,
            passengers,
            segments,
            promotion_code: row.promotion_code,
            cancellation_reason: row.cancellation_reason,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            updated_by: row.updated_by,
        })
    }

    async fn hydrate_bookings(&self, rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            bookings.push(self.hydrate_booking(row).await?);
        }
        Ok(bookings)
    }
}

#[async_trait]
impl FlightRepository for PostgresStore {
    async fn get_flight(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        let row = sqlx::query_as::<_, FlightRow>(
            "SELECT id, flight_number, airline_code, origin, destination, aircraft_id, \
             departure_time, arrival_time, status, version, updated_at FROM flights WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Flight::try_from).transpose()
    }

    async fn get_aircraft(&self, id: Uuid) -> StoreResult<Option<Aircraft>> {
        let row = sqlx::query_as::<_, AircraftRow>(
            "SELECT id, model, registration, total_seats FROM aircraft WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(|r| Aircraft {
            id: r.id,
            model: r.model,
            registration: r.registration,
            total_seats: r.total_seats,
        }))
    }

    async fn list_aircraft_seats(&self, aircraft_id: Uuid) -> StoreResult<Vec<AircraftSeat>> {
        let rows = sqlx::query_as::<_, AircraftSeatRow>(
            "SELECT id, aircraft_id, seat_number, cabin_class, base_fee_nuc \
             FROM aircraft_seats WHERE aircraft_id = $1 ORDER BY seat_number",
        )
        .bind(aircraft_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|r| {
                Ok(AircraftSeat {
                    id: r.id,
                    aircraft_id: r.aircraft_id,
                    seat_number: r.seat_number,
                    cabin_class: parse(&r.cabin_class)?,
                    base_fee_nuc: r.base_fee_nuc,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SeatRepository for PostgresStore {
    async fn get_flight_seat(&self, id: Uuid) -> StoreResult<Option<FlightSeat>> {
        let sql = format!("SELECT {} FROM flight_seats WHERE id = $1", FLIGHT_SEAT_COLUMNS);
        let row = sqlx::query_as::<_, FlightSeatRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(FlightSeat::try_from).transpose()
    }

    async fn find_flight_seat(
        &self,
        flight_id: Uuid,
        seat_id: Uuid,
    ) -> StoreResult<Option<FlightSeat>> {
        let sql = format!(
            "SELECT {} FROM flight_seats WHERE flight_id = $1 AND seat_id = $2",
            FLIGHT_SEAT_COLUMNS
        );
        let row = sqlx::query_as::<_, FlightSeatRow>(&sql)
            .bind(flight_id)
            .bind(seat_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(FlightSeat::try_from).transpose()
    }

    async fn list_flight_seats(&self, flight_id: Uuid) -> StoreResult<Vec<FlightSeat>> {
        let sql = format!(
            "SELECT {} FROM flight_seats WHERE flight_id = $1 ORDER BY seat_number",
            FLIGHT_SEAT_COLUMNS
        );
        let rows = sqlx::query_as::<_, FlightSeatRow>(&sql)
            .bind(flight_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(FlightSeat::try_from).collect()
    }

    async fn find_passenger_seat(
        &self,
        passenger_id: Uuid,
        segment_id: Uuid,
    ) -> StoreResult<Option<PassengerSeat>> {
        let row = sqlx::query_as::<_, PassengerSeatRow>(
            "SELECT id, booking_id, passenger_id, segment_id, flight_seat_id, seat_number, fee_nuc, \
             created_at FROM passenger_seats WHERE passenger_id = $1 AND segment_id = $2",
        )
        .bind(passenger_id)
        .bind(segment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(PassengerSeat::from))
    }

    async fn list_expired_seat_locks(&self, now: DateTime<Utc>) -> StoreResult<Vec<FlightSeat>> {
        let sql = format!(
            "SELECT {} FROM flight_seats WHERE status = 'RESERVED' AND booking_id IS NULL \
             AND lock_expires_at <= $1 ORDER BY lock_expires_at",
            FLIGHT_SEAT_COLUMNS
        );
        let rows = sqlx::query_as::<_, FlightSeatRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(FlightSeat::try_from).collect()
    }
}

#[async_trait]
impl BookingRepository for PostgresStore {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => Ok(Some(self.hydrate_booking(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        self.hydrate_bookings(rows).await
    }

    async fn list_passenger_seats(&self, booking_id: Uuid) -> StoreResult<Vec<PassengerSeat>> {
        let rows = sqlx::query_as::<_, PassengerSeatRow>(
            "SELECT id, booking_id, passenger_id, segment_id, flight_seat_id, seat_number, fee_nuc, \
             created_at FROM passenger_seats WHERE booking_id = $1 ORDER BY created_at",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(PassengerSeat::from).collect())
    }

    async fn list_booking_extras(&self, booking_id: Uuid) -> StoreResult<Vec<BookingExtra>> {
        let rows = sqlx::query_as::<_, ExtraRow>(
            "SELECT id, booking_id, segment_id, passenger_id, amenity_id, extra_type, description, \
             unit_price_nuc, quantity, created_at FROM booking_extras WHERE booking_id = $1 \
             ORDER BY created_at",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|r| {
                Ok(BookingExtra {
                    id: r.id,
                    booking_id: r.booking_id,
                    segment_id: r.segment_id,
                    passenger_id: r.passenger_id,
                    amenity_id: r.amenity_id,
                    extra_type: parse(&r.extra_type)?,
                    description: r.description,
                    unit_price_nuc: r.unit_price_nuc,
                    quantity: r.quantity,
                    created_at: r.created_at,
                })
            })
            .collect()
    }

    async fn list_booking_history(&self, booking_id: Uuid) -> StoreResult<Vec<BookingHistory>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, booking_id, action, old_value, new_value, actor, created_at \
             FROM booking_history WHERE booking_id = $1 ORDER BY created_at, id",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|r| BookingHistory {
                id: r.id,
                booking_id: r.booking_id,
                action: r.action,
                old_value: r.old_value,
                new_value: r.new_value,
                actor: r.actor,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn list_payment_records(&self, booking_id: Uuid) -> StoreResult<Vec<PaymentRecord>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, booking_id, kind, amount_nuc, method, transaction_reference, created_at \
             FROM payment_records WHERE booking_id = $1 ORDER BY created_at",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|r| {
                Ok(PaymentRecord {
                    id: r.id,
                    booking_id: r.booking_id,
                    kind: parse(&r.kind)?,
                    amount_nuc: r.amount_nuc,
                    method: r.method,
                    transaction_reference: r.transaction_reference.map(Masked::new),
                    created_at: r.created_at,
                })
            })
            .collect()
    }

    async fn list_expired_pending_bookings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE status = 'PENDING' AND expires_at <= $1 \
             ORDER BY expires_at",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        self.hydrate_bookings(rows).await
    }
}

#[async_trait]
impl FareRepository for PostgresStore {
    async fn get_cabin_fare(
        &self,
        flight_id: Uuid,
        cabin_class: CabinClass,
    ) -> StoreResult<Option<CabinFare>> {
        let row = sqlx::query_as::<_, CabinFareRow>(
            "SELECT flight_id, cabin_class, base_fare_nuc, currency FROM cabin_fares \
             WHERE flight_id = $1 AND cabin_class = $2",
        )
        .bind(flight_id)
        .bind(cabin_class.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|r| {
            Ok(CabinFare {
                flight_id: r.flight_id,
                cabin_class: parse(&r.cabin_class)?,
                base_fare_nuc: r.base_fare_nuc,
                currency: r.currency,
            })
        })
        .transpose()
    }

    async fn list_pricing_rules(&self) -> StoreResult<Vec<DynamicPricingRule>> {
        let rows = sqlx::query_as::<_, PricingRuleRow>(
            "SELECT id, name, cabin_class, valid_from, valid_to, days_of_week, min_load_factor, \
             min_days_before_departure, max_days_before_departure, adjustment_kind, \
             adjustment_value, priority, is_active FROM pricing_rules WHERE is_active",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(DynamicPricingRule::try_from).collect()
    }

    async fn list_seasonal_pricing(&self) -> StoreResult<Vec<SeasonalPricing>> {
        let rows = sqlx::query_as::<_, SeasonRow>(
            "SELECT id, name, start_date, end_date, multiplier, is_active FROM seasonal_pricing \
             WHERE is_active",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|r| SeasonalPricing {
                id: r.id,
                name: r.name,
                start_date: r.start_date,
                end_date: r.end_date,
                multiplier: r.multiplier,
                is_active: r.is_active,
            })
            .collect())
    }

    async fn find_promotion_by_code(&self, code: &str) -> StoreResult<Option<Promotion>> {
        let row = sqlx::query_as::<_, PromotionRow>(
            "SELECT id, code, description, discount_kind, discount_value, valid_from, valid_to, \
             usage_limit, used_count, min_purchase_nuc, is_active, version FROM promotions \
             WHERE UPPER(code) = UPPER($1)",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Promotion::try_from).transpose()
    }
}

fn ensure_one_row(rows_affected: u64, entity: &str, id: Uuid) -> StoreResult<()> {
    if rows_affected != 1 {
        return Err(StoreError::Conflict(format!(
            "{} {} was modified concurrently",
            entity, id
        )));
    }
    Ok(())
}

async fn apply(tx: &mut Transaction<'_, Postgres>, change: Change) -> StoreResult<()> {
    match change {
        Change::UpdateFlight { flight, expected_version } => {
            let result = sqlx::query(
                "UPDATE flights SET status = $1, departure_time = $2, arrival_time = $3, \
                 version = $4, updated_at = $5 WHERE id = $6 AND version = $7",
            )
            .bind(flight.status.as_str())
            .bind(flight.departure_time)
            .bind(flight.arrival_time)
            .bind(flight.version)
            .bind(flight.updated_at)
            .bind(flight.id)
            .bind(expected_version)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
            ensure_one_row(result.rows_affected(), "Flight", flight.id)
        }
        Change::InsertFlightSeat(seat) => {
            sqlx::query(
                "INSERT INTO flight_seats (id, flight_id, seat_id, seat_number, cabin_class, status, \
                 lock_owner, lock_expires_at, booking_id, base_fee_nuc, price_override_nuc, version, \
                 updated_at, updated_by) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            )
            .bind(seat.id)
            .bind(seat.flight_id)
            .bind(seat.seat_id)
            .bind(&seat.seat_number)
            .bind(seat.cabin_class.as_str())
            .bind(seat.status.as_str())
            .bind(&seat.lock_owner)
            .bind(seat.lock_expires_at)
            .bind(seat.booking_id)
            .bind(seat.base_fee_nuc)
            .bind(seat.price_override_nuc)
            .bind(seat.version)
            .bind(seat.updated_at)
            .bind(&seat.updated_by)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
            Ok(())
        }
        Change::UpdateFlightSeat { seat, expected_version } => {
            let result = sqlx::query(
                "UPDATE flight_seats SET status = $1, lock_owner = $2, lock_expires_at = $3, \
                 booking_id = $4, price_override_nuc = $5, version = $6, updated_at = $7, \
                 updated_by = $8 WHERE id = $9 AND version = $10",
            )
            .bind(seat.status.as_str())
            .bind(&seat.lock_owner)
            .bind(seat.lock_expires_at)
            .bind(seat.booking_id)
            .bind(seat.price_override_nuc)
            .bind(seat.version)
            .bind(seat.updated_at)
            .bind(&seat.updated_by)
            .bind(seat.id)
            .bind(expected_version)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
            ensure_one_row(result.rows_affected(), "Flight seat", seat.id)
        }
        Change::InsertPassengerSeat(seat) => {
            sqlx::query(
                "INSERT INTO passenger_seats (id, booking_id, passenger_id, segment_id, flight_seat_id, \
                 seat_number, fee_nuc, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(seat.id)
            .bind(seat.booking_id)
            .bind(seat.passenger_id)
            .bind(seat.segment_id)
            .bind(seat.flight_seat_id)
            .bind(&seat.seat_number)
            .bind(seat.fee_nuc)
            .bind(seat.created_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
            Ok(())
        }
        Change::DeletePassengerSeat { id } => {
            let result = sqlx::query("DELETE FROM passenger_seats WHERE id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
            ensure_one_row(result.rows_affected(), "Passenger seat", id)
        }
        Change::InsertBooking(booking) => insert_booking(tx, &booking).await,
        Change::UpdateBooking { booking, expected_version } => {
            let totals = &booking.totals;
            let result = sqlx::query(
                "UPDATE bookings SET status = $1, payment_status = $2, base_fare_nuc = $3, \
                 tax_nuc = $4, service_fee_nuc = $5, seat_selection_fees_nuc = $6, \
                 extras_fees_nuc = $7, discount_nuc = $8, total_nuc = $9, expires_at = $10, \
                 promotion_code = $11, cancellation_reason = $12, version = $13, updated_at = $14, \
                 updated_by = $15 WHERE id = $16 AND version = $17",
            )
            .bind(booking.status.as_str())
            .bind(booking.payment_status.as_str())
            .bind(totals.base_fare_nuc())
            .bind(totals.tax_nuc())
            .bind(totals.service_fee_nuc())
            .bind(totals.seat_selection_fees_nuc())
            .bind(totals.extras_fees_nuc())
            .bind(totals.discount_nuc())
            .bind(totals.total_nuc())
            .bind(booking.expires_at)
            .bind(&booking.promotion_code)
            .bind(&booking.cancellation_reason)
            .bind(booking.version)
            .bind(booking.updated_at)
            .bind(&booking.updated_by)
            .bind(booking.id)
            .bind(expected_version)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
            ensure_one_row(result.rows_affected(), "Booking", booking.id)
        }
        Change::InsertBookingExtra(extra) => {
            sqlx::query(
                "INSERT INTO booking_extras (id, booking_id, segment_id, passenger_id, amenity_id, \
                 extra_type, description, unit_price_nuc, quantity, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(extra.id)
            .bind(extra.booking_id)
            .bind(extra.segment_id)
            .bind(extra.passenger_id)
            .bind(extra.amenity_id)
            .bind(extra.extra_type.as_str())
            .bind(&extra.description)
            .bind(extra.unit_price_nuc)
            .bind(extra.quantity)
            .bind(extra.created_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
            Ok(())
        }
        Change::InsertPaymentRecord(payment) => {
            sqlx::query(
                "INSERT INTO payment_records (id, booking_id, kind, amount_nuc, method, \
                 transaction_reference, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(payment.id)
            .bind(payment.booking_id)
            .bind(payment.kind.as_str())
            .bind(payment.amount_nuc)
            .bind(&payment.method)
            .bind(payment.transaction_reference.as_ref().map(|r| r.expose().clone()))
            .bind(payment.created_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
            Ok(())
        }
        Change::AppendHistory(row) => {
            sqlx::query(
                "INSERT INTO booking_history (id, booking_id, action, old_value, new_value, actor, \
                 created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(row.id)
            .bind(row.booking_id)
            .bind(&row.action)
            .bind(&row.old_value)
            .bind(&row.new_value)
            .bind(&row.actor)
            .bind(row.created_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
            Ok(())
        }
        Change::UpdatePromotion { promotion, expected_version } => {
            let (kind, value) = adjustment_parts(&promotion.discount);
            let result = sqlx::query(
                "UPDATE promotions SET used_count = $1, is_active = $2, discount_kind = $3, \
                 discount_value = $4, version = $5 WHERE id = $6 AND version = $7",
            )
            .bind(promotion.used_count)
            .bind(promotion.is_active)
            .bind(kind)
            .bind(value)
            .bind(promotion.version)
            .bind(promotion.id)
            .bind(expected_version)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
            ensure_one_row(result.rows_affected(), "Promotion", promotion.id)
        }
    }
}

async fn insert_booking(tx: &mut Transaction<'_, Postgres>, booking: &Booking) -> StoreResult<()> {
    let totals = &booking.totals;
    sqlx::query(
        "INSERT INTO bookings (id, reference, user_id, status, payment_status, currency, \
         base_fare_nuc, tax_nuc, service_fee_nuc, seat_selection_fees_nuc, extras_fees_nuc, \
         discount_nuc, total_nuc, expires_at, promotion_code, cancellation_reason, version, \
         created_at, updated_at, updated_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
    )
    .bind(booking.id)
    .bind(&booking.reference)
    .bind(&booking.user_id)
    .bind(booking.status.as_str())
    .bind(booking.payment_status.as_str())
    .bind(&booking.currency)
    .bind(totals.base_fare_nuc())
    .bind(totals.tax_nuc())
    .bind(totals.service_fee_nuc())
    .bind(totals.seat_selection_fees_nuc())
    .bind(totals.extras_fees_nuc())
    .bind(totals.discount_nuc())
    .bind(totals.total_nuc())
    .bind(booking.expires_at)
    .bind(&booking.promotion_code)
    .bind(&booking.cancellation_reason)
    .bind(booking.version)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .bind(&booking.updated_by)
    .execute(&mut **tx)
    .await
    .map_err(db_error)?;

    for (position, passenger) in booking.passengers.iter().enumerate() {
        sqlx::query(
            "INSERT INTO booking_passengers (id, booking_id, position, first_name, last_name, \
             passenger_type, email) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(passenger.id)
        .bind(booking.id)
        .bind(position as i32)
        .bind(&passenger.first_name)
        .bind(&passenger.last_name)
        .bind(passenger.passenger_type.as_str())
        .bind(passenger.email.as_ref().map(|e| e.expose().clone()))
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
    }

    for (position, segment) in booking.segments.iter().enumerate() {
        sqlx::query(
            "INSERT INTO booking_segments (id, booking_id, position, flight_id, cabin_class, \
             departure_time, fare_nuc) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(segment.id)
        .bind(booking.id)
        .bind(position as i32)
        .bind(segment.flight_id)
        .bind(segment.cabin_class.as_str())
        .bind(segment.departure_time)
        .bind(segment.fare_nuc)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
    }

    Ok(())
}

#[async_trait]
impl UnitOfWork for PostgresStore {
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        let actor = changes.actor().to_string();
        let count = changes.len();
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        for change in changes.into_changes() {
            if let Err(e) = apply(&mut tx, change).await {
                // Dropping the transaction rolls it back
                warn!("Change set from {} rejected: {}", actor, e);
                return Err(e);
            }
        }

        tx.commit().await.map_err(db_error)?;
        debug!("Committed {} changes for {}", count, actor);
        Ok(())
    }
}
