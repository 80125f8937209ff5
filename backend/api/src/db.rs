//! Database layer: migrations, the SQLite [`Storage`] backend and the
//! event log.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    QueryBuilder, Sqlite, SqlitePool,
};
use tracing::info;

use annsetu_core::storage::{Storage, StorageResult};
use annsetu_core::types::{DonationDraft, Mutation};
use annsetu_core::{
    Donation, DonationEvent, DonationFilter, DonationId, DonationStatus, EventSink, Otp,
    StorageError,
};

use crate::errors::Result;
use crate::events::{EventRecord, NewEventRow};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // Make sure the file is created if it doesn't exist yet.
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────

const DONATION_COLUMNS: &str = "id, food_type, quantity, expiry_time, pickup_location, status, \
     pickup_otp, drop_otp, donor_id, volunteer_id, receiver_id, drop_location, created_at";

#[derive(Debug, Clone, sqlx::FromRow)]
struct DonationRow {
    id: i64,
    food_type: String,
    quantity: String,
    expiry_time: String,
    pickup_location: String,
    status: String,
    pickup_otp: String,
    drop_otp: String,
    donor_id: String,
    volunteer_id: Option<String>,
    receiver_id: Option<String>,
    drop_location: Option<String>,
    /// Unix milliseconds.
    created_at: i64,
}

impl TryFrom<DonationRow> for Donation {
    type Error = StorageError;

    fn try_from(row: DonationRow) -> std::result::Result<Self, Self::Error> {
        Ok(Donation {
            id: row.id as DonationId,
            food_type: row.food_type,
            quantity: row.quantity,
            expiry_time: row.expiry_time,
            pickup_location: row.pickup_location,
            status: DonationStatus::from_str(&row.status).map_err(StorageError::backend)?,
            pickup_otp: Otp::from_str(&row.pickup_otp).map_err(StorageError::backend)?,
            drop_otp: Otp::from_str(&row.drop_otp).map_err(StorageError::backend)?,
            donor_id: row.donor_id,
            volunteer_id: row.volunteer_id,
            receiver_id: row.receiver_id,
            drop_location: row.drop_location,
            created_at: DateTime::from_timestamp_millis(row.created_at).ok_or_else(|| {
                StorageError::backend(sqlx::Error::Decode(
                    format!("created_at {} out of range", row.created_at).into(),
                ))
            })?,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Storage backend
// ─────────────────────────────────────────────────────────

/// [`Storage`] over SQLite. Every write is a single conditional statement,
/// so atomicity comes from SQLite itself rather than from a read-then-write.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_record(&self, draft: DonationDraft) -> StorageResult<Option<DonationId>> {
        // The insert only happens if neither code is held by a live donation.
        let result = sqlx::query(
            r#"
            INSERT INTO donations
                (food_type, quantity, expiry_time, pickup_location, status,
                 pickup_otp, drop_otp, donor_id, created_at)
            SELECT ?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8
            WHERE NOT EXISTS (
                SELECT 1 FROM donations
                WHERE  status IN ('pending', 'assigned', 'picked_up')
                AND    (pickup_otp IN (?5, ?6) OR drop_otp IN (?5, ?6))
            )
            "#,
        )
        .bind(&draft.food_type)
        .bind(&draft.quantity)
        .bind(&draft.expiry_time)
        .bind(&draft.pickup_location)
        .bind(draft.pickup_otp.to_string())
        .bind(draft.drop_otp.to_string())
        .bind(&draft.donor_id)
        .bind(draft.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(StorageError::backend)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(result.last_insert_rowid() as DonationId))
    }

    async fn read_by_id(&self, id: DonationId) -> StorageResult<Option<Donation>> {
        let row = sqlx::query_as::<_, DonationRow>(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations WHERE id = ?1"
        ))
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::backend)?;
        row.map(Donation::try_from).transpose()
    }

    async fn list_by_filter(&self, filter: &DonationFilter) -> StorageResult<Vec<Donation>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {DONATION_COLUMNS} FROM donations WHERE 1 = 1"));

        if let Some(donor_id) = &filter.donor_id {
            query.push(" AND donor_id = ").push_bind(donor_id.clone());
        }
        if let Some(volunteer_id) = &filter.volunteer_id {
            query.push(" AND volunteer_id = ").push_bind(volunteer_id.clone());
        }
        if let Some(receiver_id) = &filter.receiver_id {
            query.push(" AND receiver_id = ").push_bind(receiver_id.clone());
        }
        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND status IN (");
            let mut list = query.separated(", ");
            for status in statuses {
                list.push_bind(status.as_str());
            }
            list.push_unseparated(")");
        }
        query.push(" ORDER BY created_at DESC, id DESC");

        let rows = query
            .build_query_as::<DonationRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::backend)?;
        rows.into_iter().map(Donation::try_from).collect()
    }

    async fn compare_and_swap(
        &self,
        id: DonationId,
        expected: DonationStatus,
        mutation: &Mutation,
    ) -> StorageResult<Option<Donation>> {
        let receiver_id = mutation.reservation.as_ref().map(|r| r.receiver_id.clone());
        let drop_location = mutation
            .reservation
            .as_ref()
            .and_then(|r| r.drop_location.clone());

        // Status check, write-once guards, the write and the read-back in one
        // statement.
        let row = sqlx::query_as::<_, DonationRow>(&format!(
            r#"
            UPDATE donations
            SET    status        = ?1,
                   volunteer_id  = COALESCE(?2, volunteer_id),
                   receiver_id   = COALESCE(?3, receiver_id),
                   drop_location = CASE WHEN ?3 IS NULL THEN drop_location ELSE ?4 END
            WHERE  id = ?5
            AND    status = ?6
            AND    (?2 IS NULL OR volunteer_id IS NULL)
            AND    (?3 IS NULL OR receiver_id IS NULL)
            RETURNING {DONATION_COLUMNS}
            "#
        ))
        .bind(mutation.status.as_str())
        .bind(mutation.volunteer_id.clone())
        .bind(receiver_id)
        .bind(drop_location)
        .bind(id as i64)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::backend)?;

        row.map(Donation::try_from).transpose()
    }
}

// ─────────────────────────────────────────────────────────
// Event log
// ─────────────────────────────────────────────────────────

/// [`EventSink`] that appends to `donation_events`.
#[derive(Clone)]
pub struct SqliteEventSink {
    pool: SqlitePool,
}

impl SqliteEventSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventSink for SqliteEventSink {
    async fn publish(&self, event: DonationEvent) -> std::result::Result<(), StorageError> {
        insert_event(&self.pool, &NewEventRow::from(&event))
            .await
            .map_err(StorageError::backend)
    }
}

async fn insert_event(pool: &SqlitePool, row: &NewEventRow) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO donation_events (donation_id, kind, status, actor, at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(row.donation_id)
    .bind(row.kind)
    .bind(row.status)
    .bind(&row.actor)
    .bind(row.at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch all events for a given donation, oldest first.
pub async fn get_events_for_donation(pool: &SqlitePool, donation_id: DonationId) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, donation_id, kind, status, actor, at
        FROM   donation_events
        WHERE  donation_id = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(donation_id as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
