use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventQuery, EventStoreError, Result, Version,
    store::{EventStore, EventStream, ExpectedVersion, validate_append},
};

/// Advisory lock taken by every append before it inserts events. Positions
/// come from a sequence at insert time, so without it a transaction holding a
/// lower position could commit after a higher one had already been read.
pub const APPEND_LOCK_KEY: i64 = 0x6d61_726b_6574;

const EVENT_COLUMNS: &str = "position, id, event_type, aggregate_id, aggregate_type, version, recorded_at, payload, metadata";

/// PostgreSQL-backed event store.
///
/// Each stream has a row in `event_streams` holding its current version. An
/// append advances that row with a compare-and-set `UPDATE` inside the same
/// transaction that inserts the events, so a stale writer updates zero rows
/// and gets a [`EventStoreError::ConcurrencyConflict`].
///
/// Appends that pass the version check then serialize on
/// [`APPEND_LOCK_KEY`] until commit, so global positions become visible in
/// order and a reader that checkpoints on the last position it saw never
/// skips an event.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and applies pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;
        let position: i64 = row.try_get("position")?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            position: position as u64,
            recorded_at: row.try_get("recorded_at")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn current_version(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: AggregateId,
    ) -> Result<Version> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM event_streams WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;
        Ok(Version::new(version.unwrap_or(0)))
    }

    /// Moves the stream row from `from` to `to`. Returns false if another
    /// writer got there first.
    async fn advance_stream(
        tx: &mut Transaction<'_, Postgres>,
        first: &EventEnvelope,
        from: Version,
        to: Version,
    ) -> Result<bool> {
        let affected = if from == Version::initial() {
            sqlx::query(
                r#"
                INSERT INTO event_streams (aggregate_id, aggregate_type, version, updated_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (aggregate_id) DO NOTHING
                "#,
            )
            .bind(first.aggregate_id.as_uuid())
            .bind(&first.aggregate_type)
            .bind(to.as_i64())
            .execute(&mut **tx)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE event_streams SET version = $3, updated_at = now()
                WHERE aggregate_id = $1 AND version = $2
                "#,
            )
            .bind(first.aggregate_id.as_uuid())
            .bind(from.as_i64())
            .bind(to.as_i64())
            .execute(&mut **tx)
            .await?
            .rows_affected()
        };
        Ok(affected == 1)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(
        &self,
        events: Vec<EventEnvelope>,
        expected: ExpectedVersion,
    ) -> Result<Version> {
        validate_append(&events)?;
        let first = &events[0];
        let aggregate_id = first.aggregate_id;
        let from = Version::new(first.version.as_i64() - 1);
        let to = events.last().map(|e| e.version).unwrap_or(from);

        let mut tx = self.pool.begin().await?;

        let precondition_holds = match expected {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => from == Version::initial(),
            ExpectedVersion::Exact(v) => v == from,
        };

        if !precondition_holds || !Self::advance_stream(&mut tx, first, from, to).await? {
            let actual = Self::current_version(&mut tx, aggregate_id).await?;
            metrics::counter!("event_store_conflicts_total").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            });
        }

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        for event in &events {
            let metadata_json = serde_json::to_value(&event.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, recorded_at, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.recorded_at)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(%aggregate_id, version = %to, "events appended");
        Ok(to)
    }

    async fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let sql =
            format!("SELECT {EVENT_COLUMNS} FROM events WHERE aggregate_id = $1 ORDER BY version");
        let rows = sqlx::query(&sql)
            .bind(aggregate_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM event_streams WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.map(Version::new))
    }

    async fn read_all_from(&self, after: u64) -> Result<EventStream> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE position > $1 ORDER BY position");
        let rows = sqlx::query(&sql)
            .bind(after as i64)
            .fetch_all(&self.pool)
            .await?;
        let events: Vec<Result<EventEnvelope>> = rows.into_iter().map(Self::row_to_event).collect();
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1=1");
        let mut param = 0;
        let mut next_param = || {
            param += 1;
            param
        };

        if query.aggregate_id.is_some() {
            sql.push_str(&format!(" AND aggregate_id = ${}", next_param()));
        }
        if query.aggregate_type.is_some() {
            sql.push_str(&format!(" AND aggregate_type = ${}", next_param()));
        }
        if query.event_types.is_some() {
            sql.push_str(&format!(" AND event_type = ANY(${})", next_param()));
        }
        if query.from_timestamp.is_some() {
            sql.push_str(&format!(" AND recorded_at >= ${}", next_param()));
        }
        if query.to_timestamp.is_some() {
            sql.push_str(&format!(" AND recorded_at <= ${}", next_param()));
        }
        sql.push_str(" ORDER BY position");
        if query.limit.is_some() {
            sql.push_str(&format!(" LIMIT ${}", next_param()));
        }

        let mut statement = sqlx::query(&sql);
        if let Some(id) = query.aggregate_id {
            statement = statement.bind(id.as_uuid());
        }
        if let Some(aggregate_type) = query.aggregate_type {
            statement = statement.bind(aggregate_type);
        }
        if let Some(event_types) = query.event_types {
            statement = statement.bind(event_types);
        }
        if let Some(from) = query.from_timestamp {
            statement = statement.bind(from);
        }
        if let Some(to) = query.to_timestamp {
            statement = statement.bind(to);
        }
        if let Some(limit) = query.limit {
            statement = statement.bind(limit as i64);
        }

        let rows = statement.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }
}
