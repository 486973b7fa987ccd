use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::cli::config::StorageSettings;

/// Snapshot-level fields for one hotel and stay date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityFields {
    pub hotel_name: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub total_rooms_left: i64,
    pub min_price: Option<f64>,
    pub currency: String,
    pub fetch_succeeded: bool,
}

/// Room-line fields for one hotel, room name and stay date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomFields {
    pub rooms_left: i64,
    pub price: Option<f64>,
    pub scraped_at: DateTime<Utc>,
}

/// The storage collaborator contract.
///
/// Both operations are idempotent upserts: repeating a call with the same
/// key overwrites that key's latest values and never duplicates rows, so
/// re-running a shard is always safe.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Upsert the availability snapshot keyed by `(hotel_key, stay_date)`.
    async fn upsert_availability(
        &self,
        hotel_key: &str,
        stay_date: NaiveDate,
        fields: &AvailabilityFields,
    ) -> Result<()>;

    /// Upsert one room line keyed by `(hotel_key, room_name, stay_date)`.
    async fn upsert_room(
        &self,
        hotel_key: &str,
        room_name: &str,
        stay_date: NaiveDate,
        fields: &RoomFields,
    ) -> Result<()>;
}

/// Factory for creating an AvailabilityStore implementation
pub struct AvailabilityStorage;

impl AvailabilityStorage {
    /// Create a new AvailabilityStore instance based on the settings
    pub async fn create(settings: &StorageSettings) -> Result<Arc<dyn AvailabilityStore>> {
        match settings.backend.as_str() {
            "postgres" => {
                let store = PostgresStore::new(settings).await?;
                Ok(Arc::new(store))
            }
            "memory" => Ok(Arc::new(crate::storage::memory::MemoryStore::new())),
            _ => {
                anyhow::bail!("Unsupported storage backend: {}", settings.backend);
            }
        }
    }
}

/// PostgreSQL implementation of AvailabilityStore
pub struct PostgresStore {
    /// PostgreSQL connection pool, shared across workers; every write
    /// targets a disjoint key so no application-level locking is needed
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect and make sure the availability tables exist.
    pub async fn new(settings: &StorageSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&settings.connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let store = Self { pool };
        store.ensure_tables().await?;

        debug!("Connected to PostgreSQL database");

        Ok(store)
    }

    async fn ensure_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS hotel_availability (
                hotel_key TEXT NOT NULL,
                stay_date DATE NOT NULL,
                hotel_name TEXT,
                scraped_at TIMESTAMPTZ NOT NULL,
                total_rooms_left BIGINT NOT NULL DEFAULT 0,
                min_price DOUBLE PRECISION,
                currency TEXT NOT NULL,
                fetch_succeeded BOOLEAN NOT NULL,
                PRIMARY KEY (hotel_key, stay_date)
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create hotel_availability table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS room_availability (
                hotel_key TEXT NOT NULL,
                room_name TEXT NOT NULL,
                stay_date DATE NOT NULL,
                rooms_left BIGINT NOT NULL DEFAULT 0,
                price DOUBLE PRECISION,
                scraped_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (hotel_key, room_name, stay_date)
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create room_availability table")?;

        debug!("Ensured availability tables exist");

        Ok(())
    }
}

#[async_trait]
impl AvailabilityStore for PostgresStore {
    async fn upsert_availability(
        &self,
        hotel_key: &str,
        stay_date: NaiveDate,
        fields: &AvailabilityFields,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO hotel_availability
                (hotel_key, stay_date, hotel_name, scraped_at, total_rooms_left, min_price, currency, fetch_succeeded)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (hotel_key, stay_date) DO UPDATE
             SET hotel_name = COALESCE(EXCLUDED.hotel_name, hotel_availability.hotel_name),
                 scraped_at = EXCLUDED.scraped_at,
                 total_rooms_left = EXCLUDED.total_rooms_left,
                 min_price = EXCLUDED.min_price,
                 currency = EXCLUDED.currency,
                 fetch_succeeded = EXCLUDED.fetch_succeeded",
        )
        .bind(hotel_key)
        .bind(stay_date)
        .bind(&fields.hotel_name)
        .bind(fields.scraped_at)
        .bind(fields.total_rooms_left)
        .bind(fields.min_price)
        .bind(&fields.currency)
        .bind(fields.fetch_succeeded)
        .execute(&self.pool)
        .await
        .context(format!(
            "Failed to upsert availability for {} on {}",
            hotel_key, stay_date
        ))?;

        debug!("Upserted availability: {} {}", hotel_key, stay_date);

        Ok(())
    }

    async fn upsert_room(
        &self,
        hotel_key: &str,
        room_name: &str,
        stay_date: NaiveDate,
        fields: &RoomFields,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO room_availability
                (hotel_key, room_name, stay_date, rooms_left, price, scraped_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (hotel_key, room_name, stay_date) DO UPDATE
             SET rooms_left = EXCLUDED.rooms_left,
                 price = EXCLUDED.price,
                 scraped_at = EXCLUDED.scraped_at",
        )
        .bind(hotel_key)
        .bind(room_name)
        .bind(stay_date)
        .bind(fields.rooms_left)
        .bind(fields.price)
        .bind(fields.scraped_at)
        .execute(&self.pool)
        .await
        .context(format!(
            "Failed to upsert room '{}' for {} on {}",
            room_name, hotel_key, stay_date
        ))?;

        debug!(
            "Upserted room line: {} '{}' {}",
            hotel_key, room_name, stay_date
        );

        Ok(())
    }
}
