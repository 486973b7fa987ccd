use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::storage::availability::{AvailabilityFields, AvailabilityStore, RoomFields};

/// In-memory AvailabilityStore used by `--dry-run` and by tests.
///
/// Mirrors the upsert semantics of the durable backend: last write per key
/// wins, repeated identical writes leave the state unchanged.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    availability: HashMap<(String, NaiveDate), AvailabilityFields>,
    rooms: HashMap<(String, String, NaiveDate), RoomFields>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn availability_count(&self) -> usize {
        self.inner.lock().await.availability.len()
    }

    pub async fn room_count(&self) -> usize {
        self.inner.lock().await.rooms.len()
    }

    pub async fn availability(
        &self,
        hotel_key: &str,
        stay_date: NaiveDate,
    ) -> Option<AvailabilityFields> {
        self.inner
            .lock()
            .await
            .availability
            .get(&(hotel_key.to_string(), stay_date))
            .cloned()
    }

    pub async fn room(
        &self,
        hotel_key: &str,
        room_name: &str,
        stay_date: NaiveDate,
    ) -> Option<RoomFields> {
        self.inner
            .lock()
            .await
            .rooms
            .get(&(hotel_key.to_string(), room_name.to_string(), stay_date))
            .cloned()
    }
}

#[async_trait]
impl AvailabilityStore for MemoryStore {
    async fn upsert_availability(
        &self,
        hotel_key: &str,
        stay_date: NaiveDate,
        fields: &AvailabilityFields,
    ) -> Result<()> {
        self.inner
            .lock()
            .await
            .availability
            .insert((hotel_key.to_string(), stay_date), fields.clone());
        Ok(())
    }

    async fn upsert_room(
        &self,
        hotel_key: &str,
        room_name: &str,
        stay_date: NaiveDate,
        fields: &RoomFields,
    ) -> Result<()> {
        self.inner.lock().await.rooms.insert(
            (hotel_key.to_string(), room_name.to_string(), stay_date),
            fields.clone(),
        );
        Ok(())
    }
}
