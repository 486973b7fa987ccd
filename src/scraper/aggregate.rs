use std::time::Duration;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::links::shard::ShardSpec;
use crate::scraper::task::{TaskResult, TaskStatus};

/// Merged view of a shard's TaskResults.
///
/// Completion order under concurrency is non-deterministic, so the results
/// are re-sequenced by global index before counting. A gap between
/// `rooms_found` and `rooms_saved` signals a persistence problem distinct
/// from a scraping problem.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub shard_index: usize,
    pub total_shards: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub no_availability: usize,
    pub table_not_found: usize,
    pub failed: usize,
    pub rooms_found: usize,
    pub rooms_saved: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    /// Sort the results by global index and fold them into counts.
    pub fn from_results(
        run_id: Uuid,
        shard: ShardSpec,
        results: &mut [TaskResult],
        duration: Duration,
    ) -> Self {
        results.sort_by_key(|result| result.global_index);

        let mut summary = Self {
            run_id,
            shard_index: shard.shard_index,
            total_shards: shard.total_shards,
            attempted: results.len(),
            succeeded: 0,
            no_availability: 0,
            table_not_found: 0,
            failed: 0,
            rooms_found: 0,
            rooms_saved: 0,
            duration_ms: duration.as_millis() as u64,
        };

        for result in results.iter() {
            match result.status {
                TaskStatus::Success => summary.succeeded += 1,
                TaskStatus::NoAvailability => summary.no_availability += 1,
                TaskStatus::TableNotFound => summary.table_not_found += 1,
                TaskStatus::Failed => summary.failed += 1,
            }
            summary.rooms_found += result.found_room_count;
            summary.rooms_saved += result.saved_room_count;
        }

        summary
    }

    /// Log the run banner. Always emitted, even for an empty shard, so
    /// "zero links" is distinguishable from "all tasks failed".
    pub fn log(&self) {
        let minutes = self.duration_ms as f64 / 60_000.0;
        info!("================================================");
        info!(
            "Room scraper run {} (shard {}/{}) summary:",
            self.run_id, self.shard_index, self.total_shards
        );
        info!("================================================");
        info!("Links processed:   {}", self.attempted);
        info!("Succeeded:         {}", self.succeeded);
        info!("No availability:   {}", self.no_availability);
        info!("Table not found:   {}", self.table_not_found);
        info!("Failed:            {}", self.failed);
        info!("Rooms found:       {}", self.rooms_found);
        info!("Rooms saved:       {}", self.rooms_saved);
        info!("Duration:          {:.1} minutes", minutes);
        info!("================================================");

        // One machine-readable line for monitoring to pick up
        if let Ok(json) = serde_json::to_string(self) {
            info!("summary {}", json);
        }
    }
}
