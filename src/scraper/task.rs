use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

/// One entry of the global link list.
///
/// The 1-based `global_index` is assigned once per run, before sharding, and
/// stays stable no matter which shard processes the link. It is used for
/// ordering and progress logs only; durable storage is keyed by `hotel_key`,
/// the canonicalized URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelLink {
    /// Hotel detail-page URL, dates already rewritten
    pub url: Url,

    /// 1-based position in the global link list
    pub global_index: usize,

    /// Canonicalized URL used as the durable hotel identifier
    pub hotel_key: String,
}

impl HotelLink {
    pub fn new(url: Url, global_index: usize) -> Self {
        let hotel_key = hotel_key(&url);
        Self {
            url,
            global_index,
            hotel_key,
        }
    }
}

/// Canonical storage key for a hotel page: lowercased host plus path, with
/// the query, fragment and any trailing slash stripped. Two links to the
/// same hotel with different stay dates map to the same key.
pub fn hotel_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    let path = url.path().trim_end_matches('/');
    format!("{}{}", host, path)
}

/// Unit of work scraping exactly one hotel page.
///
/// Immutable once dispatched; owned exclusively by the worker executing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeTask {
    pub link: HotelLink,

    /// Check-in date the link was parameterized to
    pub stay_date: NaiveDate,

    /// Size of the global link list, for `[i/total]` progress logs
    pub total_links: usize,

    /// Budget for navigation plus extraction
    pub timeout: Duration,
}

/// Terminal status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Room table located and extracted (possibly with zero rooms)
    Success,

    /// The page explicitly reported no availability for the stay date
    NoAvailability,

    /// Neither the room table nor the no-availability marker was present;
    /// likely a page-layout change worth flagging
    TableNotFound,

    /// Navigation, timeout, persistence or dispatch failure
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Success => "SUCCESS",
            TaskStatus::NoAvailability => "NO_AVAILABILITY",
            TaskStatus::TableNotFound => "TABLE_NOT_FOUND",
            TaskStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Outcome of a completed task. Produced exactly once per task; never
/// retried once handed to the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub global_index: usize,
    pub url: String,
    pub status: TaskStatus,
    pub found_room_count: usize,
    pub saved_room_count: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TaskResult {
    /// Result for a task that never produced its own outcome (worker crash,
    /// panic caught at the dispatch boundary).
    pub fn dispatch_failure(global_index: usize, url: String, error: impl Into<String>) -> Self {
        Self {
            global_index,
            url,
            status: TaskStatus::Failed,
            found_room_count: 0,
            saved_room_count: 0,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }
}

/// One logical room read off the page.
///
/// `identifier` is the site-assigned room id recovered from the row; it is
/// only used to collapse duplicate rate-plan rows and is never persisted.
/// `None` marks a row whose identifier could not be recovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRoom {
    pub identifier: Option<String>,
    pub name: String,
    pub rooms_left: u32,
    pub price: Option<f64>,
}
