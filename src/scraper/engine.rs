use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::browser::driver::PageDriver;
use crate::browser::session::BrowserSession;
use crate::cli::config::BrowserSettings;
use crate::scraper::extract::{self, PageOutcome};
use crate::scraper::pool::TaskExecutor;
use crate::scraper::task::{ExtractedRoom, ScrapeTask, TaskResult, TaskStatus};
use crate::storage::availability::{AvailabilityFields, AvailabilityStore, RoomFields};

/// A session checked out of the pool, with its accumulated task count.
struct PooledSession {
    session: BrowserSession,
    uses: usize,
}

/// Runs the per-task state machine: navigate, locate table, extract rows,
/// persist. One instance is shared by every worker of the pool.
///
/// Browser lifetime is a policy: `tasks_per_session = 1` starts a fresh
/// session for every task, `k > 1` lets one session serve up to `k` tasks.
/// Either way a task holds its session exclusively from checkout to
/// check-in, and a session that errored or timed out is discarded, never
/// reused.
pub struct HotelScraper {
    browser: BrowserSettings,
    store: Arc<dyn AvailabilityStore>,
    currency: String,
    tasks_per_session: usize,
    task_timeout: Duration,
    idle: Mutex<Vec<PooledSession>>,
}

impl HotelScraper {
    pub fn new(
        browser: BrowserSettings,
        store: Arc<dyn AvailabilityStore>,
        currency: String,
        tasks_per_session: usize,
        task_timeout: Duration,
    ) -> Self {
        Self {
            browser,
            store,
            currency,
            tasks_per_session: tasks_per_session.max(1),
            task_timeout,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Close any sessions still idling in the pool.
    pub async fn shutdown(&self) {
        let sessions = std::mem::take(&mut *self.idle.lock().await);
        for pooled in sessions {
            if let Err(e) = pooled.session.quit().await {
                warn!("Error closing idle browser session: {:#}", e);
            }
        }
    }

    async fn checkout(&self) -> Result<PooledSession> {
        if let Some(pooled) = self.idle.lock().await.pop() {
            debug!("Reusing browser session (use {})", pooled.uses + 1);
            return Ok(pooled);
        }
        let session = BrowserSession::new(&self.browser, self.task_timeout).await?;
        Ok(PooledSession { session, uses: 0 })
    }

    async fn check_in(&self, mut pooled: PooledSession) {
        pooled.uses += 1;
        if pooled.uses < self.tasks_per_session {
            self.idle.lock().await.push(pooled);
        } else if let Err(e) = pooled.session.quit().await {
            warn!("Error closing browser session: {:#}", e);
        }
    }

    async fn discard(&self, pooled: PooledSession) {
        if let Err(e) = pooled.session.quit().await {
            warn!("Error closing failed browser session: {:#}", e);
        }
    }

    /// Mark a fetch that never produced data, so downstream consumers can
    /// tell "scrape failed" from "confirmed no rooms". Errors here are only
    /// logged; the task is already failing.
    async fn record_fetch_failure(&self, task: &ScrapeTask) {
        let fields = AvailabilityFields {
            hotel_name: None,
            scraped_at: Utc::now(),
            total_rooms_left: 0,
            min_price: None,
            currency: self.currency.clone(),
            fetch_succeeded: false,
        };
        if let Err(e) = self
            .store
            .upsert_availability(&task.link.hotel_key, task.stay_date, &fields)
            .await
        {
            error!(
                "Failed to record fetch failure for {}: {:#}",
                task.link.hotel_key, e
            );
        }
    }

    async fn persist_rooms(
        &self,
        task: &ScrapeTask,
        hotel_name: Option<String>,
        rooms: Vec<ExtractedRoom>,
        started: Instant,
    ) -> TaskResult {
        let found = rooms.len();
        let scraped_at = Utc::now();
        let total_rooms_left: i64 = rooms.iter().map(|r| i64::from(r.rooms_left)).sum();
        let min_price = rooms
            .iter()
            .filter_map(|r| r.price)
            .fold(None, |acc: Option<f64>, p| {
                Some(acc.map_or(p, |best| best.min(p)))
            });

        let fields = AvailabilityFields {
            hotel_name,
            scraped_at,
            total_rooms_left,
            min_price,
            currency: self.currency.clone(),
            fetch_succeeded: true,
        };

        if let Err(e) = self
            .store
            .upsert_availability(&task.link.hotel_key, task.stay_date, &fields)
            .await
        {
            error!(
                "Failed to save availability for {}: {:#}",
                task.link.hotel_key, e
            );
            return task_result(task, TaskStatus::Failed, found, 0, Some(format!("{:#}", e)), started);
        }

        let mut saved = 0;
        let mut first_error = None;
        for room in &rooms {
            let room_fields = RoomFields {
                rooms_left: i64::from(room.rooms_left),
                price: room.price,
                scraped_at,
            };
            match self
                .store
                .upsert_room(&task.link.hotel_key, &room.name, task.stay_date, &room_fields)
                .await
            {
                Ok(()) => saved += 1,
                Err(e) => {
                    error!(
                        "Failed to save room '{}' for {}: {:#}",
                        room.name, task.link.hotel_key, e
                    );
                    if first_error.is_none() {
                        first_error = Some(format!("{:#}", e));
                    }
                }
            }
        }

        if let Some(error) = first_error {
            task_result(task, TaskStatus::Failed, found, saved, Some(error), started)
        } else {
            info!(
                "[{}/{}] {} rooms found, {} saved ({} left in total)",
                task.link.global_index, task.total_links, found, saved, total_rooms_left
            );
            task_result(task, TaskStatus::Success, found, saved, None, started)
        }
    }

    async fn persist_no_availability(&self, task: &ScrapeTask, hotel_name: Option<String>, started: Instant) -> TaskResult {
        let fields = AvailabilityFields {
            hotel_name,
            scraped_at: Utc::now(),
            total_rooms_left: 0,
            min_price: None,
            currency: self.currency.clone(),
            fetch_succeeded: true,
        };
        match self
            .store
            .upsert_availability(&task.link.hotel_key, task.stay_date, &fields)
            .await
        {
            Ok(()) => {
                info!(
                    "[{}/{}] No availability for {} on {}",
                    task.link.global_index, task.total_links, task.link.hotel_key, task.stay_date
                );
                task_result(task, TaskStatus::NoAvailability, 0, 0, None, started)
            }
            Err(e) => {
                error!(
                    "Failed to save no-availability snapshot for {}: {:#}",
                    task.link.hotel_key, e
                );
                task_result(task, TaskStatus::Failed, 0, 0, Some(format!("{:#}", e)), started)
            }
        }
    }
}

#[async_trait]
impl TaskExecutor for HotelScraper {
    async fn execute(&self, task: ScrapeTask) -> TaskResult {
        let started = Instant::now();
        let url = task.link.url.to_string();
        info!(
            "[{}/{}] Scraping {}",
            task.link.global_index, task.total_links, url
        );

        let pooled = match self.checkout().await {
            Ok(pooled) => pooled,
            Err(e) => {
                error!("Could not start a browser session for {}: {:#}", url, e);
                self.record_fetch_failure(&task).await;
                return task_result(
                    &task,
                    TaskStatus::Failed,
                    0,
                    0,
                    Some(format!("{:#}", e)),
                    started,
                );
            }
        };

        // The timeout is the only cancellation mechanism: a hung page turns
        // into a FAILED result instead of blocking the pool.
        let visited = tokio::time::timeout(task.timeout, visit(&pooled.session, &url)).await;

        match visited {
            Err(_elapsed) => {
                warn!("Task for {} timed out after {:?}", url, task.timeout);
                self.discard(pooled).await;
                self.record_fetch_failure(&task).await;
                task_result(
                    &task,
                    TaskStatus::Failed,
                    0,
                    0,
                    Some(format!("timed out after {}ms", task.timeout.as_millis())),
                    started,
                )
            }
            Ok(Err(e)) => {
                error!("Task for {} failed: {:#}", url, e);
                self.discard(pooled).await;
                self.record_fetch_failure(&task).await;
                task_result(
                    &task,
                    TaskStatus::Failed,
                    0,
                    0,
                    Some(format!("{:#}", e)),
                    started,
                )
            }
            Ok(Ok((hotel_name, outcome))) => {
                self.check_in(pooled).await;
                match outcome {
                    PageOutcome::Found(rooms) => {
                        self.persist_rooms(&task, hotel_name, rooms, started).await
                    }
                    PageOutcome::NoAvailability => {
                        self.persist_no_availability(&task, hotel_name, started).await
                    }
                    PageOutcome::TableNotFound => {
                        warn!(
                            "[{}/{}] Room table not found on {} - page layout may have changed",
                            task.link.global_index, task.total_links, url
                        );
                        self.record_fetch_failure(&task).await;
                        task_result(&task, TaskStatus::TableNotFound, 0, 0, None, started)
                    }
                }
            }
        }
    }
}

/// Navigate and read the page: hotel name first, then the room table state
/// machine. A missing hotel name is a default, not an error.
async fn visit(
    page: &BrowserSession,
    url: &str,
) -> Result<(Option<String>, PageOutcome)> {
    page.navigate(url).await?;

    let hotel_name = match extract::hotel_name(page).await {
        Ok(name) => name,
        Err(e) => {
            warn!("Could not read hotel name from {}: {:#}", url, e);
            None
        }
    };

    let outcome = extract::extract_rooms(page).await?;
    Ok((hotel_name, outcome))
}

fn task_result(
    task: &ScrapeTask,
    status: TaskStatus,
    found_room_count: usize,
    saved_room_count: usize,
    error: Option<String>,
    started: Instant,
) -> TaskResult {
    TaskResult {
        global_index: task.link.global_index,
        url: task.link.url.to_string(),
        status,
        found_room_count,
        saved_room_count,
        error,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::task::HotelLink;
    use crate::storage::memory::MemoryStore;
    use chrono::NaiveDate;
    use url::Url;

    fn scraper_with_store() -> (HotelScraper, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let scraper = HotelScraper::new(
            BrowserSettings {
                webdriver_url: "http://localhost:4444".to_string(),
                headless: true,
                window_width: 1920,
                window_height: 1080,
                disable_images: false,
                user_agent: None,
            },
            store.clone(),
            "TRY".to_string(),
            1,
            Duration::from_secs(120),
        );
        (scraper, store)
    }

    fn task() -> ScrapeTask {
        let url = Url::parse("https://example.com/hotel/grand.html?checkin=2025-05-10").unwrap();
        ScrapeTask {
            link: HotelLink::new(url, 4),
            stay_date: NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
            total_links: 10,
            timeout: Duration::from_secs(120),
        }
    }

    fn room(identifier: &str, name: &str, rooms_left: u32, price: Option<f64>) -> ExtractedRoom {
        ExtractedRoom {
            identifier: Some(identifier.to_string()),
            name: name.to_string(),
            rooms_left,
            price,
        }
    }

    #[tokio::test]
    async fn persisting_rooms_writes_snapshot_and_lines() {
        let (scraper, store) = scraper_with_store();
        let task = task();
        let rooms = vec![
            room("101", "Deluxe Double", 5, Some(90.0)),
            room("205", "Suite", 2, Some(50.0)),
        ];

        let result = scraper
            .persist_rooms(&task, Some("Grand Hotel".to_string()), rooms, Instant::now())
            .await;

        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.found_room_count, 2);
        assert_eq!(result.saved_room_count, 2);
        assert_eq!(result.global_index, 4);

        let snapshot = store
            .availability(&task.link.hotel_key, task.stay_date)
            .await
            .unwrap();
        assert!(snapshot.fetch_succeeded);
        assert_eq!(snapshot.total_rooms_left, 7);
        assert_eq!(snapshot.min_price, Some(50.0));
        assert_eq!(snapshot.hotel_name.as_deref(), Some("Grand Hotel"));

        let line = store
            .room(&task.link.hotel_key, "Deluxe Double", task.stay_date)
            .await
            .unwrap();
        assert_eq!(line.rooms_left, 5);
        assert_eq!(line.price, Some(90.0));
    }

    #[tokio::test]
    async fn repeating_the_same_task_does_not_duplicate_rows() {
        let (scraper, store) = scraper_with_store();
        let task = task();
        let rooms = vec![room("101", "Deluxe Double", 5, Some(90.0))];

        for _ in 0..2 {
            scraper
                .persist_rooms(&task, None, rooms.clone(), Instant::now())
                .await;
        }

        assert_eq!(store.availability_count().await, 1);
        assert_eq!(store.room_count().await, 1);
    }

    #[tokio::test]
    async fn no_availability_persists_a_successful_zero_room_snapshot() {
        let (scraper, store) = scraper_with_store();
        let task = task();

        let result = scraper
            .persist_no_availability(&task, None, Instant::now())
            .await;

        assert_eq!(result.status, TaskStatus::NoAvailability);
        let snapshot = store
            .availability(&task.link.hotel_key, task.stay_date)
            .await
            .unwrap();
        assert!(snapshot.fetch_succeeded);
        assert_eq!(snapshot.total_rooms_left, 0);
        assert_eq!(store.room_count().await, 0);
    }

    #[tokio::test]
    async fn fetch_failure_marker_is_distinguishable_from_no_rooms() {
        let (scraper, store) = scraper_with_store();
        let task = task();

        scraper.record_fetch_failure(&task).await;

        let snapshot = store
            .availability(&task.link.hotel_key, task.stay_date)
            .await
            .unwrap();
        assert!(!snapshot.fetch_succeeded);
        assert_eq!(snapshot.total_rooms_left, 0);
    }
}
