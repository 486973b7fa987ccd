use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

use crate::scraper::task::{ScrapeTask, TaskResult};

/// Executes one ScrapeTask to completion and always yields a TaskResult.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    async fn execute(&self, task: ScrapeTask) -> TaskResult;
}

/// Default worker count: available CPU cores minus one, leaving headroom
/// for the WebDriver processes themselves. Always at least 1.
pub fn default_worker_count() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Bounded pool of workers draining a shard's tasks.
///
/// Tasks are independent: no task waits on another and nothing is cancelled
/// when a sibling fails. Each task runs inside its own spawned tokio task so
/// a panic is caught at the dispatch boundary and converted into a FAILED
/// result instead of taking the worker (or the shard) down.
pub struct WorkerPool<E: TaskExecutor> {
    executor: Arc<E>,
    worker_count: usize,
}

impl<E: TaskExecutor> WorkerPool<E> {
    pub fn new(executor: Arc<E>, worker_count: usize) -> Self {
        Self {
            executor,
            worker_count: worker_count.max(1),
        }
    }

    /// Run every task to settlement and return one TaskResult per task.
    /// Completion order is non-deterministic; the aggregator re-sequences.
    pub async fn run(&self, tasks: Vec<ScrapeTask>) -> Vec<TaskResult> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let expected = tasks.len();
        let worker_count = self.worker_count.min(expected);
        debug!("Dispatching {} tasks across {} workers", expected, worker_count);

        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let (tx, mut rx) = mpsc::unbounded_channel::<TaskResult>();

        let workers: Vec<_> = (0..worker_count)
            .map(|worker_id| {
                let queue = queue.clone();
                let tx = tx.clone();
                let executor = self.executor.clone();
                tokio::spawn(worker_loop(worker_id, queue, executor, tx))
            })
            .collect();
        drop(tx);

        let mut results = Vec::with_capacity(expected);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        join_all(workers).await;

        results
    }
}

async fn worker_loop<E: TaskExecutor>(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<ScrapeTask>>>,
    executor: Arc<E>,
    tx: mpsc::UnboundedSender<TaskResult>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        let task = { queue.lock().await.pop_front() };
        let Some(task) = task else { break };

        let global_index = task.link.global_index;
        let url = task.link.url.to_string();

        let handle = tokio::spawn({
            let executor = executor.clone();
            async move { executor.execute(task).await }
        });

        let result = match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                error!(
                    "Worker {}: task for {} crashed: {}",
                    worker_id, url, join_error
                );
                TaskResult::dispatch_failure(global_index, url, join_error.to_string())
            }
        };

        if tx.send(result).is_err() {
            break;
        }
    }

    debug!("Worker {} finished", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::task::{HotelLink, TaskStatus};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use url::Url;

    fn task(global_index: usize) -> ScrapeTask {
        let url =
            Url::parse(&format!("https://example.com/hotel/h{}.html", global_index)).unwrap();
        ScrapeTask {
            link: HotelLink::new(url, global_index),
            stay_date: NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
            total_links: 10,
            timeout: Duration::from_secs(5),
        }
    }

    /// Succeeds for every task except the configured indices, which either
    /// fail or panic. Tracks the peak number of concurrent executions.
    struct ScriptedExecutor {
        fail_on: Vec<usize>,
        panic_on: Vec<usize>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn new(fail_on: Vec<usize>, panic_on: Vec<usize>) -> Self {
            Self {
                fail_on,
                panic_on,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TaskExecutor for ScriptedExecutor {
        async fn execute(&self, task: ScrapeTask) -> TaskResult {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let index = task.link.global_index;
            if self.panic_on.contains(&index) {
                panic!("scripted panic for task {}", index);
            }
            if self.fail_on.contains(&index) {
                return TaskResult {
                    global_index: index,
                    url: task.link.url.to_string(),
                    status: TaskStatus::Failed,
                    found_room_count: 0,
                    saved_room_count: 0,
                    error: Some("scripted failure".to_string()),
                    duration_ms: 10,
                };
            }
            TaskResult {
                global_index: index,
                url: task.link.url.to_string(),
                status: TaskStatus::Success,
                found_room_count: 2,
                saved_room_count: 2,
                error: None,
                duration_ms: 10,
            }
        }
    }

    #[tokio::test]
    async fn every_task_settles_even_when_some_fail_or_panic() {
        let executor = Arc::new(ScriptedExecutor::new(vec![3], vec![5]));
        let pool = WorkerPool::new(executor.clone(), 4);

        let results = pool.run((1..=8).map(task).collect()).await;
        assert_eq!(results.len(), 8);

        let failed: Vec<usize> = results
            .iter()
            .filter(|r| r.status == TaskStatus::Failed)
            .map(|r| r.global_index)
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.contains(&3));
        assert!(failed.contains(&5));

        // The panicked task still yielded a well-formed result
        let crashed = results.iter().find(|r| r.global_index == 5).unwrap();
        assert!(crashed.error.is_some());
        assert_eq!(crashed.found_room_count, 0);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_worker_count() {
        let executor = Arc::new(ScriptedExecutor::new(vec![], vec![]));
        let pool = WorkerPool::new(executor.clone(), 3);

        let results = pool.run((1..=12).map(task).collect()).await;
        assert_eq!(results.len(), 12);
        assert!(executor.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_shard_yields_no_results() {
        let executor = Arc::new(ScriptedExecutor::new(vec![], vec![]));
        let pool = WorkerPool::new(executor, 4);
        assert!(pool.run(Vec::new()).await.is_empty());
    }
}
