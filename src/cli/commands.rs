use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cli::config::ScraperConfig;
use crate::cli::ScrapeArgs;
use crate::links::dates::{rewrite_links, StayWindow};
use crate::links::shard::ShardSpec;
use crate::links::source;
use crate::scraper::aggregate::RunSummary;
use crate::scraper::engine::HotelScraper;
use crate::scraper::pool::{default_worker_count, WorkerPool};
use crate::scraper::task::ScrapeTask;
use crate::storage::availability::AvailabilityStorage;

/// Run this instance's shard of the link list end to end.
pub async fn scrape(args: ScrapeArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ScraperConfig::load_from_file(path)?,
        None => ScraperConfig::load_default()?,
    };

    // Command line parameters override the configuration file
    if let Some(total_shards) = args.total_shards {
        config.run.total_shards = total_shards;
    }
    if let Some(shard_index) = args.shard_index {
        config.run.shard_index = shard_index;
    }
    if let Some(workers) = args.workers {
        config.run.worker_count = Some(workers);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.run.task_timeout_ms = timeout_ms;
    }
    if args.user_agent.is_some() {
        config.browser.user_agent = args.user_agent.clone();
    }
    if args.disable_images {
        config.browser.disable_images = true;
    }
    if args.dry_run {
        config.storage.backend = "memory".to_string();
    }

    // Invalid shard parameters are a deployment mistake; abort before any
    // work starts
    let shard = ShardSpec::new(config.run.total_shards, config.run.shard_index)
        .context("Invalid shard configuration")?;

    let run_id = Uuid::new_v4();
    let worker_count = config.run.worker_count.unwrap_or_else(default_worker_count);
    let timeout = Duration::from_millis(config.run.task_timeout_ms);

    info!(
        "Run {} starting as shard {}/{} with {} workers",
        run_id, shard.shard_index, shard.total_shards, worker_count
    );

    let started = Instant::now();

    let raw_links = source::read_links(&args.links_file).await?;

    let window = StayWindow::from_now(Local::now(), config.run.checkin_cutoff_hour);
    info!(
        "Stay window: check-in {} check-out {}",
        window.checkin, window.checkout
    );

    let dated_links = rewrite_links(&raw_links, &window);
    let total_links = dated_links.len();
    if total_links == 0 {
        warn!("No links to process");
    }

    let shard_links = shard.assign(&dated_links);
    info!(
        "This instance owns {} of {} links",
        shard_links.len(),
        total_links
    );

    let tasks: Vec<ScrapeTask> = shard_links
        .into_iter()
        .map(|link| ScrapeTask {
            link,
            stay_date: window.checkin,
            total_links,
            timeout,
        })
        .collect();

    let store = AvailabilityStorage::create(&config.storage).await?;
    let scraper = Arc::new(HotelScraper::new(
        config.browser.clone(),
        store,
        config.storage.currency.clone(),
        config.run.tasks_per_session,
        timeout,
    ));

    let pool = WorkerPool::new(scraper.clone(), worker_count);
    let mut results = pool.run(tasks).await;
    scraper.shutdown().await;

    let summary = RunSummary::from_results(run_id, shard, &mut results, started.elapsed());
    summary.log();

    Ok(())
}

/// Show the current configuration
pub async fn show_config() -> Result<()> {
    let config = ScraperConfig::load_default()?;
    println!("Current configuration:");
    println!("{:#?}", config);

    Ok(())
}

/// Write the built-in defaults to the config directory
pub async fn init_config() -> Result<()> {
    let config = ScraperConfig::default();
    config.save_as_default()?;
    println!("Default configuration written");

    Ok(())
}
