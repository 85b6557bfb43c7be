use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use coupon_scraper::browser::{BrowserConfig, BrowserManager, PageDriver};
use coupon_scraper::cache::Cache;
use coupon_scraper::config::Config;
use coupon_scraper::enroll::{BrowserEnrollPage, Enroller};
use coupon_scraper::error::FatalError;
use coupon_scraper::http_client::HttpClient;
use coupon_scraper::ledger::SqliteLedger;
use coupon_scraper::models::{AcquisitionTarget, RunSummary};
use coupon_scraper::notify::Notifier;
use coupon_scraper::sources::{default_registry, BROWSER_SOURCES};
use coupon_scraper::{feed, pipeline};

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), FatalError> {
    let config = Config::load();
    let notifier = Notifier::from_config(&config.notify);
    let cache = Cache::new(&config.data_dir)?;

    let raw_urls = cache.read_candidates()?;
    if raw_urls.is_empty() {
        info!("no candidate links in {}/candidates.json, nothing to do", config.data_dir);
        return Ok(());
    }
    let candidates = feed::candidates_from(&raw_urls);
    info!(
        "{} candidate link(s) across {} source(s)",
        candidates.len(),
        feed::group_by_source(&candidates).len()
    );
    for (source, urls) in feed::group_by_source(&candidates) {
        if let Err(e) = cache.write_source_links(&source, &urls) {
            warn!("could not write {} link dump: {}", source, e);
        }
    }
    notifier
        .send(
            "Scrape started",
            &format!("Processing {} candidate link(s).", candidates.len()),
        )
        .await;

    // Ctrl-c flips both cancel handles: the watch channel drains the
    // resolution pipeline, the flag stops the enroller between targets. A
    // second interrupt exits immediately.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let signal_flag = cancel_flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing with partial results");
            signal_flag.store(true, Ordering::Relaxed);
            let _ = cancel_tx.send(true);
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second interrupt, exiting now");
            std::process::exit(130);
        }
    });

    let http = Arc::new(
        HttpClient::with_config(config.http.clone()).map_err(|e| FatalError::Config(e.to_string()))?,
    );

    // A headless session for the resolution phase, only when some candidate
    // actually needs one. Provisioning failure is fatal per the error policy.
    let needs_browser = candidates
        .iter()
        .any(|c| BROWSER_SOURCES.contains(&c.source.as_str()));
    let resolution_browser = if needs_browser {
        let browser_config = BrowserConfig::from_settings(&config.browser, true);
        Some(Arc::new(BrowserManager::launch(browser_config)?))
    } else {
        None
    };

    let registry = default_registry(
        http,
        resolution_browser,
        std::time::Duration::from_secs(config.browser.timeout_secs),
    );
    let output = pipeline::run(candidates, &registry, &config, cancel_rx).await;
    info!(
        "{} resolved, {} exhausted retries",
        output.resolved_count(),
        output.exhausted_count()
    );
    for (source, (resolved, total)) in output.per_source_counts() {
        notifier
            .send(
                &format!("Scraped {}", source),
                &format!("{} of {} link(s) resolved.", resolved, total),
            )
            .await;
    }

    let previous = cache.read_canonical().unwrap_or_default();
    let fresh = coupon_scraper::cache::new_since(&previous, &output.canonical_urls);
    if let Err(e) = cache.write_canonical(&output.canonical_urls) {
        warn!("could not persist canonical set: {}", e);
    }
    notifier
        .send(
            "Scraping completed",
            &format!(
                "Resolved {} unique course link(s), {} new since last run.",
                output.canonical_urls.len(),
                fresh.len()
            ),
        )
        .await;

    if output.canonical_urls.is_empty() {
        info!("no course links resolved, skipping enrollment");
        return Ok(());
    }

    // The resolution session (if any) is dropped before enrollment starts;
    // the enroller owns its own session for the whole batch.
    drop(registry);

    let targets: Vec<AcquisitionTarget> = output
        .canonical_urls
        .iter()
        .map(|url| AcquisitionTarget::from_canonical(url))
        .collect();
    let summary = enroll_all(&config, &cache, targets, cancel_flag).await?;

    info!("run summary: {:?}", summary.as_counts());
    notifier
        .send(
            "Enrollment finished",
            &format!(
                "{} acquired, {} owned, {} paid, {} unavailable, {} failed.",
                summary.acquired, summary.owned, summary.paid, summary.unavailable, summary.failed
            ),
        )
        .await;

    Ok(())
}

/// Provision the enrollment session and run the state machine on the
/// blocking pool; the browser API is synchronous.
async fn enroll_all(
    config: &Config,
    cache: &Cache,
    targets: Vec<AcquisitionTarget>,
    cancel: Arc<AtomicBool>,
) -> Result<RunSummary, FatalError> {
    let browser_config = BrowserConfig::from_settings(&config.browser, config.enroll.headless);
    let enroll_config = config.enroll.clone();
    let ledger_path = cache.data_dir().join("ledger.db");

    tokio::task::spawn_blocking(move || -> Result<RunSummary, FatalError> {
        let manager = BrowserManager::launch(browser_config)?;
        let tab = manager.new_tab().map_err(FatalError::from)?;
        let driver = PageDriver::with_timeout(tab, enroll_config.timeout());
        let page = BrowserEnrollPage::new(driver);

        let mut ledger = SqliteLedger::open(ledger_path)?;
        let mut enroller = Enroller::with_cancel(page, &mut ledger, enroll_config, cancel);
        enroller.run(&targets)
    })
    .await
    .map_err(|e| FatalError::Config(format!("enrollment task: {}", e)))?
}
