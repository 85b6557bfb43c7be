//! Batch resolution of candidate links.
//!
//! Candidates are partitioned by source and worked through bounded per-source
//! worker pools; every candidate gets a per-URL retry budget and a timeout
//! per attempt. Failures stay contained to their candidate; the batch always
//! completes with whatever resolved. Output is deduplicated after
//! normalization and sorted, so downstream order never depends on worker
//! scheduling.

use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::ErrorKind;
use crate::models::{CandidateLink, ResolutionResult};
use crate::normalizer;
use crate::sources::{SourceKind, Strategy, StrategyRegistry};

/// Everything the batch produced: the deduplicated sorted canonical set plus
/// the per-candidate results for reporting.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub canonical_urls: Vec<String>,
    pub results: Vec<ResolutionResult>,
}

impl PipelineOutput {
    pub fn resolved_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.canonical_url.is_some())
            .count()
    }

    pub fn exhausted_count(&self) -> usize {
        self.results.len() - self.resolved_count()
    }

    /// `(resolved, total)` per source, for per-source progress reporting.
    pub fn per_source_counts(&self) -> BTreeMap<String, (usize, usize)> {
        let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for result in &self.results {
            let entry = counts.entry(result.source.clone()).or_default();
            entry.1 += 1;
            if result.canonical_url.is_some() {
                entry.0 += 1;
            }
        }
        counts
    }
}

/// Resolve a batch of candidates. Candidates whose source has no registered
/// strategy are logged and dropped. A signal on `cancel` aborts outstanding
/// work promptly and returns whatever already resolved.
pub async fn run(
    candidates: Vec<CandidateLink>,
    registry: &StrategyRegistry,
    config: &Config,
    mut cancel: watch::Receiver<bool>,
) -> PipelineOutput {
    let mut by_source: HashMap<String, Vec<CandidateLink>> = HashMap::new();
    for candidate in candidates {
        by_source
            .entry(candidate.source.clone())
            .or_default()
            .push(candidate);
    }

    let mut tasks: JoinSet<ResolutionResult> = JoinSet::new();
    for (source, links) in by_source {
        let strategy = match registry.get(&source) {
            Some(strategy) => strategy.clone(),
            None => {
                log::warn!(
                    "no strategy registered for source '{}', dropping {} link(s)",
                    source,
                    links.len()
                );
                continue;
            }
        };

        let source_config = config.source(&source);
        // A browser-backed strategy drives one shared session and cannot be
        // interleaved; everything else gets the configured pool.
        let workers = match strategy.kind() {
            SourceKind::Browser => 1,
            SourceKind::Http => source_config.threads.max(1),
        };
        log::info!(
            "processing {} link(s) from '{}' with {} worker(s)",
            links.len(),
            source,
            workers
        );

        let pool = Arc::new(Semaphore::new(workers));
        for link in links {
            let strategy = strategy.clone();
            let pool = pool.clone();
            let retries = source_config.retries;
            let timeout = source_config.timeout();
            tasks.spawn(async move {
                let _permit = pool.acquire_owned().await.expect("semaphore never closed");
                resolve_with_retries(strategy.as_ref(), &link.raw_url, retries, timeout).await
            });
        }
    }

    let mut canonical: BTreeSet<String> = BTreeSet::new();
    let mut results = Vec::new();
    loop {
        tokio::select! {
            joined = tasks.join_next() => {
                match joined {
                    Some(Ok(result)) => {
                        if let Some(url) = &result.canonical_url {
                            canonical.insert(url.clone());
                        }
                        results.push(result);
                    }
                    Some(Err(e)) => {
                        if !e.is_cancelled() {
                            log::error!("resolution task panicked: {}", e);
                        }
                    }
                    None => break,
                }
            }
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    log::warn!("resolution cancelled, returning partial results");
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        if let Ok(result) = joined {
                            if let Some(url) = &result.canonical_url {
                                canonical.insert(url.clone());
                            }
                            results.push(result);
                        }
                    }
                    break;
                }
            }
        }
    }

    log::info!(
        "resolved {} unique canonical link(s) from {} candidate(s)",
        canonical.len(),
        results.len()
    );
    PipelineOutput {
        canonical_urls: canonical.into_iter().collect(),
        results,
    }
}

/// Try one candidate up to `retries` times. A transient error or an empty
/// result both consume an attempt; the loop stops early on the first hit.
async fn resolve_with_retries(
    strategy: &dyn Strategy,
    raw_url: &str,
    retries: usize,
    timeout: Duration,
) -> ResolutionResult {
    let input = normalizer::normalize(raw_url);
    let mut last_error: Option<ErrorKind> = None;
    let mut attempts = 0;

    for attempt in 1..=retries {
        attempts = attempt;
        match tokio::time::timeout(timeout, strategy.resolve(&input)).await {
            Ok(Ok(Some(url))) => {
                return ResolutionResult {
                    raw_url: raw_url.to_string(),
                    source: strategy.source().to_string(),
                    canonical_url: Some(normalizer::normalize(&url)),
                    attempts,
                    last_error: None,
                };
            }
            Ok(Ok(None)) => {
                log::debug!(
                    "attempt {}/{}: no link found on {}",
                    attempt,
                    retries,
                    input
                );
            }
            Ok(Err(e)) => {
                log::warn!("attempt {}/{}: {} for {}", attempt, retries, e, input);
                last_error = Some(e.kind());
            }
            Err(_) => {
                log::warn!(
                    "attempt {}/{}: timed out after {:?} for {}",
                    attempt,
                    retries,
                    timeout,
                    input
                );
                last_error = Some(ErrorKind::Timeout);
            }
        }
        if attempt < retries {
            let pause = rand::thread_rng().gen_range(250..=750);
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
    }

    log::warn!(
        "retries exhausted for {} after {} attempt(s)",
        raw_url,
        attempts
    );
    ResolutionResult {
        raw_url: raw_url.to_string(),
        source: strategy.source().to_string(),
        canonical_url: None,
        attempts,
        last_error,
    }
}
