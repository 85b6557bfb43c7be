//! Feed parsing helpers.
//!
//! The feed collaborator hands over raw post URLs and post bodies; what this
//! module owns is the pure classification step: which middleman source a URL
//! belongs to, and pulling offer links out of post markdown. No network.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use url::Url;

use crate::models::CandidateLink;

/// Hostname labels that belong to the feed itself, never to a middleman.
const FEED_HOSTS: &[&str] = &["reddit", "redd"];

/// Markdown pattern used by aggregator posts that list several offers.
const OFFER_PATTERN: &str = r"\[REDEEM OFFER\]\((https?://[^)]+)\)";

/// Source identifier for a raw URL: the first hostname label, with a `www.`
/// prefix skipped. Feed-internal and unparsable URLs yield `None`.
pub fn source_of(raw_url: &str) -> Option<String> {
    let url = Url::parse(raw_url).ok()?;
    let host = url.host_str()?;
    let mut labels = host.split('.').filter(|l| !l.is_empty());
    let first = labels.next()?;
    let label = if first.eq_ignore_ascii_case("www") {
        labels.next()?
    } else {
        first
    };
    let label = label.to_lowercase();
    if FEED_HOSTS.contains(&label.as_str()) {
        return None;
    }
    Some(label)
}

/// Extract offer links embedded in a post body.
pub fn parse_markdown_offers(markdown: &str) -> Vec<String> {
    let pattern = Regex::new(OFFER_PATTERN).expect("static pattern");
    let mut found: BTreeSet<String> = BTreeSet::new();
    for capture in pattern.captures_iter(markdown) {
        found.insert(capture[1].to_string());
    }
    found.into_iter().collect()
}

/// Turn raw feed URLs into the pipeline's input, deduplicated per source.
/// URLs without a recognizable source are dropped here; URLs whose source
/// merely has no registered strategy are kept and dropped (with a log line)
/// by the pipeline instead.
pub fn candidates_from(raw_urls: &[String]) -> Vec<CandidateLink> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut candidates = Vec::new();
    for raw in raw_urls {
        let Some(source) = source_of(raw) else {
            log::debug!("no source for {}, dropping", raw);
            continue;
        };
        if seen.insert(raw.clone()) {
            candidates.push(CandidateLink::new(raw.clone(), source));
        }
    }
    candidates
}

/// Group candidates by source, for per-source reporting and cache files.
pub fn group_by_source(candidates: &[CandidateLink]) -> HashMap<String, Vec<String>> {
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for candidate in candidates {
        grouped
            .entry(candidate.source.clone())
            .or_default()
            .push(candidate.raw_url.clone());
    }
    for urls in grouped.values_mut() {
        urls.sort();
        urls.dedup();
    }
    grouped
}
