use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ErrorKind;

/// A raw URL observed from the feed, tagged with the middleman source it
/// came from. One per distinct URL per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    pub raw_url: String,
    pub source: String,
}

impl CandidateLink {
    pub fn new(raw_url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            raw_url: raw_url.into(),
            source: source.into(),
        }
    }
}

/// Outcome of resolving one candidate link. `canonical_url` is `None` when
/// every attempt came back empty or transiently failed.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    pub raw_url: String,
    pub source: String,
    pub canonical_url: Option<String>,
    pub attempts: usize,
    pub last_error: Option<ErrorKind>,
}

/// A resolved course URL plus the stable slug used for ledger bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionTarget {
    pub canonical_url: String,
    pub slug: String,
}

impl AcquisitionTarget {
    /// Derive the target from a canonical URL. The slug comes from the URL
    /// path, so two targets differing only in query parameters collapse to
    /// the same entity.
    pub fn from_canonical(canonical_url: &str) -> Self {
        Self {
            canonical_url: canonical_url.to_string(),
            slug: crate::normalizer::slug_of(canonical_url),
        }
    }
}

/// Terminal bucket for one acquisition target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionOutcome {
    /// The account already has the course.
    Owned,
    /// The course is not free; nothing attempted.
    Paid,
    /// Enrollment completed this run.
    Acquired,
    /// The page showed none of the expected signals (private or removed).
    Unavailable,
    /// Enrollment was attempted but never confirmed.
    Failed,
}

impl AcquisitionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionOutcome::Owned => "owned",
            AcquisitionOutcome::Paid => "paid",
            AcquisitionOutcome::Acquired => "acquired",
            AcquisitionOutcome::Unavailable => "unavailable",
            AcquisitionOutcome::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owned" => Some(AcquisitionOutcome::Owned),
            "paid" => Some(AcquisitionOutcome::Paid),
            "acquired" => Some(AcquisitionOutcome::Acquired),
            "unavailable" => Some(AcquisitionOutcome::Unavailable),
            "failed" => Some(AcquisitionOutcome::Failed),
            _ => None,
        }
    }

    /// Outcomes that make re-processing a slug pointless.
    pub fn is_settled(&self) -> bool {
        matches!(self, AcquisitionOutcome::Owned | AcquisitionOutcome::Acquired)
    }
}

/// One append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub slug: String,
    pub outcome: AcquisitionOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// Per-run aggregation of acquisition outcomes, used for the summary report
/// and the push notification.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub owned: usize,
    pub paid: usize,
    pub acquired: usize,
    pub unavailable: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: AcquisitionOutcome) {
        match outcome {
            AcquisitionOutcome::Owned => self.owned += 1,
            AcquisitionOutcome::Paid => self.paid += 1,
            AcquisitionOutcome::Acquired => self.acquired += 1,
            AcquisitionOutcome::Unavailable => self.unavailable += 1,
            AcquisitionOutcome::Failed => self.failed += 1,
        }
    }

    /// Record a target skipped via the ledger guard.
    pub fn record_skipped(&mut self, prior: AcquisitionOutcome) {
        self.skipped += 1;
        self.record(prior);
    }

    pub fn total(&self) -> usize {
        self.owned + self.paid + self.acquired + self.unavailable + self.failed
    }

    pub fn as_counts(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("owned", self.owned),
            ("paid", self.paid),
            ("acquired", self.acquired),
            ("unavailable", self.unavailable),
            ("failed", self.failed),
            ("skipped", self.skipped),
        ])
    }
}
