//! Append-only record of acquisition outcomes per course slug.
//!
//! Consulted before enrolling to avoid reprocessing courses that are already
//! settled, and appended to exactly once per target per run. Rows are never
//! updated or deleted except by wiping the file.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::error::FatalError;
use crate::models::{AcquisitionOutcome, LedgerEntry};

pub trait Ledger {
    /// Most recent outcome recorded for `slug`, if any.
    fn has_terminal_outcome(&self, slug: &str) -> Result<Option<AcquisitionOutcome>, FatalError>;

    /// Append one entry. Must be atomic: either the whole row lands or
    /// nothing does.
    fn append(&mut self, entry: &LedgerEntry) -> Result<(), FatalError>;
}

/// SQLite-backed ledger, one row per terminal outcome.
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FatalError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, FatalError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, FatalError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL,
                outcome TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ledger_slug ON ledger (slug);",
        )?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<usize, FatalError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ledger", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl Ledger for SqliteLedger {
    fn has_terminal_outcome(&self, slug: &str) -> Result<Option<AcquisitionOutcome>, FatalError> {
        let outcome: Option<String> = self
            .conn
            .query_row(
                "SELECT outcome FROM ledger WHERE slug = ?1 ORDER BY id DESC LIMIT 1",
                [slug],
                |row| row.get(0),
            )
            .optional()?;
        match outcome {
            Some(raw) => match AcquisitionOutcome::from_str(&raw) {
                Some(outcome) => Ok(Some(outcome)),
                None => {
                    log::warn!("unknown outcome '{}' in ledger for slug {}", raw, slug);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn append(&mut self, entry: &LedgerEntry) -> Result<(), FatalError> {
        self.conn.execute(
            "INSERT INTO ledger (slug, outcome, recorded_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                entry.slug,
                entry.outcome.as_str(),
                entry.recorded_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

/// In-memory ledger for tests and dry runs.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Vec<LedgerEntry>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }
}

impl Ledger for MemoryLedger {
    fn has_terminal_outcome(&self, slug: &str) -> Result<Option<AcquisitionOutcome>, FatalError> {
        Ok(self
            .entries
            .iter()
            .rev()
            .find(|e| e.slug == slug)
            .map(|e| e.outcome))
    }

    fn append(&mut self, entry: &LedgerEntry) -> Result<(), FatalError> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

/// Convenience constructor for an entry stamped now.
pub fn entry_now(slug: &str, outcome: AcquisitionOutcome) -> LedgerEntry {
    LedgerEntry {
        slug: slug.to_string(),
        outcome,
        recorded_at: Utc::now(),
    }
}
