//! JSON file cache under the data directory.
//!
//! Stores the candidate list handed over by the feed collaborator and the
//! canonical set produced by each run, so enrollment can resume from the last
//! resolution without re-scraping. All I/O here is best-effort from the
//! run's perspective; callers log and continue on error.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const CANDIDATES_FILE: &str = "candidates.json";
const CANONICAL_FILE: &str = "canonical.json";

pub struct Cache {
    data_dir: PathBuf,
}

impl Cache {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> io::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Raw feed URLs dumped by the feed collaborator. Missing file is an
    /// empty batch, not an error.
    pub fn read_candidates(&self) -> io::Result<Vec<String>> {
        self.read_list(CANDIDATES_FILE)
    }

    /// Canonical URLs from the previous run.
    pub fn read_canonical(&self) -> io::Result<BTreeSet<String>> {
        Ok(self.read_list(CANONICAL_FILE)?.into_iter().collect())
    }

    pub fn write_canonical(&self, urls: &[String]) -> io::Result<()> {
        self.write_list(CANONICAL_FILE, urls)
    }

    /// Per-source raw-link dump, mirroring what the feed produced.
    pub fn write_source_links(&self, source: &str, urls: &[String]) -> io::Result<()> {
        self.write_list(&format!("{}.json", source), urls)
    }

    fn read_list(&self, filename: &str) -> io::Result<Vec<String>> {
        let path = self.data_dir.join(filename);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn write_list(&self, filename: &str, urls: &[String]) -> io::Result<()> {
        let path = self.data_dir.join(filename);
        let json = serde_json::to_string_pretty(urls)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&path, json)?;
        log::info!("wrote {} entr(ies) to {}", urls.len(), path.display());
        Ok(())
    }
}

/// Canonical URLs present now but not in the previous run's set.
pub fn new_since(previous: &BTreeSet<String>, current: &[String]) -> Vec<String> {
    current
        .iter()
        .filter(|url| !previous.contains(*url))
        .cloned()
        .collect()
}
