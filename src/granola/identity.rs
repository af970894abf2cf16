//! Which meeting ids already have a transcript in the vault.
//!
//! The index is rebuilt from transcript headers on every run. There is no
//! side database: the vault is the only durable record of what was synced.

use crate::granola::header::{parse_artifact, scan_granola_id};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Markdown files directly inside `dir`, sorted by file name.
pub fn transcript_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    by_id: BTreeMap<String, PathBuf>,
    unreadable: Vec<PathBuf>,
}

impl IdentityIndex {
    pub fn scan(transcripts_dir: &Path) -> Result<Self> {
        let mut index = Self::default();
        for path in transcript_files(transcripts_dir)? {
            let Ok(content) = fs::read_to_string(&path) else {
                index.unreadable.push(path);
                continue;
            };
            // A header that fails strict parsing still claims its id, so a
            // hand-edited file never gets a duplicate sibling.
            let id = match parse_artifact(&content) {
                Ok(parsed) => Some(parsed.header.granola_id),
                Err(_) => scan_granola_id(&content),
            };
            if let Some(id) = id {
                index.by_id.entry(id).or_insert(path);
            }
        }
        Ok(index)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// The transcript that claimed `id`, if any.
    pub fn path(&self, id: &str) -> Option<&Path> {
        self.by_id.get(id).map(PathBuf::as_path)
    }

    /// Record an artifact created during the current run.
    pub fn insert(&mut self, id: &str, path: PathBuf) {
        self.by_id.entry(id.to_string()).or_insert(path);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn unreadable(&self) -> &[PathBuf] {
        &self.unreadable
    }
}
