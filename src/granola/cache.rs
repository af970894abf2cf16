//! Granola cache reader.
//!
//! The cache file is double-JSON-encoded: its top-level `cache` field holds a
//! JSON string which parses to `{ "state": { documents, transcripts, events } }`.
//! An already-decoded `cache` object is accepted too.

use crate::error::SyncError;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// One transcript id with its matching document, as stored in the cache.
#[derive(Debug, Clone, Copy)]
pub struct RawEntry<'a> {
    pub id: &'a str,
    pub document: Option<&'a Value>,
    pub segments: &'a Value,
}

impl RawEntry<'_> {
    /// Transcripts with zero segments were never recorded and are not synced.
    pub fn is_empty(&self) -> bool {
        match self.segments {
            Value::Array(items) => items.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub path: PathBuf,
    documents: Map<String, Value>,
    transcripts: Map<String, Value>,
    events: Option<usize>,
}

fn unavailable(path: &Path, reason: impl Into<String>) -> SyncError {
    SyncError::CacheUnavailable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn take_object(state: &mut Map<String, Value>, key: &str, path: &Path) -> Result<Map<String, Value>, SyncError> {
    match state.remove(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(unavailable(path, format!("state.{key} is not an object"))),
    }
}

impl CacheSnapshot {
    /// Read and decode the cache file. Any failure is fatal for the run.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Err(unavailable(path, "file not found"));
        }
        let raw = fs::read_to_string(path).map_err(|err| unavailable(path, err.to_string()))?;
        Self::parse(path, &raw)
    }

    pub fn parse(path: &Path, raw: &str) -> Result<Self, SyncError> {
        let outer: Value = serde_json::from_str(raw)
            .map_err(|err| unavailable(path, format!("outer JSON invalid: {err}")))?;
        let inner = match outer.get("cache") {
            Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded)
                .map_err(|err| unavailable(path, format!("inner JSON invalid: {err}")))?,
            Some(obj @ Value::Object(_)) => obj.clone(),
            Some(_) => return Err(unavailable(path, "`cache` field is neither string nor object")),
            None => return Err(unavailable(path, "missing `cache` field")),
        };

        let Some(Value::Object(mut state)) = inner.get("state").cloned() else {
            return Err(unavailable(path, "missing `state` object"));
        };
        let documents = take_object(&mut state, "documents", path)?;
        let transcripts = take_object(&mut state, "transcripts", path)?;
        let events = state.get("events").and_then(Value::as_array).map(Vec::len);

        Ok(Self {
            path: path.to_path_buf(),
            documents,
            transcripts,
            events,
        })
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn transcript_count(&self) -> usize {
        self.transcripts.len()
    }

    pub fn event_count(&self) -> Option<usize> {
        self.events
    }

    /// Lazily yield one entry per transcript id, in id order.
    pub fn entries(&self) -> impl Iterator<Item = RawEntry<'_>> + '_ {
        let mut ids: Vec<&String> = self.transcripts.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(move |id| {
            let segments = self.transcripts.get(id)?;
            Some(RawEntry {
                id: id.as_str(),
                document: self.documents.get(id),
                segments,
            })
        })
    }
}

#[cfg(test)]
pub(crate) fn encode_cache(state: &Value) -> String {
    let inner = serde_json::json!({ "state": state }).to_string();
    serde_json::json!({ "cache": inner }).to_string()
}
