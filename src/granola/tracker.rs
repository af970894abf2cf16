//! Selection of transcripts still waiting for the enrichment pass.

use crate::error::SyncError;
use crate::granola::header::{ParsedArtifact, TranscriptHeader, parse_artifact};
use crate::granola::identity::transcript_files;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime};
use chrono_tz::Tz;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TranscriptArtifact {
    pub path: PathBuf,
    pub header: TranscriptHeader,
}

impl TranscriptArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// A transcript file skipped during a scan; never aborts the scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct UnprocessedScan {
    pub artifacts: Vec<TranscriptArtifact>,
    pub warnings: Vec<ScanWarning>,
}

impl UnprocessedScan {
    pub fn skipped(&self) -> usize {
        self.warnings.len()
    }
}

/// Read and validate one transcript.
pub fn load_artifact(path: &Path) -> Result<ParsedArtifact> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(SyncError::ArtifactNotFound(path.to_path_buf()).into());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    parse_artifact(&content).map_err(|reason| {
        SyncError::MalformedRecord {
            id: path.display().to_string(),
            reason,
        }
        .into()
    })
}

/// Age is counted from local midnight of the meeting date.
fn is_old_enough(header: &TranscriptHeader, older_than_hours: u64, now: DateTime<Tz>) -> bool {
    let start_of_day = header.date.and_time(NaiveTime::MIN);
    let elapsed = (now.naive_local() - start_of_day).num_seconds();
    elapsed >= 0 && elapsed as u64 >= older_than_hours.saturating_mul(3600)
}

/// Transcripts with `processed: false`, sorted by file name, optionally
/// restricted to meetings at least `older_than_hours` old.
pub fn list_unprocessed(
    transcripts_dir: &Path,
    older_than_hours: Option<u64>,
    now: DateTime<Tz>,
) -> Result<UnprocessedScan> {
    let mut scan = UnprocessedScan::default();
    for path in transcript_files(transcripts_dir)? {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                scan.warnings.push(ScanWarning {
                    path,
                    reason: format!("unreadable: {err}"),
                });
                continue;
            }
        };
        let parsed = match parse_artifact(&content) {
            Ok(parsed) => parsed,
            Err(reason) => {
                scan.warnings.push(ScanWarning { path, reason });
                continue;
            }
        };
        if parsed.header.processed {
            continue;
        }
        if let Some(hours) = older_than_hours
            && !is_old_enough(&parsed.header, hours, now)
        {
            continue;
        }
        scan.artifacts.push(TranscriptArtifact {
            path,
            header: parsed.header,
        });
    }
    Ok(scan)
}
