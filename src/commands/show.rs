use anyhow::Result;

use crate::commands::{CommandReport, load_context};
use crate::error::SyncError;
use crate::granola::paths::vault_relative;
use crate::granola::pipeline::resolve_file;
use crate::granola::tracker::load_artifact;

#[derive(Debug, Clone)]
pub struct ShowOptions {
    pub file: String,
}

pub fn run(opts: &ShowOptions) -> Result<CommandReport> {
    let (_paths, cfg) = load_context()?;
    let layout = cfg.layout();
    let mut report = CommandReport::new("show");

    let path = resolve_file(&layout, &opts.file);
    let parsed = match load_artifact(&path) {
        Ok(parsed) => parsed,
        Err(err) => match err.downcast_ref::<SyncError>() {
            Some(SyncError::ArtifactNotFound(_)) => {
                report.issue(format!("transcript not found: {}", opts.file));
                return Ok(report);
            }
            Some(malformed @ SyncError::MalformedRecord { .. }) => {
                report.issue(malformed.to_string());
                return Ok(report);
            }
            _ => return Err(err),
        },
    };

    let header = &parsed.header;
    report.detail(format!("path={}", vault_relative(&layout.root, &path)));
    report.detail(format!("date={}", header.date.format("%Y-%m-%d")));
    report.detail(format!("title={}", header.title));
    report.detail(format!("source={}", header.source));
    report.detail(format!("granola_id={}", header.granola_id));
    report.detail(format!("duration_minutes={}", header.duration_minutes));
    report.detail(format!("entry_count={}", header.entry_count));
    report.detail(format!("attendees={}", header.attendees.join(",")));
    report.detail(format!("processed={}", header.processed));
    report.detail(format!(
        "transcript_chars={}",
        parsed.transcript_section().chars().count()
    ));
    report.detail(parsed.body.trim().to_string());
    Ok(report)
}
