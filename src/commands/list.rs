use anyhow::Result;

use crate::commands::{CommandReport, load_context, now_in};
use crate::granola::pipeline::ensure_vault;
use crate::granola::tracker::list_unprocessed;
use crate::granola::warn::{self, WarnEvent};

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub older_than_hours: Option<u64>,
}

pub fn run(opts: &ListOptions) -> Result<CommandReport> {
    let (_paths, cfg) = load_context()?;
    let layout = cfg.layout();
    ensure_vault(&layout)?;
    let mut report = CommandReport::new("list");

    let scan = list_unprocessed(
        &layout.transcripts_dir,
        opts.older_than_hours,
        now_in(cfg.tz()),
    )?;
    for artifact in &scan.artifacts {
        let header = &artifact.header;
        let attendees = if header.attendees.is_empty() {
            "none".to_string()
        } else {
            header.attendees.join(",")
        };
        report.detail(format!(
            "unprocessed={} date={} duration_minutes={} attendees={} title={}",
            artifact.file_name(),
            header.date.format("%Y-%m-%d"),
            header.duration_minutes,
            attendees,
            header.title
        ));
    }
    for warning in &scan.warnings {
        warn::emit(WarnEvent {
            code: "W_PARTIAL_SCAN",
            stage: "list",
            action: "scan",
            path: &warning.path.display().to_string(),
            reason: &warning.reason,
            ..WarnEvent::default()
        });
    }
    report.detail(format!("unprocessed_count={}", scan.artifacts.len()));
    report.detail(format!("skipped={}", scan.skipped()));
    Ok(report)
}
