use anyhow::Result;

use crate::commands::{CommandReport, load_context, now_in};
use crate::granola::audit;
use crate::granola::pipeline::run_sync;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
}

pub fn run(opts: &SyncOptions) -> Result<CommandReport> {
    let (paths, cfg) = load_context()?;
    let mut report = CommandReport::new("sync");
    if opts.dry_run {
        report.detail("dry_run=true");
    }

    let outcome = match run_sync(&cfg, opts.dry_run, now_in(cfg.tz())) {
        Ok(outcome) => outcome,
        Err(err) => {
            audit::append_event(&paths, "sync", "failed", &format!("{err:#}"))?;
            return Err(err);
        }
    };

    for path in &outcome.created_paths {
        report.detail(format!("created={path}"));
    }
    report.detail(format!("indexed_before={}", outcome.indexed));
    report.detail(format!("created_count={}", outcome.created));
    report.detail(format!("skipped_duplicate={}", outcome.skipped_duplicate));
    report.detail(format!("malformed={}", outcome.malformed));
    report.detail(format!("empty={}", outcome.empty));
    report.detail(format!("daily_entries_added={}", outcome.daily_entries_added));
    report.detail(format!(
        "unprocessed_older_than_{}h={}",
        cfg.process.auto_process_after_hours, outcome.unprocessed_due
    ));
    if outcome.scan_warnings > 0 {
        report.detail(format!("scan_skipped={}", outcome.scan_warnings));
    }
    if outcome.failed > 0 {
        report.issue(format!(
            "{} transcript or daily note write(s) failed; see GRANOLA_WARN lines",
            outcome.failed
        ));
    }

    let status = if outcome.failed > 0 { "partial" } else { "ok" };
    let message = format!(
        "created={} skipped_duplicate={} malformed={} failed={} dry_run={}",
        outcome.created, outcome.skipped_duplicate, outcome.malformed, outcome.failed, opts.dry_run
    );
    audit::append_event(&paths, "sync", status, &message)?;
    Ok(report)
}
