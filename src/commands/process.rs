use anyhow::Result;

use crate::commands::{CommandReport, load_context, now_in};
use crate::error::SyncError;
use crate::granola::audit;
use crate::granola::enrich::resolve_enricher;
use crate::granola::paths::vault_relative;
use crate::granola::pipeline::{Selection, run_process};

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub selection: Selection,
    pub dry_run: bool,
}

pub fn run(opts: &ProcessOptions) -> Result<CommandReport> {
    let (paths, cfg) = load_context()?;
    let mut report = CommandReport::new("process");
    let enricher = resolve_enricher(&cfg.enrich)?;
    report.detail(format!("enricher={}", enricher.label()));
    if opts.dry_run {
        report.detail("dry_run=true");
    }

    let outcome = match run_process(
        &cfg,
        &opts.selection,
        enricher.as_ref(),
        opts.dry_run,
        now_in(cfg.tz()),
    ) {
        Ok(outcome) => outcome,
        Err(err) => {
            // A bad --file selection is reported, not fatal.
            if let Some(typed) = err.downcast_ref::<SyncError>()
                && !typed.is_fatal()
            {
                report.issue(typed.to_string());
                return Ok(report);
            }
            audit::append_event(&paths, "process", "failed", &format!("{err:#}"))?;
            return Err(err);
        }
    };

    let layout = cfg.layout();
    for path in &outcome.processed_paths {
        audit::append_event(
            &paths,
            "process",
            "processed",
            &vault_relative(&layout.root, path),
        )?;
    }

    for result in &outcome.results {
        let mut line = format!(
            "artifact={} status={} action_items={}",
            result.file, result.status, result.action_items
        );
        if !result.routed.is_empty() {
            line.push_str(&format!(" routed={}", result.routed.join(",")));
        }
        if !result.missing_destinations.is_empty() {
            line.push_str(&format!(
                " missing_destination={}",
                result.missing_destinations.join(",")
            ));
        }
        if result.daily != "none" {
            line.push_str(&format!(" daily={}", result.daily));
        }
        report.detail(line);
    }
    report.detail(format!("selected={}", outcome.selected));
    report.detail(format!("processed={}", outcome.processed));
    report.detail(format!("already_processed={}", outcome.already_processed));
    report.detail(format!("too_short={}", outcome.too_short));
    report.detail(format!("action_items_added={}", outcome.action_items_added));
    report.detail(format!("routed={}", outcome.routed));
    report.detail(format!("unrouted={}", outcome.unrouted));
    report.detail(format!("missing_destination={}", outcome.missing_destination));
    report.detail(format!("still_unprocessed={}", outcome.still_unprocessed));
    if !outcome.scan_warnings.is_empty() {
        report.detail(format!("scan_skipped={}", outcome.scan_warnings.len()));
    }

    if outcome.enrichment_failed > 0 {
        report.issue(format!(
            "enrichment failed for {} transcript(s); left unprocessed",
            outcome.enrichment_failed
        ));
    }
    if outcome.apply_failed > 0 {
        report.issue(format!(
            "{} transcript(s) could not be updated; left unprocessed",
            outcome.apply_failed
        ));
    }
    if outcome.vanished > 0 {
        report.detail(format!("vanished={}", outcome.vanished));
    }

    let status = if report.ok { "ok" } else { "partial" };
    let message = format!(
        "selected={} processed={} still_unprocessed={} enricher={} dry_run={}",
        outcome.selected, outcome.processed, outcome.still_unprocessed, outcome.enricher, opts.dry_run
    );
    audit::append_event(&paths, "process", status, &message)?;
    Ok(report)
}
