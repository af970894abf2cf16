use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::granola::cache::CacheSnapshot;
use crate::granola::config::{SyncConfig, load_config};
use crate::granola::enrich::resolve_enricher;
use crate::granola::paths::{SyncPaths, resolve_paths};
use crate::granola::router::load_project_index;

include!(concat!(env!("OUT_DIR"), "/env_allowlist.rs"));

/// Recognised `GRANOLA_SYNC_*` variables that are currently set.
pub fn active_env_overrides() -> Vec<(&'static str, String)> {
    GENERATED_ENV_ALLOWLIST
        .iter()
        .filter_map(|key| env::var(key).ok().map(|value| (*key, value)))
        .collect()
}

fn cache_report(cfg: &SyncConfig) -> CommandReport {
    let mut report = CommandReport::new("status");
    let cache_path = cfg.cache_path();
    report.detail(format!("cache_path={}", cache_path.display()));
    match CacheSnapshot::load(&cache_path) {
        Ok(snapshot) => {
            report.detail(format!("cache_documents={}", snapshot.document_count()));
            report.detail(format!("cache_transcripts={}", snapshot.transcript_count()));
            if let Some(events) = snapshot.event_count() {
                report.detail(format!("cache_events={events}"));
            }
        }
        Err(err) => report.issue(err.to_string()),
    }
    report
}

fn vault_report(cfg: &SyncConfig) -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    let layout = cfg.layout();
    report.detail(format!("vault_root={}", layout.root.display()));
    report.detail(format!("transcripts_dir={}", layout.transcripts_dir.display()));
    report.detail(format!("daily_dir={}", layout.daily_dir.display()));
    report.detail(format!("projects_index={}", layout.projects_index.display()));
    if !layout.root.is_dir() {
        report.issue(format!("vault root missing: {}", layout.root.display()));
        return Ok(report);
    }
    if !layout.transcripts_dir.exists() {
        report.detail("transcripts_dir_present=false");
    }
    if layout.projects_index.exists() {
        let entries = load_project_index(&layout.projects_index)?;
        report.detail(format!("project_index_entries={}", entries.len()));
    } else {
        report.detail("projects_index_present=false");
    }
    Ok(report)
}

fn home_details(report: &mut CommandReport, paths: &SyncPaths) {
    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!(
        "config_file={} present={}",
        paths.config_file.display(),
        paths.config_file.exists()
    ));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");
    report.detail(format!("build_id={}", env!("BUILD_ID")));
    home_details(&mut report, &paths);

    for (key, value) in active_env_overrides() {
        report.detail(format!("env.{key}={value}"));
    }

    let cfg = match load_config(&paths) {
        Ok(cfg) => cfg,
        Err(err) => {
            report.issue(format!("{err:#}"));
            return Ok(report);
        }
    };
    report.detail(format!("timezone={}", cfg.tz()));
    report.merge(vault_report(&cfg)?);
    report.merge(cache_report(&cfg));

    match resolve_enricher(&cfg.enrich) {
        Ok(enricher) => report.detail(format!("enricher={}", enricher.label())),
        Err(err) => report.issue(format!("{err:#}")),
    }
    Ok(report)
}
