//! Sync run and enrichment run orchestration.
//!
//! Store-level problems (missing vault, unreadable cache) abort a run.
//! Everything scoped to one record or one transcript is counted, warned
//! about and skipped so the rest of the batch still goes through.

use crate::error::SyncError;
use crate::granola::cache::CacheSnapshot;
use crate::granola::config::{SyncConfig, VaultLayout};
use crate::granola::enrich::{EnrichInput, Enricher};
use crate::granola::identity::IdentityIndex;
use crate::granola::paths::{expand_tilde, vault_relative};
use crate::granola::record::{MeetingRecord, normalize};
use crate::granola::router::{
    ProjectIndexEntry, RouteOutcome, apply_route, block_heading, load_project_index,
    match_destinations, render_block,
};
use crate::granola::tracker::{ScanWarning, TranscriptArtifact, list_unprocessed, load_artifact};
use crate::granola::warn::{self, WarnEvent};
use crate::granola::writer::{AppendOutcome, ArtifactWriter, link_target};
use anyhow::Result;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use std::path::PathBuf;

const W_PARTIAL_SCAN: &str = "W_PARTIAL_SCAN";

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncOutcome {
    pub dry_run: bool,
    pub created: usize,
    pub skipped_duplicate: usize,
    pub malformed: usize,
    pub empty: usize,
    pub failed: usize,
    pub daily_entries_added: usize,
    pub indexed: usize,
    pub created_paths: Vec<String>,
    pub unprocessed_due: usize,
    pub scan_warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    File(String),
    All,
    Auto,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactResult {
    pub file: String,
    pub status: String,
    pub action_items: usize,
    /// Outcome of the daily action-item append, `none` when nothing was extracted.
    pub daily: String,
    pub routed: Vec<String>,
    pub missing_destinations: Vec<String>,
}

impl ArtifactResult {
    fn new(file: String, status: &str) -> Self {
        Self {
            file,
            status: status.to_string(),
            action_items: 0,
            daily: "none".to_string(),
            routed: Vec::new(),
            missing_destinations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessOutcome {
    pub dry_run: bool,
    pub enricher: String,
    pub selected: usize,
    pub processed: usize,
    pub already_processed: usize,
    pub too_short: usize,
    pub enrichment_failed: usize,
    pub apply_failed: usize,
    pub vanished: usize,
    pub action_items_added: usize,
    pub routed: usize,
    pub unrouted: usize,
    pub missing_destination: usize,
    pub still_unprocessed: usize,
    pub scan_warnings: Vec<ScanWarning>,
    pub results: Vec<ArtifactResult>,
    #[serde(skip)]
    pub processed_paths: Vec<PathBuf>,
}

fn error_code(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<SyncError>()
        .map_or("E_IO", SyncError::code)
}

fn count_daily(
    record: &MeetingRecord,
    daily: Result<AppendOutcome>,
    outcome: &mut SyncOutcome,
) {
    match daily {
        Ok(appended) => {
            if appended.changed() {
                outcome.daily_entries_added += 1;
            }
        }
        Err(err) => {
            outcome.failed += 1;
            warn::emit(WarnEvent {
                code: error_code(&err),
                stage: "sync",
                action: "daily",
                record: &record.id,
                err: &format!("{err:#}"),
                ..WarnEvent::default()
            });
        }
    }
}

pub fn ensure_vault(layout: &VaultLayout) -> Result<()> {
    if layout.root.is_dir() {
        Ok(())
    } else {
        Err(SyncError::VaultUnavailable(layout.root.clone()).into())
    }
}

fn warn_scan(stage: &str, warning: &ScanWarning) {
    warn::emit(WarnEvent {
        code: W_PARTIAL_SCAN,
        stage,
        action: "scan",
        path: &warning.path.display().to_string(),
        reason: &warning.reason,
        ..WarnEvent::default()
    });
}

/// Materialise every cache entry that has no transcript in the vault yet.
pub fn run_sync(cfg: &SyncConfig, dry_run: bool, now: DateTime<Tz>) -> Result<SyncOutcome> {
    let layout = cfg.layout();
    ensure_vault(&layout)?;
    let snapshot = CacheSnapshot::load(&cfg.cache_path())?;
    let mut index = IdentityIndex::scan(&layout.transcripts_dir)?;
    for path in index.unreadable() {
        warn_scan(
            "sync",
            &ScanWarning {
                path: path.clone(),
                reason: "unreadable transcript".to_string(),
            },
        );
    }

    let tz = cfg.tz();
    let mut writer = ArtifactWriter::new(&layout, dry_run);
    let mut outcome = SyncOutcome {
        dry_run,
        indexed: index.len(),
        ..SyncOutcome::default()
    };

    for entry in snapshot.entries() {
        if entry.is_empty() {
            outcome.empty += 1;
            continue;
        }
        let record = match normalize(&entry, tz) {
            Ok(record) => record,
            Err(err) => {
                outcome.malformed += 1;
                warn::emit(WarnEvent {
                    code: err.code(),
                    stage: "sync",
                    action: "normalize",
                    record: entry.id,
                    reason: &err.to_string(),
                    ..WarnEvent::default()
                });
                continue;
            }
        };
        // The daily entry is re-derived for known ids too, so a run that
        // died between the two writes heals on the next pass.
        if let Some(existing) = index.path(&record.id) {
            outcome.skipped_duplicate += 1;
            let daily = writer.append_daily_meeting_entry(&record, existing);
            count_daily(&record, daily, &mut outcome);
            continue;
        }

        match writer.create_transcript(&record) {
            Ok(created) => {
                outcome.created += 1;
                outcome
                    .created_paths
                    .push(vault_relative(&layout.root, &created.path));
                count_daily(&record, created.daily, &mut outcome);
                index.insert(&record.id, created.path);
            }
            Err(err) => {
                outcome.failed += 1;
                warn::emit(WarnEvent {
                    code: error_code(&err),
                    stage: "sync",
                    action: "create",
                    record: &record.id,
                    err: &format!("{err:#}"),
                    ..WarnEvent::default()
                });
            }
        }
    }

    let due = list_unprocessed(
        &layout.transcripts_dir,
        Some(cfg.process.auto_process_after_hours),
        now,
    )?;
    for warning in &due.warnings {
        warn_scan("sync", warning);
    }
    outcome.unprocessed_due = due.artifacts.len();
    outcome.scan_warnings = due.skipped();
    Ok(outcome)
}

/// A `--file` argument: an existing path, else a name inside the transcripts folder.
pub fn resolve_file(layout: &VaultLayout, raw: &str) -> PathBuf {
    let direct = expand_tilde(raw);
    if direct.is_file() {
        return direct;
    }
    let name = if raw.ends_with(".md") {
        raw.to_string()
    } else {
        format!("{raw}.md")
    };
    layout.transcripts_dir.join(name)
}

fn select(
    cfg: &SyncConfig,
    layout: &VaultLayout,
    selection: &Selection,
    now: DateTime<Tz>,
    outcome: &mut ProcessOutcome,
) -> Result<Vec<TranscriptArtifact>> {
    let older_than = match selection {
        Selection::File(raw) => {
            let path = resolve_file(layout, raw);
            let parsed = load_artifact(&path)?;
            return Ok(vec![TranscriptArtifact {
                path,
                header: parsed.header,
            }]);
        }
        Selection::All => None,
        Selection::Auto => Some(cfg.process.auto_process_after_hours),
    };
    let scan = list_unprocessed(&layout.transcripts_dir, older_than, now)?;
    for warning in &scan.warnings {
        warn_scan("process", warning);
    }
    outcome.scan_warnings = scan.warnings;
    Ok(scan.artifacts)
}

/// Enrich the selected transcripts and flip them to processed once every
/// resulting append has landed.
pub fn run_process(
    cfg: &SyncConfig,
    selection: &Selection,
    enricher: &dyn Enricher,
    dry_run: bool,
    now: DateTime<Tz>,
) -> Result<ProcessOutcome> {
    let layout = cfg.layout();
    ensure_vault(&layout)?;
    let mut outcome = ProcessOutcome {
        dry_run,
        enricher: enricher.label(),
        ..ProcessOutcome::default()
    };
    let artifacts = select(cfg, &layout, selection, now, &mut outcome)?;
    outcome.selected = artifacts.len();
    if artifacts.is_empty() {
        return Ok(outcome);
    }

    let index = load_project_index(&layout.projects_index)?;
    let writer = ArtifactWriter::new(&layout, dry_run);
    for artifact in &artifacts {
        let result = process_one(
            cfg,
            &layout,
            &writer,
            enricher,
            &index,
            artifact,
            &mut outcome,
        );
        outcome.results.push(result);
    }
    let flipped = if dry_run { 0 } else { outcome.processed };
    outcome.still_unprocessed = outcome
        .selected
        .saturating_sub(flipped + outcome.already_processed);
    Ok(outcome)
}

fn process_one(
    cfg: &SyncConfig,
    layout: &VaultLayout,
    writer: &ArtifactWriter<'_>,
    enricher: &dyn Enricher,
    index: &[ProjectIndexEntry],
    artifact: &TranscriptArtifact,
    outcome: &mut ProcessOutcome,
) -> ArtifactResult {
    let file = artifact.file_name();
    let warn_for = |code: &str, action: &str, reason: &str, err: &str| {
        warn::emit(WarnEvent {
            code,
            stage: "process",
            action,
            record: &artifact.header.granola_id,
            path: &file,
            reason,
            err,
        });
    };

    // Re-read: the file may have changed or vanished since selection.
    let parsed = match load_artifact(&artifact.path) {
        Ok(parsed) => parsed,
        Err(err) => {
            let vanished = matches!(
                err.downcast_ref::<SyncError>(),
                Some(SyncError::ArtifactNotFound(_))
            );
            if vanished {
                outcome.vanished += 1;
            } else {
                outcome.apply_failed += 1;
            }
            warn_for(error_code(&err), "load", "", &format!("{err:#}"));
            let status = if vanished { "vanished" } else { "apply_failed" };
            return ArtifactResult::new(file.clone(), status);
        }
    };
    let header = &parsed.header;
    if header.processed {
        outcome.already_processed += 1;
        return ArtifactResult::new(file.clone(), "already_processed");
    }

    let transcript = parsed.transcript_section();
    if transcript.chars().count() < cfg.process.min_transcript_chars {
        outcome.too_short += 1;
        warn_for("W_TOO_SHORT", "select", "transcript below minimum length", "");
        return ArtifactResult::new(file.clone(), "too_short");
    }

    let input = EnrichInput::new(
        &header.title,
        header.date,
        &header.attendees,
        transcript,
        cfg.enrich.max_transcript_chars,
    );
    let extraction = match enricher.enrich(&input) {
        Ok(extraction) => extraction,
        Err(err) => {
            outcome.enrichment_failed += 1;
            warn_for("E_ENRICHMENT_FAILURE", "enrich", "", &format!("{err:#}"));
            return ArtifactResult::new(file.clone(), "enrichment_failed");
        }
    };

    let mut result = ArtifactResult::new(file.clone(), "processed");
    let mut apply_failed = false;

    let items: Vec<String> = extraction
        .action_items
        .iter()
        .take(cfg.process.max_action_items)
        .cloned()
        .collect();
    if !items.is_empty() {
        match writer.append_action_items(
            header.date,
            &header.granola_id,
            &header.title,
            &items,
        ) {
            Ok(appended) => {
                result.daily = appended.label().to_string();
                if appended.changed() {
                    result.action_items = items.len();
                    outcome.action_items_added += items.len();
                }
            }
            Err(err) => {
                apply_failed = true;
                warn_for(error_code(&err), "action_items", "", &format!("{err:#}"));
            }
        }
    }

    let routing_text = format!(
        "{}\n{}\n{}",
        header.title,
        header.attendees.join(" "),
        extraction.routing_text()
    );
    let matched = match_destinations(index, &routing_text);
    if matched.is_empty() {
        outcome.unrouted += 1;
        warn_for("W_UNROUTED", "route", "no project keyword matched", "");
    }
    let heading = block_heading(header.date, &header.title);
    let mut lines = extraction.routed_lines();
    lines.push(format!(
        "*→ [[{}]]*",
        link_target(&layout.root, &artifact.path)
    ));
    let block = render_block(header.date, &header.title, &lines);
    for entry in matched {
        match apply_route(&layout.root, &entry.destination, &heading, &block, writer.dry_run()) {
            Ok(RouteOutcome::MissingDestination) => {
                outcome.missing_destination += 1;
                result.missing_destinations.push(entry.destination.clone());
                warn_for(
                    "W_MISSING_DESTINATION",
                    "route",
                    &format!("destination {} does not exist", entry.destination),
                    "",
                );
            }
            Ok(_) => {
                outcome.routed += 1;
                result.routed.push(entry.destination.clone());
            }
            Err(err) => {
                apply_failed = true;
                warn_for(error_code(&err), "route", &entry.destination, &format!("{err:#}"));
            }
        }
    }

    if apply_failed {
        outcome.apply_failed += 1;
        result.status = "apply_failed".to_string();
        return result;
    }

    match writer.mark_processed(&artifact.path) {
        Ok(AppendOutcome::AlreadyPresent) => {
            outcome.already_processed += 1;
            result.status = "already_processed".to_string();
        }
        Ok(marked) => {
            outcome.processed += 1;
            if marked == AppendOutcome::Planned {
                result.status = "planned".to_string();
            } else {
                outcome.processed_paths.push(artifact.path.clone());
            }
        }
        Err(err) => {
            let vanished = matches!(
                err.downcast_ref::<SyncError>(),
                Some(SyncError::ArtifactNotFound(_))
            );
            if vanished {
                outcome.vanished += 1;
                result.status = "vanished".to_string();
            } else {
                outcome.apply_failed += 1;
                result.status = "apply_failed".to_string();
            }
            warn_for(error_code(&err), "mark_processed", "", &format!("{err:#}"));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::{Selection, run_process, run_sync};
    use crate::error::SyncError;
    use crate::granola::cache::encode_cache;
    use crate::granola::config::SyncConfig;
    use crate::granola::enrich::{EnrichInput, Enricher, Extraction};
    use crate::granola::header::parse_artifact;
    use crate::granola::tracker::list_unprocessed;
    use anyhow::Result;
    use chrono::{DateTime, TimeZone};
    use chrono_tz::Tz;
    use serde_json::{Value, json};
    use std::cell::Cell;
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    struct StubEnricher {
        extraction: Extraction,
        fail: bool,
        calls: Cell<usize>,
    }

    impl StubEnricher {
        fn returning(extraction: Extraction) -> Self {
            Self {
                extraction,
                fail: false,
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                extraction: Extraction::default(),
                fail: true,
                calls: Cell::new(0),
            }
        }
    }

    impl Enricher for StubEnricher {
        fn label(&self) -> String {
            "stub".to_string()
        }

        fn enrich(&self, _input: &EnrichInput) -> Result<Extraction> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(SyncError::EnrichmentFailure("timeout".to_string()).into());
            }
            Ok(self.extraction.clone())
        }
    }

    struct Fixture {
        _tmp: TempDir,
        cfg: SyncConfig,
        vault: std::path::PathBuf,
    }

    fn long_text() -> String {
        "We reviewed the Apollo launch plan and everyone agreed on the timeline. ".repeat(4)
    }

    fn standup_state() -> Value {
        json!({
            "documents": {
                "abc123": {
                    "title": "Team Standup",
                    "people": {"attendees": [{"email": "kevin@example.com"}]},
                    "notes_markdown": "Shipped the release"
                }
            },
            "transcripts": {
                "abc123": [
                    {"text": long_text(), "start_timestamp": "2026-01-15T09:00:00Z", "end_timestamp": "2026-01-15T09:10:00Z"},
                    {"text": "Kevin will send the recap.", "start_timestamp": "2026-01-15T09:40:00Z", "end_timestamp": "2026-01-15T09:45:00Z"}
                ]
            }
        })
    }

    fn fixture(state: &Value) -> Fixture {
        let tmp = tempdir().expect("tempdir");
        let vault = tmp.path().join("vault");
        fs::create_dir_all(&vault).expect("vault");
        let cache = tmp.path().join("cache-v3.json");
        fs::write(&cache, encode_cache(state)).expect("cache");

        let mut cfg = SyncConfig::default();
        cfg.vault.root = vault.display().to_string();
        cfg.cache.path = cache.display().to_string();
        Fixture {
            _tmp: tmp,
            cfg,
            vault,
        }
    }

    fn now() -> DateTime<Tz> {
        chrono_tz::UTC
            .with_ymd_and_hms(2026, 1, 20, 12, 0, 0)
            .single()
            .expect("now")
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).expect("read")
    }

    #[test]
    fn sync_twice_is_idempotent() {
        let fx = fixture(&standup_state());
        let first = run_sync(&fx.cfg, false, now()).expect("first sync");
        assert_eq!(first.created, 1);
        assert_eq!(first.daily_entries_added, 1);
        assert_eq!(first.unprocessed_due, 1);

        let transcript = fx.vault.join("Meetings/Transcripts/2026-01-15 - Team Standup.md");
        let daily = fx.vault.join("Daily/2026-01-15.md");
        let header = parse_artifact(&read(&transcript)).expect("parse").header;
        assert_eq!(header.granola_id, "abc123");
        assert_eq!(header.duration_minutes, 45);
        assert_eq!(header.attendees, vec!["kevin@example.com"]);
        assert!(!header.processed);
        let daily_before = read(&daily);

        let second = run_sync(&fx.cfg, false, now()).expect("second sync");
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped_duplicate, 1);
        assert_eq!(second.daily_entries_added, 0);
        assert_eq!(read(&daily), daily_before);
    }

    #[test]
    fn daily_entry_lost_to_failed_write_is_restored_on_rerun() {
        let fx = fixture(&standup_state());
        let daily_dir = fx.vault.join("Daily");
        fs::write(&daily_dir, "not a directory").expect("block daily dir");

        let first = run_sync(&fx.cfg, false, now()).expect("first sync");
        assert_eq!(first.created, 1);
        assert_eq!(first.failed, 1);
        assert_eq!(first.daily_entries_added, 0);
        let transcript = fx.vault.join("Meetings/Transcripts/2026-01-15 - Team Standup.md");
        assert!(transcript.exists());

        fs::remove_file(&daily_dir).expect("unblock daily dir");
        let second = run_sync(&fx.cfg, false, now()).expect("second sync");
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped_duplicate, 1);
        assert_eq!(second.failed, 0);
        assert_eq!(second.daily_entries_added, 1);
        let daily = read(&daily_dir.join("2026-01-15.md"));
        assert_eq!(daily.matches("### Team Standup").count(), 1);
        assert!(daily.contains("[[Meetings/Transcripts/2026-01-15 - Team Standup]]"));

        let third = run_sync(&fx.cfg, false, now()).expect("third sync");
        assert_eq!(third.daily_entries_added, 0);
        assert_eq!(read(&daily_dir.join("2026-01-15.md")), daily);
    }

    #[test]
    fn multiline_title_is_recognised_on_later_runs() {
        let mut state = standup_state();
        state["documents"]["abc123"]["title"] = json!("Plan\n---\nReview");
        let fx = fixture(&state);
        let created: Vec<usize> = (0..3)
            .map(|_| run_sync(&fx.cfg, false, now()).expect("sync").created)
            .collect();
        assert_eq!(created, vec![1, 0, 0]);

        let dir = fx.vault.join("Meetings/Transcripts");
        let files: Vec<_> = fs::read_dir(&dir).expect("list").collect();
        assert_eq!(files.len(), 1);
        let header = parse_artifact(&read(&dir.join("2026-01-15 - Plan --- Review.md")))
            .expect("parse")
            .header;
        assert_eq!(header.title, "Plan --- Review");
        assert_eq!(header.granola_id, "abc123");
    }

    #[test]
    fn changed_cache_content_never_rewrites_existing_artifact() {
        let fx = fixture(&standup_state());
        run_sync(&fx.cfg, false, now()).expect("first sync");
        let transcript = fx.vault.join("Meetings/Transcripts/2026-01-15 - Team Standup.md");
        let before = read(&transcript);

        let mut edited = standup_state();
        edited["documents"]["abc123"]["notes_markdown"] = json!("Completely different notes");
        fs::write(&fx.cfg.cache.path, encode_cache(&edited)).expect("rewrite cache");
        let again = run_sync(&fx.cfg, false, now()).expect("second sync");
        assert_eq!(again.skipped_duplicate, 1);
        assert_eq!(read(&transcript), before);
    }

    #[test]
    fn malformed_and_empty_entries_do_not_abort_the_batch() {
        let mut state = standup_state();
        state["transcripts"]["orphan"] = json!([{"text": "x", "start_timestamp": "2026-01-15T09:00:00Z"}]);
        state["transcripts"]["silent"] = json!([]);
        state["documents"]["silent"] = json!({"title": "Silent"});
        let fx = fixture(&state);
        let outcome = run_sync(&fx.cfg, false, now()).expect("sync");
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.malformed, 1);
        assert_eq!(outcome.empty, 1);
    }

    #[test]
    fn missing_cache_and_vault_are_fatal() {
        let fx = fixture(&standup_state());
        let mut cfg = fx.cfg.clone();
        cfg.cache.path = fx.vault.join("nope.json").display().to_string();
        let err = run_sync(&cfg, false, now()).expect_err("no cache");
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::CacheUnavailable { .. })
        ));
        assert!(!fx.vault.join("Meetings").exists());

        let mut cfg = fx.cfg.clone();
        cfg.vault.root = fx.vault.join("missing").display().to_string();
        let err = run_sync(&cfg, false, now()).expect_err("no vault");
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::VaultUnavailable(_))
        ));
    }

    #[test]
    fn dry_run_sync_writes_nothing() {
        let fx = fixture(&standup_state());
        let outcome = run_sync(&fx.cfg, true, now()).expect("dry sync");
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.created_paths, vec!["Meetings/Transcripts/2026-01-15 - Team Standup.md"]);
        assert!(!fx.vault.join("Meetings").exists());
        assert!(!fx.vault.join("Daily").exists());
    }

    #[test]
    fn colliding_titles_produce_distinct_artifacts() {
        let mut state = standup_state();
        state["documents"]["zzz999"] = json!({"title": "Team Standup"});
        state["transcripts"]["zzz999"] = json!([
            {"text": "Second standup.", "start_timestamp": "2026-01-15T16:30:00Z"}
        ]);
        let fx = fixture(&state);
        let outcome = run_sync(&fx.cfg, false, now()).expect("sync");
        assert_eq!(outcome.created, 2);
        let dir = fx.vault.join("Meetings/Transcripts");
        assert!(dir.join("2026-01-15 - Team Standup.md").exists());
        assert!(dir.join("2026-01-15 - Team Standup (1630).md").exists());
        let daily = read(&fx.vault.join("Daily/2026-01-15.md"));
        assert_eq!(daily.matches("### Team Standup").count(), 2);
    }

    #[test]
    fn process_marks_processed_and_routes_in_index_order_once() {
        let fx = fixture(&standup_state());
        run_sync(&fx.cfg, false, now()).expect("sync");
        fs::create_dir_all(fx.vault.join("Projects")).expect("projects");
        fs::write(fx.vault.join("Projects/Apollo.md"), "# Apollo\n\n## Updates\n").expect("apollo");
        fs::write(fx.vault.join("Projects/Team.md"), "# Team\n").expect("team");
        fs::write(
            fx.vault.join("projects-index.md"),
            "- [[Projects/Apollo]]: apollo\n- [[Projects/Team]]: standup\n- [[Projects/Ghost]]: kevin\n",
        )
        .expect("index");

        let stub = StubEnricher::returning(Extraction {
            action_items: vec!["Kevin: send the recap".to_string()],
            decisions: vec!["Ship the Apollo launch plan".to_string()],
            metrics: vec![],
            summary: vec!["Timeline agreed".to_string()],
        });
        let outcome = run_process(&fx.cfg, &Selection::All, &stub, false, now()).expect("process");
        assert_eq!(outcome.selected, 1);
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.routed, 2);
        assert_eq!(outcome.missing_destination, 1);
        assert_eq!(outcome.action_items_added, 1);
        assert_eq!(outcome.still_unprocessed, 0);
        assert_eq!(
            outcome.results[0].routed,
            vec!["Projects/Apollo.md", "Projects/Team.md"]
        );
        assert!(!fx.vault.join("Projects/Ghost.md").exists());

        let daily = read(&fx.vault.join("Daily/2026-01-15.md"));
        assert!(daily.contains("*From Team Standup:*\n- [ ] Kevin: send the recap"));
        let apollo = read(&fx.vault.join("Projects/Apollo.md"));
        assert!(apollo.contains("### 2026-01-15 - Team Standup\n- Timeline agreed"));

        let remaining = list_unprocessed(&fx.vault.join("Meetings/Transcripts"), None, now())
            .expect("scan");
        assert!(remaining.artifacts.is_empty());

        // Forcing the same file again changes nothing.
        let again = run_process(
            &fx.cfg,
            &Selection::File("2026-01-15 - Team Standup".to_string()),
            &stub,
            false,
            now(),
        )
        .expect("again");
        assert_eq!(again.already_processed, 1);
        assert_eq!(stub.calls.get(), 1);
        assert_eq!(read(&fx.vault.join("Projects/Apollo.md")), apollo);
    }

    #[test]
    fn enrichment_failure_leaves_artifact_unprocessed() {
        let fx = fixture(&standup_state());
        run_sync(&fx.cfg, false, now()).expect("sync");
        let outcome =
            run_process(&fx.cfg, &Selection::All, &StubEnricher::failing(), false, now())
                .expect("process");
        assert_eq!(outcome.enrichment_failed, 1);
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.still_unprocessed, 1);

        let remaining = list_unprocessed(&fx.vault.join("Meetings/Transcripts"), None, now())
            .expect("scan");
        assert_eq!(remaining.artifacts.len(), 1);
    }

    #[test]
    fn too_short_and_dry_run_leave_state_alone() {
        let mut state = standup_state();
        state["transcripts"]["abc123"] = json!([
            {"text": "Hi.", "start_timestamp": "2026-01-15T09:00:00Z"}
        ]);
        let fx = fixture(&state);
        run_sync(&fx.cfg, false, now()).expect("sync");
        let stub = StubEnricher::returning(Extraction::default());
        let outcome = run_process(&fx.cfg, &Selection::All, &stub, false, now()).expect("process");
        assert_eq!(outcome.too_short, 1);
        assert_eq!(stub.calls.get(), 0);

        let fx = fixture(&standup_state());
        run_sync(&fx.cfg, false, now()).expect("sync");
        let transcript = fx.vault.join("Meetings/Transcripts/2026-01-15 - Team Standup.md");
        let before = read(&transcript);
        let stub = StubEnricher::returning(Extraction {
            action_items: vec!["Do the thing".to_string()],
            ..Extraction::default()
        });
        let outcome = run_process(&fx.cfg, &Selection::All, &stub, true, now()).expect("dry");
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.results[0].status, "planned");
        assert_eq!(read(&transcript), before);
        assert!(!read(&fx.vault.join("Daily/2026-01-15.md")).contains("Do the thing"));
    }

    #[test]
    fn auto_selection_respects_age() {
        let fx = fixture(&standup_state());
        run_sync(&fx.cfg, false, now()).expect("sync");
        let stub = StubEnricher::returning(Extraction::default());
        let early = chrono_tz::UTC
            .with_ymd_and_hms(2026, 1, 16, 12, 0, 0)
            .single()
            .expect("early");
        let outcome = run_process(&fx.cfg, &Selection::Auto, &stub, false, early).expect("auto");
        assert_eq!(outcome.selected, 0);
        let outcome = run_process(&fx.cfg, &Selection::Auto, &stub, false, now()).expect("auto");
        assert_eq!(outcome.selected, 1);
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.unrouted, 1);
    }

    #[test]
    fn missing_file_selection_is_artifact_not_found() {
        let fx = fixture(&standup_state());
        let stub = StubEnricher::returning(Extraction::default());
        let err = run_process(
            &fx.cfg,
            &Selection::File("nope.md".to_string()),
            &stub,
            false,
            now(),
        )
        .expect_err("missing");
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::ArtifactNotFound(_))
        ));
    }
}
