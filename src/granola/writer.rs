//! Vault mutations: transcript creation, daily note appends and the
//! processed flag. Every write goes through a temp file in the target
//! directory followed by a rename. With `dry_run` set, the writer reports
//! what it would change and touches nothing.

use crate::error::SyncError;
use crate::granola::config::VaultLayout;
use crate::granola::daily;
use crate::granola::header::{TranscriptHeader, render_header, set_processed};
use crate::granola::paths::vault_relative;
use crate::granola::record::{MeetingRecord, UNTITLED_MEETING};
use crate::granola::util::{sanitize_filename, write_atomic, write_new_atomic};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const NOTES_PLACEHOLDER: &str = "*No AI notes available*";

const MAX_COLLISION_SUFFIX: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    AlreadyPresent,
    /// Dry run: the append would have happened.
    Planned,
}

impl AppendOutcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Appended => "appended",
            Self::AlreadyPresent => "already_present",
            Self::Planned => "planned",
        }
    }

    pub fn changed(self) -> bool {
        !matches!(self, Self::AlreadyPresent)
    }
}

/// A transcript on disk (or planned, in a dry run). The daily append is
/// reported on its own so a failure there never hides the new file.
#[derive(Debug)]
pub struct CreatedTranscript {
    pub path: PathBuf,
    pub daily: Result<AppendOutcome>,
}

pub fn render_transcript(record: &MeetingRecord) -> String {
    let mut out = render_header(&TranscriptHeader::from_record(record));
    out.push_str("\n## Notes\n\n");
    let notes = record.notes_text.trim();
    out.push_str(if notes.is_empty() { NOTES_PLACEHOLDER } else { notes });
    out.push_str("\n\n---\n\n## Transcript\n\n");
    out.push_str(record.transcript_text.trim());
    out.push('\n');
    out
}

/// `Meetings/Transcripts/2026-01-15 - Standup.md` becomes
/// `Meetings/Transcripts/2026-01-15 - Standup`.
pub fn link_target(vault_root: &Path, path: &Path) -> String {
    let relative = vault_relative(vault_root, path);
    match relative.strip_suffix(".md") {
        Some(stem) => stem.to_string(),
        None => relative,
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

pub struct ArtifactWriter<'a> {
    layout: &'a VaultLayout,
    dry_run: bool,
    // Names handed out during this run, so dry runs disambiguate like real ones.
    reserved: BTreeSet<PathBuf>,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(layout: &'a VaultLayout, dry_run: bool) -> Self {
        Self {
            layout,
            dry_run,
            reserved: BTreeSet::new(),
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    fn candidate_names(record: &MeetingRecord) -> impl Iterator<Item = String> {
        let mut title = sanitize_filename(&record.title);
        if title.is_empty() {
            title = UNTITLED_MEETING.to_string();
        }
        let base = format!("{} - {}", record.date().format("%Y-%m-%d"), title);
        let hhmm = record.hhmm();
        (0..=MAX_COLLISION_SUFFIX).map(move |n| match n {
            0 => format!("{base}.md"),
            1 => format!("{base} ({hhmm}).md"),
            n => format!("{base} ({hhmm}-{n}).md"),
        })
    }

    /// Write a new transcript with `processed: false` under a name no other
    /// file holds, then add its block to the daily note.
    pub fn create_transcript(&mut self, record: &MeetingRecord) -> Result<CreatedTranscript> {
        let content = render_transcript(record);
        let mut chosen = None;
        for name in Self::candidate_names(record) {
            let path = self.layout.transcripts_dir.join(name);
            if self.reserved.contains(&path) || path.exists() {
                continue;
            }
            if self.dry_run || write_new_atomic(&path, &content)? {
                chosen = Some(path);
                break;
            }
        }
        let path = chosen.with_context(|| {
            format!(
                "no free transcript filename for `{}` on {}",
                record.title,
                record.date()
            )
        })?;
        self.reserved.insert(path.clone());

        let daily = self.append_daily_meeting_entry(record, &path);
        Ok(CreatedTranscript { path, daily })
    }

    pub fn append_daily_meeting_entry(
        &self,
        record: &MeetingRecord,
        transcript_path: &Path,
    ) -> Result<AppendOutcome> {
        let daily_path = self.layout.daily_file(record.date());
        let target = link_target(&self.layout.root, transcript_path);
        let existing = read_optional(&daily_path)?;
        if let Some(content) = &existing
            && daily::has_meeting(content, &record.id, &target)
        {
            return Ok(AppendOutcome::AlreadyPresent);
        }
        if self.dry_run {
            return Ok(AppendOutcome::Planned);
        }

        let base = existing.unwrap_or_else(|| daily::skeleton(record.date()));
        let block = daily::meeting_block(record, &target);
        write_atomic(&daily_path, &daily::insert_meeting(&base, &block))?;
        Ok(AppendOutcome::Appended)
    }

    /// Add enrichment action items to the `## Work` section of a daily note,
    /// at most once per meeting id.
    pub fn append_action_items(
        &self,
        date: NaiveDate,
        id: &str,
        title: &str,
        items: &[String],
    ) -> Result<AppendOutcome> {
        let daily_path = self.layout.daily_file(date);
        let existing = read_optional(&daily_path)?;
        if let Some(content) = &existing
            && content.contains(&daily::action_items_marker(id))
        {
            return Ok(AppendOutcome::AlreadyPresent);
        }
        if self.dry_run {
            return Ok(AppendOutcome::Planned);
        }

        let base = existing.unwrap_or_else(|| daily::skeleton(date));
        let block = daily::action_items_block(id, title, items);
        write_atomic(&daily_path, &daily::insert_action_items(&base, &block))?;
        Ok(AppendOutcome::Appended)
    }

    /// Flip `processed` to true. A vanished file is `ArtifactNotFound`;
    /// already-processed files are left alone.
    pub fn mark_processed(&self, path: &Path) -> Result<AppendOutcome> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SyncError::ArtifactNotFound(path.to_path_buf()).into());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        let updated = set_processed(&content).map_err(|reason| SyncError::MalformedRecord {
            id: path.display().to_string(),
            reason,
        })?;
        let Some(updated) = updated else {
            return Ok(AppendOutcome::AlreadyPresent);
        };
        if self.dry_run {
            return Ok(AppendOutcome::Planned);
        }
        write_atomic(path, &updated)?;
        Ok(AppendOutcome::Appended)
    }
}
