//! Transcript header (front matter) codec.
//!
//! Headers are rendered by hand so key order is stable, and parsed back
//! through `serde_yaml` into a raw struct that is then validated. Updates
//! touch only the `processed:` line so user edits elsewhere survive.

use crate::granola::record::MeetingRecord;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_yaml::Value;

pub const SOURCE_MARKER: &str = "granola";
pub const TRANSCRIPT_HEADING: &str = "## Transcript";

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptHeader {
    pub date: NaiveDate,
    pub title: String,
    pub source: String,
    pub granola_id: String,
    pub duration_minutes: u64,
    pub entry_count: usize,
    pub attendees: Vec<String>,
    pub processed: bool,
}

impl TranscriptHeader {
    pub fn from_record(record: &MeetingRecord) -> Self {
        Self {
            date: record.date(),
            title: record.title.clone(),
            source: SOURCE_MARKER.to_string(),
            granola_id: record.id.clone(),
            duration_minutes: record.duration_minutes,
            entry_count: record.entry_count,
            attendees: record.attendees.clone(),
            processed: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    date: Option<Value>,
    title: Option<Value>,
    source: Option<String>,
    granola_id: Option<Value>,
    duration_minutes: Option<u64>,
    entry_count: Option<usize>,
    attendees: Option<Vec<Value>>,
    processed: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ParsedArtifact {
    pub header: TranscriptHeader,
    pub body: String,
}

impl ParsedArtifact {
    pub fn transcript_section(&self) -> &str {
        transcript_section(&self.body)
    }
}

/// Single-quoted scalar. Values carrying control characters switch to a
/// double-quoted scalar with escapes so they stay on one line.
pub fn yaml_quote(value: &str) -> String {
    if value.chars().any(|c| c < ' ') {
        return serde_json::Value::String(value.to_string()).to_string();
    }
    format!("'{}'", value.replace('\'', "''"))
}

pub fn render_header(header: &TranscriptHeader) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("date: {}\n", header.date.format("%Y-%m-%d")));
    out.push_str(&format!("title: {}\n", yaml_quote(&header.title)));
    out.push_str(&format!("source: {}\n", header.source));
    out.push_str(&format!("granola_id: {}\n", yaml_quote(&header.granola_id)));
    out.push_str(&format!("duration_minutes: {}\n", header.duration_minutes));
    out.push_str(&format!("entry_count: {}\n", header.entry_count));
    if !header.attendees.is_empty() {
        out.push_str("attendees:\n");
        for attendee in &header.attendees {
            out.push_str(&format!("  - {}\n", yaml_quote(attendee)));
        }
    }
    out.push_str(&format!("processed: {}\n", header.processed));
    out.push_str("---\n");
    out
}

/// Byte offsets of a leading front matter block.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    yaml_start: usize,
    yaml_end: usize,
    body_start: usize,
}

fn is_fence(line: &str) -> bool {
    line.trim_end_matches(['\r', '\n']) == "---"
}

fn front_matter_bounds(content: &str) -> Option<Bounds> {
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if !is_fence(first) {
        return None;
    }
    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        if is_fence(line) {
            return Some(Bounds {
                yaml_start,
                yaml_end: offset,
                body_start: offset + line.len(),
            });
        }
        offset += line.len();
    }
    None
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn validate(raw: RawHeader) -> Result<TranscriptHeader, String> {
    let date_raw = raw
        .date
        .as_ref()
        .and_then(scalar_string)
        .ok_or_else(|| "missing `date`".to_string())?;
    let date = NaiveDate::parse_from_str(date_raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid `date` `{date_raw}`"))?;
    let granola_id = raw
        .granola_id
        .as_ref()
        .and_then(scalar_string)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| "missing `granola_id`".to_string())?;
    let processed = raw
        .processed
        .ok_or_else(|| "missing `processed`".to_string())?;

    Ok(TranscriptHeader {
        date,
        title: raw
            .title
            .as_ref()
            .and_then(scalar_string)
            .unwrap_or_default(),
        source: raw.source.unwrap_or_default(),
        granola_id,
        duration_minutes: raw.duration_minutes.unwrap_or(0),
        entry_count: raw.entry_count.unwrap_or(0),
        attendees: raw
            .attendees
            .unwrap_or_default()
            .iter()
            .filter_map(scalar_string)
            .collect(),
        processed,
    })
}

/// Parse a transcript artifact into a validated header and its body.
pub fn parse_artifact(content: &str) -> Result<ParsedArtifact, String> {
    let bounds = front_matter_bounds(content).ok_or_else(|| "no header block".to_string())?;
    let yaml = &content[bounds.yaml_start..bounds.yaml_end];
    let raw: RawHeader =
        serde_yaml::from_str(yaml).map_err(|err| format!("header is not valid YAML: {err}"))?;
    let header = validate(raw)?;
    Ok(ParsedArtifact {
        header,
        body: content[bounds.body_start..].to_string(),
    })
}

/// Pull `granola_id` out of a header block without validating the rest.
pub fn scan_granola_id(content: &str) -> Option<String> {
    let bounds = front_matter_bounds(content)?;
    content[bounds.yaml_start..bounds.yaml_end]
        .lines()
        .find_map(|line| line.strip_prefix("granola_id:"))
        .map(|raw| raw.trim().trim_matches(['\'', '"']).trim().to_string())
        .filter(|id| !id.is_empty())
}

/// Text under the `## Transcript` heading, trimmed.
pub fn transcript_section(body: &str) -> &str {
    match body.find(TRANSCRIPT_HEADING) {
        Some(idx) => body[idx + TRANSCRIPT_HEADING.len()..].trim(),
        None => "",
    }
}

/// Set `processed: true` in the header block.
///
/// Returns `Ok(None)` when the flag is already set. Only the `processed:`
/// line changes (or is inserted before the closing fence); every other
/// byte of the file is preserved.
pub fn set_processed(content: &str) -> Result<Option<String>, String> {
    let bounds = front_matter_bounds(content).ok_or_else(|| "no header block".to_string())?;
    let raw: RawHeader = serde_yaml::from_str(&content[bounds.yaml_start..bounds.yaml_end])
        .map_err(|err| format!("header is not valid YAML: {err}"))?;
    if raw.processed == Some(true) {
        return Ok(None);
    }

    let mut out = String::with_capacity(content.len() + 16);
    out.push_str(&content[..bounds.yaml_start]);
    let mut replaced = false;
    for line in content[bounds.yaml_start..bounds.yaml_end].split_inclusive('\n') {
        if !replaced && line.starts_with("processed:") {
            let ending = if line.ends_with("\r\n") { "\r\n" } else { "\n" };
            out.push_str("processed: true");
            out.push_str(ending);
            replaced = true;
        } else {
            out.push_str(line);
        }
    }
    if !replaced {
        out.push_str("processed: true\n");
    }
    out.push_str(&content[bounds.yaml_end..]);
    Ok(Some(out))
}
