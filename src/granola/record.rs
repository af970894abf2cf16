//! Canonical meeting records built from raw cache entries.

use crate::error::SyncError;
use crate::granola::cache::RawEntry;
use crate::granola::util::normalize_whitespace;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};

pub const UNTITLED_MEETING: &str = "Untitled Meeting";

const PARAGRAPH_MAX_SEGMENTS: usize = 10;
const PARAGRAPH_MIN_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct MeetingRecord {
    pub id: String,
    pub title: String,
    pub started_at: DateTime<Tz>,
    pub duration_minutes: u64,
    pub attendees: Vec<String>,
    pub notes_text: String,
    pub transcript_text: String,
    pub entry_count: usize,
}

impl MeetingRecord {
    pub fn date(&self) -> NaiveDate {
        self.started_at.date_naive()
    }

    /// Local start time as `HHMM`, used to disambiguate filenames.
    pub fn hhmm(&self) -> String {
        self.started_at.format("%H%M").to_string()
    }
}

fn malformed(id: &str, reason: &str) -> SyncError {
    SyncError::MalformedRecord {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse an RFC 3339 timestamp; naive ISO timestamps are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn segment_timestamp(segment: Option<&Value>, key: &str) -> Option<DateTime<Utc>> {
    segment?.get(key)?.as_str().and_then(parse_timestamp)
}

fn calendar_time(doc: &Map<String, Value>, edge: &str) -> Option<DateTime<Utc>> {
    doc.get("google_calendar_event")?
        .get(edge)?
        .get("dateTime")?
        .as_str()
        .and_then(parse_timestamp)
}

fn start_time(segments: &[Value], doc: &Map<String, Value>) -> Option<DateTime<Utc>> {
    segment_timestamp(segments.first(), "start_timestamp")
        .or_else(|| str_field(doc, "created_at").and_then(parse_timestamp))
        .or_else(|| str_field(doc, "createdAt").and_then(parse_timestamp))
        .or_else(|| calendar_time(doc, "start"))
}

fn duration_minutes(segments: &[Value], doc: &Map<String, Value>) -> u64 {
    let from_segments = if segments.len() >= 2 {
        segment_timestamp(segments.first(), "start_timestamp")
            .zip(segment_timestamp(segments.last(), "end_timestamp"))
    } else {
        None
    };
    let span = from_segments.or_else(|| calendar_time(doc, "start").zip(calendar_time(doc, "end")));
    span.map(|(start, end)| (end - start).num_minutes().max(0) as u64)
        .unwrap_or(0)
}

fn push_unique(out: &mut Vec<String>, candidate: &str) {
    let candidate = normalize_whitespace(candidate);
    if candidate.is_empty() || out.iter().any(|seen| seen.eq_ignore_ascii_case(&candidate)) {
        return;
    }
    out.push(candidate);
}

fn person_label(person: &Value) -> Option<&str> {
    match person {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => str_field(obj, "email").or_else(|| str_field(obj, "name")),
        _ => None,
    }
}

fn attendees(doc: &Map<String, Value>) -> Vec<String> {
    let mut out = Vec::new();
    let people = match doc.get("people") {
        Some(Value::Object(people)) => people.get("attendees").and_then(Value::as_array),
        Some(Value::Array(list)) => Some(list),
        _ => None,
    };
    for person in people.into_iter().flatten() {
        if let Some(label) = person_label(person) {
            push_unique(&mut out, label);
        }
    }

    let calendar = doc
        .get("google_calendar_event")
        .and_then(|event| event.get("attendees"))
        .and_then(Value::as_array);
    for guest in calendar.into_iter().flatten() {
        if let Some(email) = guest.get("email").and_then(Value::as_str) {
            push_unique(&mut out, email);
        }
    }
    out
}

fn notes_text(doc: &Map<String, Value>) -> String {
    ["notes_markdown", "notes_plain", "notes"]
        .iter()
        .find_map(|key| {
            doc.get(*key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        })
        .unwrap_or_default()
        .to_string()
}

fn segment_text(segment: &Value) -> Option<String> {
    let text = match segment.get("text")? {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("content")
            .or_else(|| obj.get("text"))
            .and_then(Value::as_str)?
            .to_string(),
        _ => return None,
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Join segment texts into paragraphs separated by blank lines.
pub fn transcript_paragraphs(segments: &[Value]) -> String {
    let mut paragraphs = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for text in segments.iter().filter_map(segment_text) {
        let ends_sentence = text.ends_with(['.', '!', '?']);
        current.push(text);
        if current.len() >= PARAGRAPH_MAX_SEGMENTS || ends_sentence {
            let joined = current.join(" ");
            if joined.chars().count() > PARAGRAPH_MIN_CHARS {
                paragraphs.push(joined);
                current.clear();
            }
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs.join("\n\n")
}

/// Map one raw cache entry to a canonical record.
///
/// Optional fields default to empty or zero; only a missing document,
/// non-list segments or the absence of any usable timestamp are fatal
/// for the entry.
pub fn normalize(entry: &RawEntry<'_>, tz: Tz) -> Result<MeetingRecord, SyncError> {
    let Some(document) = entry.document else {
        return Err(malformed(entry.id, "no document for transcript"));
    };
    let Value::Object(doc) = document else {
        return Err(malformed(entry.id, "document is not an object"));
    };
    let segments: &[Value] = match entry.segments {
        Value::Array(items) => items,
        Value::Null => &[],
        _ => return Err(malformed(entry.id, "transcript segments are not a list")),
    };

    let started = start_time(segments, doc)
        .ok_or_else(|| malformed(entry.id, "no parseable timestamp"))?;

    Ok(MeetingRecord {
        id: entry.id.to_string(),
        // Titles land in single-line YAML and markdown headings.
        title: str_field(doc, "title")
            .map_or_else(|| UNTITLED_MEETING.to_string(), normalize_whitespace),
        started_at: started.with_timezone(&tz),
        duration_minutes: duration_minutes(segments, doc),
        attendees: attendees(doc),
        notes_text: notes_text(doc),
        transcript_text: transcript_paragraphs(segments),
        entry_count: segments.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::{UNTITLED_MEETING, normalize, transcript_paragraphs};
    use crate::error::SyncError;
    use crate::granola::cache::RawEntry;
    use serde_json::{Value, json};

    fn entry<'a>(id: &'a str, doc: Option<&'a Value>, segments: &'a Value) -> RawEntry<'a> {
        RawEntry {
            id,
            document: doc,
            segments,
        }
    }

    #[test]
    fn builds_record_from_segments_and_people() {
        let doc = json!({
            "title": "Team Standup",
            "people": {"attendees": [
                {"email": "kevin@example.com"},
                {"name": "Dana"},
                "kevin@example.com"
            ]},
            "google_calendar_event": {"attendees": [{"email": "ops@example.com"}]},
            "notes_markdown": "",
            "notes_plain": "Shipped the release."
        });
        let segments = json!([
            {"text": "Morning all.", "start_timestamp": "2026-01-15T09:00:00.000Z", "end_timestamp": "2026-01-15T09:00:05Z"},
            {"text": {"content": "Let's go."}, "start_timestamp": "2026-01-15T09:30:00Z", "end_timestamp": "2026-01-15T09:45:00Z"}
        ]);
        let record = normalize(&entry("abc123", Some(&doc), &segments), chrono_tz::UTC)
            .expect("normalize");

        assert_eq!(record.title, "Team Standup");
        assert_eq!(record.date().to_string(), "2026-01-15");
        assert_eq!(record.hhmm(), "0900");
        assert_eq!(record.duration_minutes, 45);
        assert_eq!(
            record.attendees,
            vec!["kevin@example.com", "Dana", "ops@example.com"]
        );
        assert_eq!(record.notes_text, "Shipped the release.");
        assert_eq!(record.transcript_text, "Morning all. Let's go.");
        assert_eq!(record.entry_count, 2);
    }

    #[test]
    fn line_breaks_in_title_and_attendees_are_folded() {
        let doc = json!({
            "title": "Plan\n---\nReview",
            "people": {"attendees": [{"name": "Dana\r\nLee"}, "dana\tlee"]}
        });
        let segments = json!([{"text": "hi", "start_timestamp": "2026-01-15T09:00:00Z"}]);
        let record = normalize(&entry("abc", Some(&doc), &segments), chrono_tz::UTC)
            .expect("normalize");
        assert_eq!(record.title, "Plan --- Review");
        assert_eq!(record.attendees, vec!["Dana Lee"]);
    }

    #[test]
    fn optional_fields_default_and_timezone_shifts_date() {
        let doc = json!({"createdAt": "2026-01-15T23:30:00Z"});
        let segments = json!([{"text": "only one"}]);
        let record = normalize(&entry("x", Some(&doc), &segments), chrono_tz::Asia::Tokyo)
            .expect("normalize");
        assert_eq!(record.title, UNTITLED_MEETING);
        assert_eq!(record.date().to_string(), "2026-01-16");
        assert_eq!(record.duration_minutes, 0);
        assert!(record.attendees.is_empty());
        assert!(record.notes_text.is_empty());
    }

    #[test]
    fn falls_back_to_calendar_event_for_time_and_duration() {
        let doc = json!({
            "title": "Planning",
            "google_calendar_event": {
                "start": {"dateTime": "2026-02-01T14:00:00+01:00"},
                "end": {"dateTime": "2026-02-01T15:30:00+01:00"}
            }
        });
        let segments = json!([{"text": "hello"}]);
        let record = normalize(&entry("cal", Some(&doc), &segments), chrono_tz::UTC)
            .expect("normalize");
        assert_eq!(record.hhmm(), "1300");
        assert_eq!(record.duration_minutes, 90);
    }

    #[test]
    fn malformed_entries_are_tagged() {
        let segments = json!([{"text": "x", "start_timestamp": "2026-01-15T09:00:00Z"}]);
        let err = normalize(&entry("orphan", None, &segments), chrono_tz::UTC)
            .expect_err("no document");
        assert!(matches!(err, SyncError::MalformedRecord { ref id, .. } if id == "orphan"));

        let doc = json!("not an object");
        assert!(normalize(&entry("s", Some(&doc), &segments), chrono_tz::UTC).is_err());

        let doc = json!({"title": "No time"});
        let undated = json!([{"text": "x"}]);
        let err = normalize(&entry("t", Some(&doc), &undated), chrono_tz::UTC)
            .expect_err("no timestamp");
        assert!(err.to_string().contains("no parseable timestamp"));

        let bad_segments = json!({"text": "x"});
        assert!(normalize(&entry("u", Some(&doc), &bad_segments), chrono_tz::UTC).is_err());
    }

    #[test]
    fn paragraphs_close_on_long_sentences_or_ten_segments() {
        let long = "word ".repeat(110);
        let segments = json!([
            {"text": format!("{}end.", long)},
            {"text": "next paragraph"},
        ]);
        let text = transcript_paragraphs(segments.as_array().expect("array"));
        let parts: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], "next paragraph");

        let short: Vec<Value> = (0..12).map(|i| json!({"text": format!("s{i}.")})).collect();
        let text = transcript_paragraphs(&short);
        assert!(!text.contains("\n\n"), "short sentences stay in one paragraph");
    }
}
