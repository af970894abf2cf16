use crate::granola::markdown::{add_section, append_to_section, find_section};
use crate::granola::record::MeetingRecord;
use crate::granola::util::truncate_with_ellipsis;
use chrono::NaiveDate;

pub const WORK_HEADING: &str = "## Work";
pub const MEETINGS_HEADING: &str = "## Meetings";
pub const BRAIN_DUMP_HEADING: &str = "## Brain Dump";
pub const NOTES_PENDING: &str = "*Notes pending*";

const MAX_SUMMARY_BULLETS: usize = 5;
const MAX_SUMMARY_CHARS: usize = 500;

pub fn skeleton(date: NaiveDate) -> String {
    format!(
        "# {} ({})\n\n## Schedule\n| Time | What |\n|------|------|\n\n---\n\n## Work\n\n---\n\n## Meetings\n\n---\n\n## Social / Follow-ups\n\n---\n\n## Brain Dump\n\n---\n",
        date.format("%Y-%m-%d"),
        date.format("%A"),
    )
}

pub fn meeting_marker(id: &str) -> String {
    format!("<!-- granola_id: {id} -->")
}

pub fn wiki_link(link_target: &str) -> String {
    format!("[[{link_target}]]")
}

fn summary_bullets(notes: &str) -> Vec<String> {
    let notes = notes.trim();
    if notes.is_empty() {
        return Vec::new();
    }
    truncate_with_ellipsis(notes, MAX_SUMMARY_CHARS)
        .lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .filter(|line| !line.is_empty())
        .take(MAX_SUMMARY_BULLETS)
        .map(|line| {
            if line.starts_with("- ") || line.starts_with("* ") {
                format!("- {}", line[2..].trim())
            } else {
                format!("- {line}")
            }
        })
        .collect()
}

/// Meeting block for the `## Meetings` section. `link_target` is the
/// vault-relative transcript path without its `.md` extension.
pub fn meeting_block(record: &MeetingRecord, link_target: &str) -> String {
    let mut out = format!("### {}\n", record.title);
    let bullets = summary_bullets(&record.notes_text);
    if bullets.is_empty() {
        out.push_str(NOTES_PENDING);
        out.push('\n');
    } else {
        for bullet in bullets {
            out.push_str(&bullet);
            out.push('\n');
        }
    }
    out.push_str(&format!("*→ {}*\n", wiki_link(link_target)));
    out.push_str(&meeting_marker(&record.id));
    out.push('\n');
    out
}

pub fn has_meeting(content: &str, id: &str, link_target: &str) -> bool {
    content.contains(&meeting_marker(id)) || content.contains(&wiki_link(link_target))
}

/// Append a meeting block, creating `## Meetings` when the note lacks it.
pub fn insert_meeting(content: &str, block: &str) -> String {
    let content = match find_section(content, MEETINGS_HEADING) {
        Some(_) => content.to_string(),
        None => add_section(content, MEETINGS_HEADING, Some(BRAIN_DUMP_HEADING)),
    };
    match find_section(&content, MEETINGS_HEADING) {
        Some(section) => append_to_section(&content, section, block),
        None => content,
    }
}

/// Guard for one meeting's action items. Keyed by id because two
/// meetings on the same day may share a title.
pub fn action_items_marker(id: &str) -> String {
    format!("<!-- granola_actions: {id} -->")
}

pub fn action_items_block(id: &str, title: &str, items: &[String]) -> String {
    let mut out = format!("*From {title}:*\n");
    for item in items {
        out.push_str(&format!("- [ ] {}\n", item.trim()));
    }
    out.push_str(&action_items_marker(id));
    out.push('\n');
    out
}

/// Append action items under `## Work`, creating the section when missing.
pub fn insert_action_items(content: &str, block: &str) -> String {
    let content = match find_section(content, WORK_HEADING) {
        Some(_) => content.to_string(),
        None => add_section(content, WORK_HEADING, Some(MEETINGS_HEADING)),
    };
    match find_section(&content, WORK_HEADING) {
        Some(section) => append_to_section(&content, section, block),
        None => content,
    }
}
