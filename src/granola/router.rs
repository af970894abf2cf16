//! Keyword routing of enrichment results into project notes.
//!
//! The project index is a Markdown list in the vault:
//!
//! ```text
//! - [[Projects/Apollo]]: apollo, launch plan
//! - `Clients/Acme.md`: acme, renewal
//! ```
//!
//! Every entry whose keywords occur in the routing text receives one
//! summary block, in index order.

use crate::granola::markdown::{find_section, insert_after_heading};
use crate::granola::util::write_atomic;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path};

const ROUTE_HEADINGS: [&str; 2] = ["## Meeting Notes", "## Updates"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIndexEntry {
    /// Destination note, relative to the vault root, always ending in `.md`.
    pub destination: String,
    /// Lowercased keywords.
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Appended,
    AlreadyPresent,
    Planned,
    MissingDestination,
}

fn clean_destination(raw: &str) -> Option<String> {
    let mut dest = raw.trim().trim_matches('`').trim();
    if let Some(inner) = dest.strip_prefix("[[").and_then(|d| d.strip_suffix("]]")) {
        dest = inner.split('|').next().unwrap_or(inner).trim();
    }
    if dest.is_empty() {
        return None;
    }
    let path = Path::new(dest);
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return None;
    }
    if dest.ends_with(".md") {
        Some(dest.to_string())
    } else {
        Some(format!("{dest}.md"))
    }
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    // Split after a closing `]]` or backtick first so paths may contain `:`.
    for closer in ["]]", "`"] {
        if let Some(idx) = line.rfind(closer)
            && let Some(rest) = line[idx + closer.len()..].trim_start().strip_prefix(':')
        {
            return Some((&line[..idx + closer.len()], rest));
        }
    }
    line.split_once(':')
}

pub fn parse_project_index(raw: &str) -> Vec<ProjectIndexEntry> {
    let mut entries = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        let Some(item) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        else {
            continue;
        };
        let Some((dest_raw, keywords_raw)) = split_entry(item) else {
            continue;
        };
        let Some(destination) = clean_destination(dest_raw) else {
            continue;
        };
        let keywords: Vec<String> = keywords_raw
            .split(',')
            .map(|kw| kw.trim().to_lowercase())
            .filter(|kw| !kw.is_empty())
            .collect();
        if keywords.is_empty() {
            continue;
        }
        entries.push(ProjectIndexEntry {
            destination,
            keywords,
        });
    }
    entries
}

/// Missing index file means no entries.
pub fn load_project_index(path: &Path) -> Result<Vec<ProjectIndexEntry>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(parse_project_index(&raw)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Case-insensitive whole-word (or whole-phrase) match.
pub fn keyword_matches(haystack_lower: &str, keyword_lower: &str) -> bool {
    if keyword_lower.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = haystack_lower[from..].find(keyword_lower) {
        let start = from + pos;
        let end = start + keyword_lower.len();
        let before_ok = haystack_lower[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack_lower[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        from = start
            + haystack_lower[start..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    false
}

/// All matching entries in index order; a destination listed twice is
/// routed once.
pub fn match_destinations<'a>(
    entries: &'a [ProjectIndexEntry],
    text: &str,
) -> Vec<&'a ProjectIndexEntry> {
    let haystack = text.to_lowercase();
    let mut matched: Vec<&ProjectIndexEntry> = Vec::new();
    for entry in entries {
        if matched.iter().any(|m| m.destination == entry.destination) {
            continue;
        }
        if entry.keywords.iter().any(|kw| keyword_matches(&haystack, kw)) {
            matched.push(entry);
        }
    }
    matched
}

pub fn block_heading(date: NaiveDate, title: &str) -> String {
    format!("### {} - {}", date.format("%Y-%m-%d"), title)
}

pub fn render_block(date: NaiveDate, title: &str, lines: &[String]) -> String {
    let mut out = block_heading(date, title);
    out.push('\n');
    for line in lines {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn has_heading_line(content: &str, heading: &str) -> bool {
    content.lines().any(|line| line.trim_end() == heading)
}

/// Add `block` to a destination note, newest first under its routing
/// heading. Destinations are never created.
pub fn apply_route(
    vault_root: &Path,
    destination: &str,
    heading: &str,
    block: &str,
    dry_run: bool,
) -> Result<RouteOutcome> {
    let path = vault_root.join(destination);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Ok(RouteOutcome::MissingDestination);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    if has_heading_line(&content, heading) {
        return Ok(RouteOutcome::AlreadyPresent);
    }
    if dry_run {
        return Ok(RouteOutcome::Planned);
    }

    let updated = match ROUTE_HEADINGS
        .iter()
        .find_map(|h| find_section(&content, h))
    {
        Some(section) => insert_after_heading(&content, section, block),
        None => format!("{}\n\n{}\n\n{block}", content.trim_end(), ROUTE_HEADINGS[0]),
    };
    write_atomic(&path, &updated)?;
    Ok(RouteOutcome::Appended)
}
