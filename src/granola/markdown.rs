//! Line-level helpers for editing `## ` sections of vault notes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Byte offset of the heading line.
    pub heading_start: usize,
    /// Byte offset just past the heading line.
    pub body_start: usize,
    /// Byte offset of the next `## ` heading, or the end of the content.
    pub end: usize,
}

fn lines_with_offsets(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content.split_inclusive('\n').scan(0usize, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line))
    })
}

fn bare(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n']).trim_end()
}

pub fn find_section(content: &str, heading: &str) -> Option<Section> {
    let mut found: Option<(usize, usize)> = None;
    for (start, line) in lines_with_offsets(content) {
        match found {
            None if bare(line) == heading => found = Some((start, start + line.len())),
            Some((heading_start, body_start)) if line.starts_with("## ") => {
                return Some(Section {
                    heading_start,
                    body_start,
                    end: start,
                });
            }
            _ => {}
        }
    }
    found.map(|(heading_start, body_start)| Section {
        heading_start,
        body_start,
        end: content.len(),
    })
}

/// Insert `block` at the end of a section, ahead of a trailing `---` rule.
///
/// `block` is expected to end with a newline. A blank line is kept on
/// both sides of the inserted text.
pub fn append_to_section(content: &str, section: Section, block: &str) -> String {
    let body = &content[section.body_start..section.end];
    let mut insert_at = section.body_start;
    let mut rule_follows = false;
    for (offset, line) in lines_with_offsets(body) {
        if bare(line).is_empty() {
            continue;
        }
        if bare(line) == "---" {
            insert_at = section.body_start + offset;
            rule_follows = true;
        } else {
            insert_at = section.body_start + offset + line.len();
            rule_follows = false;
        }
    }

    let before = &content[..insert_at];
    let mut out = String::with_capacity(content.len() + block.len() + 4);
    out.push_str(before);
    if !before.ends_with('\n') {
        out.push('\n');
    }
    if !before.ends_with("\n\n") {
        out.push('\n');
    }
    out.push_str(block);
    if rule_follows {
        out.push('\n');
    }
    out.push_str(&content[insert_at..]);
    out
}

/// Insert `block` right below the heading line of a section.
pub fn insert_after_heading(content: &str, section: Section, block: &str) -> String {
    let (before, after) = content.split_at(section.body_start);
    let mut out = String::with_capacity(content.len() + block.len() + 4);
    out.push_str(before);
    if !before.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(block);
    if !after.starts_with('\n') && !after.starts_with("\r\n") {
        out.push('\n');
    }
    out.push_str(after);
    out
}

/// Add an empty `heading` section (closed by a `---` rule) before the
/// `anchor` heading, or at the end of the note when the anchor is missing.
pub fn add_section(content: &str, heading: &str, anchor: Option<&str>) -> String {
    let skeleton = format!("{heading}\n\n---\n\n");
    if let Some(anchor_section) = anchor.and_then(|a| find_section(content, a)) {
        let (before, after) = content.split_at(anchor_section.heading_start);
        return format!("{before}{skeleton}{after}");
    }
    let trimmed = content.trim_end();
    if trimmed.is_empty() {
        return skeleton;
    }
    format!("{trimmed}\n\n{heading}\n\n---\n")
}
