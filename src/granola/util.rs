use anyhow::{Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Truncate `input` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    if max_chars <= 3 {
        return "...".chars().take(max_chars).collect();
    }
    let mut out: String = input.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

const FILENAME_FORBIDDEN: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_FILENAME_CHARS: usize = 100;

/// Strip characters that are unsafe in file names and cap the length.
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|ch| !FILENAME_FORBIDDEN.contains(ch) && !ch.is_control())
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.chars().count() <= MAX_FILENAME_CHARS {
        return trimmed.to_string();
    }
    trimmed
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

fn staged_temp_file(path: &Path, contents: &str) -> Result<NamedTempFile> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    // The temp file is removed on drop unless persisted.
    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to stage temp file in {}", parent.display()))?;
    staged
        .write_all(contents.as_bytes())
        .with_context(|| format!("failed to stage contents for {}", path.display()))?;
    staged
        .as_file()
        .sync_all()
        .with_context(|| format!("failed to flush staged contents for {}", path.display()))?;
    Ok(staged)
}

/// Replace `path` with `contents` through a temp file in the same directory.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let staged = staged_temp_file(path, contents)?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Create `path` with `contents`; returns `Ok(false)` when the file already exists.
pub fn write_new_atomic(path: &Path, contents: &str) -> Result<bool> {
    let staged = staged_temp_file(path, contents)?;
    match staged.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(err) => {
            Err(err.error).with_context(|| format!("failed to create {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_filename, truncate_with_ellipsis, write_atomic, write_new_atomic};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn truncate_keeps_short_input() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("abcdefghij", 6), "abc...");
    }

    #[test]
    fn sanitize_filename_strips_unsafe_chars_and_caps_length() {
        assert_eq!(sanitize_filename(" Q1: plan/review? "), "Q1 planreview");
        assert_eq!(sanitize_filename("a<b>c|d*e\"f\\g"), "abcdefg");
        assert_eq!(sanitize_filename(&"x".repeat(150)).chars().count(), 100);
    }

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp_files() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("nested/file.md");
        write_atomic(&path, "one").expect("first write");
        write_atomic(&path, "two").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "two");

        let entries = fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn write_new_atomic_never_clobbers() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("note.md");
        assert!(write_new_atomic(&path, "original").expect("create"));
        assert!(!write_new_atomic(&path, "replacement").expect("second create"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "original");
        assert_eq!(fs::read_dir(tmp.path()).expect("read dir").count(), 1);
    }
}
