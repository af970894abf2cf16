use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SyncPaths {
    pub home: PathBuf,
    pub config_file: PathBuf,
    pub logs_dir: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => expand_tilde(v.trim()),
        _ => fallback,
    }
}

/// Expand a leading `~` against the user's home directory.
pub fn expand_tilde(raw: &str) -> PathBuf {
    let Some(rest) = raw.strip_prefix('~') else {
        return PathBuf::from(raw);
    };
    let Some(home) = dirs::home_dir() else {
        return PathBuf::from(raw);
    };
    let rest = rest.trim_start_matches(['/', '\\']);
    if rest.is_empty() {
        home
    } else {
        home.join(rest)
    }
}

pub fn resolve_paths() -> Result<SyncPaths> {
    let home_dir = required_home_dir()?;
    let home = env_or_default_path("GRANOLA_SYNC_HOME", home_dir.join(".config/granola-sync"));
    let config_file = env_or_default_path("GRANOLA_SYNC_CONFIG", home.join("config.toml"));
    let logs_dir = env_or_default_path("GRANOLA_SYNC_LOGS_DIR", home.join("logs"));

    Ok(SyncPaths {
        home,
        config_file,
        logs_dir,
    })
}

/// Vault-relative display form of `path`, falling back to the full path.
pub fn vault_relative(vault_root: &Path, path: &Path) -> String {
    path.strip_prefix(vault_root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
