use crate::error::SyncError;
use crate::granola::paths::{SyncPaths, expand_tilde};
use anyhow::Result;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROVIDER_CHOICES: [&str; 6] = [
    "auto",
    "local",
    "anthropic",
    "openai",
    "gemini",
    "openai-compatible",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub root: String,
    pub transcripts_folder: String,
    pub daily_folder: String,
    pub projects_index: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            transcripts_folder: "Meetings/Transcripts".to_string(),
            daily_folder: "Daily".to_string(),
            projects_index: "projects-index.md".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: "~/Library/Application Support/Granola/cache-v3.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub auto_process_after_hours: u64,
    pub min_transcript_chars: usize,
    pub max_action_items: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            auto_process_after_hours: 48,
            min_transcript_chars: 100,
            max_action_items: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub provider: String,
    pub model: Option<String>,
    pub max_transcript_chars: usize,
    pub timeout_secs: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            model: None,
            max_transcript_chars: 15_000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub vault: VaultConfig,
    pub cache: CacheConfig,
    pub process: ProcessConfig,
    pub enrich: EnrichConfig,
    pub timezone: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            vault: VaultConfig::default(),
            cache: CacheConfig::default(),
            process: ProcessConfig::default(),
            enrich: EnrichConfig::default(),
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSyncConfig {
    vault: Option<VaultConfig>,
    cache: Option<CacheConfig>,
    process: Option<ProcessConfig>,
    enrich: Option<EnrichConfig>,
    timezone: Option<String>,
}

/// Resolved on-disk locations inside the vault.
#[derive(Debug, Clone)]
pub struct VaultLayout {
    pub root: PathBuf,
    pub transcripts_dir: PathBuf,
    pub daily_dir: PathBuf,
    pub projects_index: PathBuf,
}

impl VaultLayout {
    pub fn new(root: impl Into<PathBuf>, transcripts: &str, daily: &str, index: &str) -> Self {
        let root = root.into();
        Self {
            transcripts_dir: root.join(transcripts),
            daily_dir: root.join(daily),
            projects_index: root.join(index),
            root,
        }
    }

    pub fn daily_file(&self, date: chrono::NaiveDate) -> PathBuf {
        self.daily_dir
            .join(format!("{}.md", date.format("%Y-%m-%d")))
    }
}

impl SyncConfig {
    pub fn layout(&self) -> VaultLayout {
        VaultLayout::new(
            expand_tilde(&self.vault.root),
            &self.vault.transcripts_folder,
            &self.vault.daily_folder,
            &self.vault.projects_index,
        )
    }

    pub fn cache_path(&self) -> PathBuf {
        expand_tilde(&self.cache.path)
    }

    pub fn tz(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or(Tz::UTC)
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn is_relative_folder(raw: &str) -> bool {
    let trimmed = raw.trim();
    !trimmed.is_empty() && !Path::new(trimmed).is_absolute() && !trimmed.split(['/', '\\']).any(|p| p == "..")
}

fn validate(cfg: &SyncConfig) -> Result<()> {
    let invalid = |msg: String| -> anyhow::Error { SyncError::InvalidConfig(msg).into() };

    if cfg.vault.root.trim().is_empty() {
        return Err(invalid(
            "vault root is not set: add [vault] root or GRANOLA_SYNC_VAULT".to_string(),
        ));
    }
    for (name, value) in [
        ("transcripts_folder", &cfg.vault.transcripts_folder),
        ("daily_folder", &cfg.vault.daily_folder),
        ("projects_index", &cfg.vault.projects_index),
    ] {
        if !is_relative_folder(value) {
            return Err(invalid(format!(
                "invalid vault {name} `{value}`: must be a non-empty path relative to the vault root"
            )));
        }
    }
    if cfg.cache.path.trim().is_empty() {
        return Err(invalid("cache path cannot be empty".to_string()));
    }
    if cfg.timezone.parse::<Tz>().is_err() {
        return Err(invalid(format!(
            "invalid timezone `{}`: use an IANA name such as `Europe/Berlin`",
            cfg.timezone
        )));
    }
    let provider = cfg.enrich.provider.trim().to_ascii_lowercase();
    if !PROVIDER_CHOICES.contains(&provider.as_str()) {
        return Err(invalid(format!(
            "invalid enrich provider `{}`: use one of {}",
            cfg.enrich.provider,
            PROVIDER_CHOICES.join(", ")
        )));
    }
    if cfg.enrich.timeout_secs == 0 {
        return Err(invalid("invalid enrich timeout: must be >= 1 second".to_string()));
    }
    if cfg.process.max_action_items == 0 {
        return Err(invalid("invalid max action items: must be >= 1".to_string()));
    }
    Ok(())
}

fn merge_file_config(base: &mut SyncConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path).map_err(|err| {
        SyncError::InvalidConfig(format!("failed to read {}: {err}", path.display()))
    })?;
    let parsed: PartialSyncConfig = toml::from_str(&raw).map_err(|err| {
        SyncError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
    })?;
    if let Some(vault) = parsed.vault {
        base.vault = vault;
    }
    if let Some(cache) = parsed.cache {
        base.cache = cache;
    }
    if let Some(process) = parsed.process {
        base.process = process;
    }
    if let Some(enrich) = parsed.enrich {
        base.enrich = enrich;
    }
    if let Some(timezone) = parsed.timezone {
        base.timezone = timezone;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut SyncConfig) {
    cfg.vault.root = env_or_string("GRANOLA_SYNC_VAULT", &cfg.vault.root);
    cfg.vault.transcripts_folder =
        env_or_string("GRANOLA_SYNC_TRANSCRIPTS_FOLDER", &cfg.vault.transcripts_folder);
    cfg.vault.daily_folder = env_or_string("GRANOLA_SYNC_DAILY_FOLDER", &cfg.vault.daily_folder);
    cfg.vault.projects_index =
        env_or_string("GRANOLA_SYNC_PROJECTS_INDEX", &cfg.vault.projects_index);
    cfg.cache.path = env_or_string("GRANOLA_SYNC_CACHE", &cfg.cache.path);
    cfg.process.auto_process_after_hours = env_or_u64(
        "GRANOLA_SYNC_AUTO_HOURS",
        cfg.process.auto_process_after_hours,
    );
    cfg.process.min_transcript_chars = env_or_u64(
        "GRANOLA_SYNC_MIN_TRANSCRIPT_CHARS",
        cfg.process.min_transcript_chars as u64,
    ) as usize;
    cfg.enrich.provider = env_or_string("GRANOLA_SYNC_PROVIDER", &cfg.enrich.provider);
    cfg.enrich.model = env_or_optional_string("GRANOLA_SYNC_MODEL", cfg.enrich.model.take());
    cfg.timezone = env_or_string("GRANOLA_SYNC_TIMEZONE", &cfg.timezone);
}

pub fn load_config(paths: &SyncPaths) -> Result<SyncConfig> {
    let mut cfg = SyncConfig::default();
    merge_file_config(&mut cfg, &paths.config_file)?;
    apply_env_overrides(&mut cfg);
    cfg.enrich.provider = cfg.enrich.provider.trim().to_ascii_lowercase();

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::{SyncConfig, merge_file_config, validate};
    use crate::error::SyncError;
    use std::fs;
    use tempfile::tempdir;

    fn base() -> SyncConfig {
        let mut cfg = SyncConfig::default();
        cfg.vault.root = "/vault".to_string();
        cfg
    }

    #[test]
    fn defaults_match_vault_conventions() {
        let cfg = base();
        let layout = cfg.layout();
        assert!(layout.transcripts_dir.ends_with("Meetings/Transcripts"));
        assert!(layout.daily_dir.ends_with("Daily"));
        assert_eq!(cfg.process.auto_process_after_hours, 48);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn missing_vault_root_is_invalid_config() {
        let cfg = SyncConfig::default();
        let err = validate(&cfg).expect_err("root required");
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_escaping_folders_and_bad_timezone() {
        let mut cfg = base();
        cfg.vault.daily_folder = "../outside".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = base();
        cfg.timezone = "Mars/Olympus".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = base();
        cfg.enrich.provider = "mystery".to_string();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn partial_file_only_overrides_present_sections() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            "timezone = \"Europe/Berlin\"\n\n[vault]\nroot = \"/notes\"\ndaily_folder = \"Journal\"\n",
        )
        .expect("write config");

        let mut cfg = SyncConfig::default();
        merge_file_config(&mut cfg, &path).expect("merge");
        assert_eq!(cfg.vault.root, "/notes");
        assert_eq!(cfg.vault.daily_folder, "Journal");
        assert_eq!(cfg.vault.transcripts_folder, "Meetings/Transcripts");
        assert_eq!(cfg.process.min_transcript_chars, 100);
        assert_eq!(cfg.timezone, "Europe/Berlin");
        assert_eq!(cfg.tz(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn unparsable_file_is_invalid_config() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[vault\nroot = ").expect("write config");
        let mut cfg = SyncConfig::default();
        let err = merge_file_config(&mut cfg, &path).expect_err("parse failure");
        assert!(err.to_string().contains("config file invalid"));
    }
}
