use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("granola cache unavailable at {}: {reason}", path.display())]
    CacheUnavailable { path: PathBuf, reason: String },
    #[error("vault unavailable: {} does not exist", .0.display())]
    VaultUnavailable(PathBuf),
    #[error("malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },
    #[error("artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),
    #[error("enrichment failed: {0}")]
    EnrichmentFailure(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CacheUnavailable { .. } => "E_CACHE_UNAVAILABLE",
            Self::VaultUnavailable(_) => "E_VAULT_UNAVAILABLE",
            Self::MalformedRecord { .. } => "E_MALFORMED_RECORD",
            Self::ArtifactNotFound(_) => "E_ARTIFACT_NOT_FOUND",
            Self::EnrichmentFailure(_) => "E_ENRICHMENT_FAILURE",
            Self::InvalidConfig(_) => "E_INVALID_CONFIG",
        }
    }

    /// Only store-level unavailability aborts a run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CacheUnavailable { .. } | Self::VaultUnavailable(_) | Self::InvalidConfig(_)
        )
    }
}
