use std::path::PathBuf;

use vellum_storage::{OwnerRef, SnapshotId, StorageError};

/// Errors raised while loading or validating versioning configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("kind name must not be blank")]
    BlankKind,

    #[error("kind '{kind}': blank field name in {list}")]
    BlankField { kind: String, list: &'static str },

    #[error("kind '{kind}': field '{field}' is both versionable and excluded")]
    VersionableExcluded { kind: String, field: String },

    #[error("kind '{kind}': snapshot_type must not be blank")]
    BlankSnapshotType { kind: String },
}

/// Errors surfaced by the versioning engine.
#[derive(Debug, thiserror::Error)]
pub enum VersioningError {
    /// The snapshot store failed; the commit transaction was aborted.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A payload could not be encoded or a stored payload could not be decoded.
    #[error("snapshot payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("record kind '{kind}' is not registered for versioning")]
    UnknownKind { kind: String },

    /// `after_persist` was called for a different kind than `before_persist`.
    #[error("captured changes for kind '{captured}' but commit targets {owner}")]
    KindMismatch { captured: String, owner: OwnerRef },

    #[error("version {id} not found for {owner}")]
    VersionNotFound { owner: OwnerRef, id: SnapshotId },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
