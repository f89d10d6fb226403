use thiserror::Error;

/// Failures the migration treats as distinct outcomes. Everything else is
/// carried as plain `anyhow` context.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("DokuWiki login failed for user `{user}`")]
    Authentication { user: String },
    #[error("unresolved page link `{target}` (normalized `{key}`)")]
    UnresolvedLink { target: String, key: String },
    #[error("unresolved media reference `{target}` (normalized `{key}`)")]
    UnresolvedMedia { target: String, key: String },
    #[error("{operation} failed: {detail}")]
    Remote { operation: String, detail: String },
    #[error("unknown file extension `{extension}` for media `{file}`")]
    UnknownMediaType { file: String, extension: String },
    #[error("id map already maps `{key}` to `{existing}`, refusing `{incoming}`")]
    DuplicateId {
        key: String,
        existing: String,
        incoming: String,
    },
}

impl MigrateError {
    pub fn remote(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}
