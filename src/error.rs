use thiserror::Error;

/// Rejections raised while building an observer registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObserverError {
    #[error("observer has no change handler")]
    MissingHandler,
    #[error("observer has both a single-flag and a collection handler")]
    ConflictingHandlers,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid snapshot json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} missing, it is required")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("change notifier must be created inside a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Observer(#[from] ObserverError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Notifier(#[from] NotifierError),
}
