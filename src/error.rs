use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitStatus;

/// error type for traverser and deduplicator operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    #[error("repository {0} has no workspace root")]
    MissingWorkspaceRoot(String),

    #[error("unsupported repository root {root} for {repository}")]
    UnsupportedRoot { repository: String, root: String },

    #[error("tree not found in graph: {0}")]
    UnknownTree(String),

    #[error("action not found in graph: {0}")]
    UnknownAction(String),

    #[error("blob not found in store: {0}")]
    UnknownBlob(String),

    #[error("action {0} has an empty command")]
    EmptyCommand(String),

    #[error("command {command:?} with env {env:?} for action {id} failed: {status}")]
    ActionFailed {
        id: String,
        command: Vec<String>,
        env: Option<BTreeMap<String, String>>,
        status: ExitStatus,
    },

    #[error("staging destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("did not find mandatory root {0}")]
    MissingRoot(String),

    #[error("cycle in root references at {0}")]
    RootCycle(String),

    #[error("invalid root found for {name}: {root}")]
    InvalidRoot { name: String, root: String },

    #[error("worker task panicked: {0}")]
    TaskPanicked(String),

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
