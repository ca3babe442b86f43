use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// workspace root as a (kind, arguments...) list; only `file` roots resolve
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceRoot(pub Vec<String>);

impl WorkspaceRoot {
    /// a `file` root at the given path
    pub fn file(path: &Path) -> Self {
        Self(vec!["file".to_string(), path.to_string_lossy().into_owned()])
    }

    /// root kind tag (first element)
    pub fn kind(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

/// one repository in the resolved configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<WorkspaceRoot>,
}

/// resolved repository configuration consumed by the traverser
///
/// maps logical repository names to local workspace roots; produced by an
/// external resolver and read from the `-C` file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub repositories: BTreeMap<String, RepositoryEntry>,
}

impl RepositoryConfig {
    /// load a repository configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        crate::graph::load_json(path)
    }

    /// fill in a `file` root for every repository lacking a workspace root
    pub fn fill_default_workspace(&mut self, workspace: &Path) -> Result<()> {
        let workspace = crate::fs::absolute(workspace)?;
        for entry in self.repositories.values_mut() {
            if entry.workspace_root.is_none() {
                entry.workspace_root = Some(WorkspaceRoot::file(&workspace));
            }
        }
        Ok(())
    }

    /// resolve a LOCAL artifact to a path inside its workspace root
    pub fn local_path(&self, repository: &str, rel_path: &str) -> Result<PathBuf> {
        let entry = self
            .repositories
            .get(repository)
            .ok_or_else(|| Error::UnknownRepository(repository.to_string()))?;
        let root = entry
            .workspace_root
            .as_ref()
            .ok_or_else(|| Error::MissingWorkspaceRoot(repository.to_string()))?;
        match root.0.as_slice() {
            [kind, path] if kind == "file" => Ok(PathBuf::from(path).join(rel_path)),
            _ => Err(Error::UnsupportedRoot {
                repository: repository.to_string(),
                root: format!("{:?}", root.0),
            }),
        }
    }
}
