//! single-threaded recursive realization

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RepositoryConfig;
use crate::error::{IoResultExt, Result};
use crate::fs::{link, publish_dir};
use crate::graph::{Artifact, Graph, Targets};
use crate::store::BuildRoot;

pub(crate) fn run(
    graph: &Graph,
    targets: &Targets,
    config: &RepositoryConfig,
    store: &BuildRoot,
    out: &Path,
) -> Result<()> {
    for blob in &graph.blobs {
        store.add_blob(blob.as_bytes())?;
    }
    let mut traverser = Sequential {
        graph,
        config,
        store,
        built: HashMap::new(),
    };
    for (location, artifact) in targets {
        let path = traverser.build(artifact)?;
        link(&path, &out.join(location))?;
    }
    Ok(())
}

struct Sequential<'a> {
    graph: &'a Graph,
    config: &'a RepositoryConfig,
    store: &'a BuildRoot,
    /// once-only map: canonical paths already realized this invocation
    built: HashMap<String, PathBuf>,
}

impl Sequential<'_> {
    fn build(&mut self, desc: &Artifact) -> Result<PathBuf> {
        match desc {
            Artifact::Known { id } => self.store.stored_blob(id),
            Artifact::Local { repository, path } => self.config.local_path(repository, path),
            Artifact::Tree { id } => self.build_tree(id),
            Artifact::Action { id, path } => Ok(self.run_action(id)?.join(path)),
        }
    }

    fn build_tree(&mut self, id: &str) -> Result<PathBuf> {
        let key = format!("TREE/{id}");
        if let Some(done) = self.built.get(&key) {
            return Ok(done.clone());
        }
        let tree_dir = self.store.tree_path(id);
        if !tree_dir.is_dir() {
            let entries = self.graph.tree(id)?.clone();
            let tmp = self.store.tree_tmp_path(id);
            for (location, desc) in &entries {
                let path = self.build(desc)?;
                link(&path, &tmp.join(location))?;
            }
            publish_dir(&tmp, &tree_dir)?;
        }
        self.built.insert(key, tree_dir.clone());
        Ok(tree_dir)
    }

    fn run_action(&mut self, id: &str) -> Result<PathBuf> {
        let key = format!("ACTION/{id}");
        if let Some(done) = self.built.get(&key) {
            return Ok(done.clone());
        }
        let action_dir = self.store.action_path(id);
        if !action_dir.is_dir() {
            let desc = self.graph.action(id)?.clone();
            fs::create_dir_all(&action_dir).with_path(&action_dir)?;
            for (location, input) in &desc.input {
                let path = self.build(input)?;
                link(&path, &action_dir.join(location))?;
            }
            super::run_command(id, &desc, &action_dir)?;
        }
        self.built.insert(key, action_dir.clone());
        Ok(action_dir)
    }
}
