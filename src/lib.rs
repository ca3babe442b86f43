//! bootgraph - bootstrap build-graph traverser
//!
//! materializes a previously analyzed action graph into concrete filesystem
//! artifacts: literal blobs are stored content-addressed under their git
//! blob hash, directory trees are composed from other artifacts, and
//! actions are executed as subprocesses with their inputs staged into a
//! working directory. every tree and action is realized at most once per
//! invocation, also under concurrent demand.
//!
//! # Core concepts
//!
//! - **Artifact**: a KNOWN blob, a LOCAL file in a workspace root, a TREE
//!   directory, or one named output of an ACTION
//! - **Realization**: the on-disk object produced for a descriptor, staged
//!   under the intermediate build root and linked into the output directory
//! - **Deduplication**: bisimilar repositories of a configuration are
//!   merged onto one representative (see [`dedup`])
//!
//! # Example usage
//!
//! ```no_run
//! use std::path::Path;
//! use bootgraph::traverse::{traverse, TraverseOptions};
//! use bootgraph::{Graph, RepositoryConfig, Targets};
//!
//! let graph = Graph::load(Path::new("graph.json")).unwrap();
//! let targets = bootgraph::load_targets(Path::new("targets.json")).unwrap();
//! let config = RepositoryConfig::load(Path::new("repo-conf.json")).unwrap();
//!
//! traverse(
//!     graph,
//!     targets,
//!     config,
//!     Path::new("out-boot"),
//!     Path::new(".just-boot"),
//!     &TraverseOptions::default(),
//! )
//! .unwrap();
//! ```

mod config;
mod error;
mod graph;
mod hash;
mod store;

pub mod dedup;
pub mod fs;
pub mod tasks;
pub mod traverse;

pub use config::{RepositoryConfig, RepositoryEntry, WorkspaceRoot};
pub use error::{Error, IoResultExt, Result};
pub use graph::{load_targets, ActionDescription, Artifact, Graph, Targets, TreeDescription};
pub use hash::{git_blob_hash, git_object_hash, Hash};
pub use store::BuildRoot;
