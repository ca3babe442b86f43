use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};

/// artifact descriptor - one reference into the action graph
///
/// wire form is `{"type": "KNOWN"|"LOCAL"|"TREE"|"ACTION", "data": {...}}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Artifact {
    /// literal blob, pre-stored under its content hash
    #[serde(rename = "KNOWN")]
    Known { id: String },

    /// file inside a repository workspace root
    #[serde(rename = "LOCAL")]
    Local { repository: String, path: String },

    /// directory composed from other artifacts
    #[serde(rename = "TREE")]
    Tree { id: String },

    /// one named output of an action invocation
    #[serde(rename = "ACTION")]
    Action { id: String, path: String },
}

/// tree descriptor - stage-relative location to artifact
pub type TreeDescription = BTreeMap<String, Artifact>;

/// action descriptor - input wiring, expected outputs and the command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescription {
    /// inputs staged into the working directory before execution
    #[serde(default)]
    pub input: BTreeMap<String, Artifact>,

    /// stage-relative paths the command is expected to produce
    pub output: Vec<String>,

    /// argument vector to execute
    pub command: Vec<String>,

    /// full replacement environment; the subprocess inherits when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

/// action graph: literal blobs, tree descriptors and action descriptors
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub blobs: Vec<String>,

    #[serde(default)]
    pub trees: BTreeMap<String, TreeDescription>,

    #[serde(default)]
    pub actions: BTreeMap<String, ActionDescription>,
}

impl Graph {
    /// load a graph description from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    /// look up a tree descriptor
    pub fn tree(&self, id: &str) -> Result<&TreeDescription> {
        self.trees
            .get(id)
            .ok_or_else(|| Error::UnknownTree(id.to_string()))
    }

    /// look up an action descriptor
    pub fn action(&self, id: &str) -> Result<&ActionDescription> {
        self.actions
            .get(id)
            .ok_or_else(|| Error::UnknownAction(id.to_string()))
    }
}

/// targets - output-relative location to artifact
pub type Targets = BTreeMap<String, Artifact>;

/// load a targets description from a JSON file
pub fn load_targets(path: &Path) -> Result<Targets> {
    load_json(path)
}

pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_path(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_wire_forms() {
        let known: Artifact =
            serde_json::from_str(r#"{"type": "KNOWN", "data": {"id": "abc"}}"#).unwrap();
        assert_eq!(known, Artifact::Known { id: "abc".into() });

        let local: Artifact =
            serde_json::from_str(r#"{"type": "LOCAL", "data": {"repository": "r", "path": "p"}}"#)
                .unwrap();
        assert_eq!(
            local,
            Artifact::Local {
                repository: "r".into(),
                path: "p".into()
            }
        );

        let tree: Artifact =
            serde_json::from_str(r#"{"type": "TREE", "data": {"id": "t"}}"#).unwrap();
        assert_eq!(tree, Artifact::Tree { id: "t".into() });

        let action: Artifact =
            serde_json::from_str(r#"{"type": "ACTION", "data": {"id": "a", "path": "out"}}"#)
                .unwrap();
        assert_eq!(
            action,
            Artifact::Action {
                id: "a".into(),
                path: "out".into()
            }
        );
    }

    #[test]
    fn test_artifact_unknown_kind() {
        let result: std::result::Result<Artifact, _> =
            serde_json::from_str(r#"{"type": "MYSTERY", "data": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_artifact_roundtrip() {
        let artifact = Artifact::Action {
            id: "a1".into(),
            path: "out/file".into(),
        };
        let json = serde_json::to_string(&artifact).unwrap();
        assert!(json.contains(r#""type":"ACTION""#));
        let parsed: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(artifact, parsed);
    }

    #[test]
    fn test_action_description_defaults() {
        // input and env may be omitted on the wire
        let desc: ActionDescription =
            serde_json::from_str(r#"{"output": ["out"], "command": ["true"]}"#).unwrap();
        assert!(desc.input.is_empty());
        assert!(desc.env.is_none());
    }

    #[test]
    fn test_graph_parse() {
        let graph: Graph = serde_json::from_str(
            r#"{
                "blobs": ["hello"],
                "trees": {"t": {"x": {"type": "KNOWN", "data": {"id": "abc"}}}},
                "actions": {"a": {
                    "input": {"in": {"type": "KNOWN", "data": {"id": "abc"}}},
                    "output": ["out"],
                    "command": ["cp", "in", "out"],
                    "env": {"KEY": "value"}
                }}
            }"#,
        )
        .unwrap();
        assert_eq!(graph.blobs, vec!["hello"]);
        assert_eq!(graph.tree("t").unwrap().len(), 1);
        let action = graph.action("a").unwrap();
        assert_eq!(action.command, vec!["cp", "in", "out"]);
        assert_eq!(action.env.as_ref().unwrap()["KEY"], "value");
    }

    #[test]
    fn test_graph_missing_ids() {
        let graph = Graph::default();
        assert!(matches!(graph.tree("nope"), Err(Error::UnknownTree(_))));
        assert!(matches!(graph.action("nope"), Err(Error::UnknownAction(_))));
    }
}
