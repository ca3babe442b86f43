//! end-to-end realization scenarios, run against both traverser variants

use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::tempdir;
use walkdir::WalkDir;

use bootgraph::traverse::{traverse, TraverseOptions};
use bootgraph::{Error, Graph, RepositoryConfig, Targets};

const HELLO_ID: &str = "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0";

fn run(
    sequential: bool,
    graph: serde_json::Value,
    targets: serde_json::Value,
    config: serde_json::Value,
    out: &Path,
    root: &Path,
) -> bootgraph::Result<()> {
    let graph: Graph = serde_json::from_value(graph).unwrap();
    let targets: Targets = serde_json::from_value(targets).unwrap();
    let config: RepositoryConfig = serde_json::from_value(config).unwrap();
    let options = TraverseOptions {
        jobs: Some(4),
        sequential,
    };
    traverse(graph, targets, config, out, root, &options)
}

fn variants() -> [bool; 2] {
    [true, false]
}

fn known(id: &str) -> serde_json::Value {
    json!({"type": "KNOWN", "data": {"id": id}})
}

fn tree(id: &str) -> serde_json::Value {
    json!({"type": "TREE", "data": {"id": id}})
}

fn action(id: &str, path: &str) -> serde_json::Value {
    json!({"type": "ACTION", "data": {"id": id, "path": path}})
}

#[test]
fn test_blobs_are_stored_at_startup() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        run(
            sequential,
            json!({"blobs": ["hello", "world"]}),
            json!({}),
            json!({}),
            &out,
            &root,
        )
        .unwrap();

        let stored = root.join("KNOWN").join(HELLO_ID);
        assert_eq!(fs::read_to_string(&stored).unwrap(), "hello");
        assert_eq!(fs::read_dir(root.join("KNOWN")).unwrap().count(), 2);
    }
}

#[test]
fn test_empty_tree() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        run(
            sequential,
            json!({"trees": {"T": {}}}),
            json!({"x": tree("T")}),
            json!({}),
            &out,
            &root,
        )
        .unwrap();

        let canonical = root.join("TREE/T");
        assert!(canonical.is_dir());
        assert_eq!(fs::read_dir(&canonical).unwrap().count(), 0);

        let staged = out.join("x");
        assert!(staged.is_dir());
        assert_eq!(fs::read_dir(&staged).unwrap().count(), 0);
    }
}

#[test]
fn test_single_blob_target() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        run(
            sequential,
            json!({"blobs": ["hello"]}),
            json!({"greet": known(HELLO_ID)}),
            json!({}),
            &out,
            &root,
        )
        .unwrap();

        assert_eq!(fs::read_to_string(out.join("greet")).unwrap(), "hello");
    }
}

#[test]
fn test_identity_action_runs_once() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        let graph = json!({
            "blobs": ["hello"],
            "actions": {
                "a": {
                    "input": {"in": known(HELLO_ID)},
                    "output": ["out"],
                    "command": ["sh", "-c", "echo ran >> marker && cp in out"]
                }
            }
        });
        // two targets demand the same action output
        let targets = json!({
            "result": action("a", "out"),
            "copy": action("a", "out")
        });

        run(sequential, graph, targets, json!({}), &out, &root).unwrap();

        assert_eq!(
            fs::read_to_string(root.join("ACTION/a/out")).unwrap(),
            "hello"
        );
        assert_eq!(fs::read_to_string(out.join("result")).unwrap(), "hello");
        assert_eq!(fs::read_to_string(out.join("copy")).unwrap(), "hello");
        // the command was spawned exactly once
        assert_eq!(
            fs::read_to_string(root.join("ACTION/a/marker")).unwrap(),
            "ran\n"
        );
    }
}

#[test]
fn test_shared_subtree_built_once() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        let graph = json!({
            "blobs": ["hello"],
            "trees": {
                "T0": {"f": known(HELLO_ID)},
                "T1": {"sub": tree("T0")},
                "T2": {"sub": tree("T0")}
            }
        });
        let targets = json!({"x": tree("T1"), "y": tree("T2")});

        run(sequential, graph, targets, json!({}), &out, &root).unwrap();

        assert!(root.join("TREE/T0").is_dir());
        assert_eq!(
            fs::read_to_string(out.join("x/sub/f")).unwrap(),
            "hello"
        );
        assert_eq!(
            fs::read_to_string(out.join("y/sub/f")).unwrap(),
            "hello"
        );
        // no composition leftovers
        let leftovers: Vec<_> = fs::read_dir(root.join("TREE"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

#[test]
fn test_nested_tree_layout() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        let graph = json!({
            "blobs": ["hello"],
            "trees": {
                "inner": {"leaf": known(HELLO_ID)},
                "top": {
                    "docs/readme": known(HELLO_ID),
                    "lib": tree("inner")
                }
            }
        });

        run(
            sequential,
            graph,
            json!({"staged": tree("top")}),
            json!({}),
            &out,
            &root,
        )
        .unwrap();

        let mut layout: Vec<String> = WalkDir::new(out.join("staged"))
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                entry
                    .path()
                    .strip_prefix(out.join("staged"))
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        layout.sort();
        assert_eq!(layout, vec!["docs/readme", "lib/leaf"]);
    }
}

#[test]
fn test_local_artifact() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));
        let workspace = dir.path().join("ws");
        fs::create_dir_all(workspace.join("src")).unwrap();
        fs::write(workspace.join("src/data.txt"), "local bytes").unwrap();

        let config = json!({
            "repositories": {
                "ws": {"workspace_root": ["file", workspace.to_str().unwrap()]}
            }
        });
        let targets = json!({
            "fetched": {"type": "LOCAL", "data": {"repository": "ws", "path": "src/data.txt"}}
        });

        run(sequential, json!({}), targets, config, &out, &root).unwrap();

        assert_eq!(
            fs::read_to_string(out.join("fetched")).unwrap(),
            "local bytes"
        );
    }
}

#[test]
fn test_unsupported_repository_root() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        let config = json!({
            "repositories": {"ws": {"workspace_root": ["git tree", "deadbeef"]}}
        });
        let targets = json!({
            "x": {"type": "LOCAL", "data": {"repository": "ws", "path": "f"}}
        });

        let result = run(sequential, json!({}), targets, config, &out, &root);
        assert!(matches!(result, Err(Error::UnsupportedRoot { .. })));
    }
}

#[test]
fn test_action_failure_is_fatal() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        let graph = json!({
            "actions": {
                "bad": {
                    "input": {},
                    "output": ["out"],
                    "command": ["sh", "-c", "exit 7"]
                }
            }
        });

        let result = run(
            sequential,
            graph,
            json!({"x": action("bad", "out")}),
            json!({}),
            &out,
            &root,
        );
        assert!(matches!(result, Err(Error::ActionFailed { .. })));
    }
}

#[test]
fn test_dangling_tree_reference() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        let result = run(
            sequential,
            json!({}),
            json!({"x": tree("missing")}),
            json!({}),
            &out,
            &root,
        );
        assert!(matches!(result, Err(Error::UnknownTree(_))));
    }
}

#[test]
fn test_dangling_blob_reference() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        let result = run(
            sequential,
            json!({}),
            json!({"x": known("0000000000000000000000000000000000000000")}),
            json!({}),
            &out,
            &root,
        );
        assert!(matches!(result, Err(Error::UnknownBlob(_))));
    }
}

#[test]
fn test_existing_destination_collision() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("greet"), "already here").unwrap();

        let result = run(
            sequential,
            json!({"blobs": ["hello"]}),
            json!({"greet": known(HELLO_ID)}),
            json!({}),
            &out,
            &root,
        );

        assert!(matches!(result, Err(Error::DestinationExists(_))));
        // never overwritten
        assert_eq!(
            fs::read_to_string(out.join("greet")).unwrap(),
            "already here"
        );
    }
}

#[test]
fn test_existing_canonical_dirs_are_reused() {
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");

        let graph = json!({
            "blobs": ["hello"],
            "trees": {"T": {"f": known(HELLO_ID)}},
            "actions": {
                "a": {
                    "input": {"in": known(HELLO_ID)},
                    "output": ["out"],
                    "command": ["sh", "-c", "echo ran >> marker && cp in out"]
                }
            }
        });
        let targets = json!({"t": tree("T"), "r": action("a", "out")});

        let out1 = dir.path().join("out1");
        run(sequential, graph.clone(), targets.clone(), json!({}), &out1, &root).unwrap();
        let out2 = dir.path().join("out2");
        run(sequential, graph, targets, json!({}), &out2, &root).unwrap();

        // the action did not run again on the second invocation
        assert_eq!(
            fs::read_to_string(root.join("ACTION/a/marker")).unwrap(),
            "ran\n"
        );
        assert_eq!(fs::read_to_string(out2.join("r")).unwrap(), "hello");
        assert_eq!(fs::read_to_string(out2.join("t/f")).unwrap(), "hello");
    }
}

#[test]
fn test_wide_fanout() {
    // many independent entries sharing one deep dependency chain
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        let mut entries = serde_json::Map::new();
        for i in 0..64 {
            entries.insert(format!("f{i}"), known(HELLO_ID));
        }
        entries.insert("shared".to_string(), tree("inner"));
        let graph = json!({
            "blobs": ["hello"],
            "trees": {
                "inner": {"leaf": known(HELLO_ID)},
                "wide": entries
            }
        });

        run(
            sequential,
            graph,
            json!({"w": tree("wide")}),
            json!({}),
            &out,
            &root,
        )
        .unwrap();

        assert_eq!(fs::read_dir(root.join("TREE/wide")).unwrap().count(), 65);
        assert_eq!(
            fs::read_to_string(out.join("w/shared/leaf")).unwrap(),
            "hello"
        );
        assert_eq!(fs::read_to_string(out.join("w/f63")).unwrap(), "hello");
    }
}

#[test]
fn test_action_chain() {
    // the output of one action feeds the input of another
    for sequential in variants() {
        let dir = tempdir().unwrap();
        let (out, root) = (dir.path().join("out"), dir.path().join("root"));

        let graph = json!({
            "blobs": ["hello"],
            "actions": {
                "first": {
                    "input": {"in": known(HELLO_ID)},
                    "output": ["mid"],
                    "command": ["sh", "-c", "tr a-z A-Z < in > mid"]
                },
                "second": {
                    "input": {"in": action("first", "mid")},
                    "output": ["final"],
                    "command": ["sh", "-c", "cat in in > final"]
                }
            }
        });

        run(
            sequential,
            graph,
            json!({"x": action("second", "final")}),
            json!({}),
            &out,
            &root,
        )
        .unwrap();

        assert_eq!(fs::read_to_string(out.join("x")).unwrap(), "HELLOHELLO");
    }
}
