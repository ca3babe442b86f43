//! task-system realization with parked continuations
//!
//! every realization step is a task; a step that depends on a tree or
//! action someone else is building parks a continuation in the waitlist
//! and releases its worker. the builder re-submits parked continuations
//! with the canonical path once it publishes.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::config::RepositoryConfig;
use crate::error::{IoResultExt, Result};
use crate::fs::{link, publish_dir};
use crate::graph::{ActionDescription, Artifact, Graph, Targets};
use crate::store::BuildRoot;
use crate::tasks::TaskSystem;
use crate::traverse::waitlist::{Continuation, WaitState, Waitlist};

pub(crate) fn run(
    graph: Graph,
    targets: Targets,
    config: RepositoryConfig,
    store: BuildRoot,
    out: PathBuf,
    jobs: usize,
) -> Result<()> {
    let tasks = Arc::new(TaskSystem::new(jobs));
    let state = Arc::new(Parallel {
        graph,
        config,
        store,
        waitlist: Waitlist::new(),
        tasks: Arc::clone(&tasks),
    });

    // pre-store every literal blob; duplicates collapse onto one write
    let blobs: BTreeSet<String> = state.graph.blobs.iter().cloned().collect();
    for blob in blobs {
        let state = Arc::clone(&state);
        tasks.add(move || state.store.add_blob(blob.as_bytes()).map(|_| ()));
    }
    tasks.finish()?;

    for (location, artifact) in targets {
        let dest = out.join(&location);
        let state = Arc::clone(&state);
        tasks.add(move || state.build(artifact, Box::new(move |path| link(&path, &dest))));
    }
    let result = tasks.finish();
    tasks.shutdown();
    result
}

struct Parallel {
    graph: Graph,
    config: RepositoryConfig,
    store: BuildRoot,
    waitlist: Waitlist,
    tasks: Arc<TaskSystem>,
}

impl Parallel {
    fn build(self: &Arc<Self>, desc: Artifact, done: Continuation) -> Result<()> {
        match desc {
            Artifact::Known { id } => done(self.store.stored_blob(&id)?),
            Artifact::Local { repository, path } => {
                done(self.config.local_path(&repository, &path)?)
            }
            Artifact::Tree { id } => self.build_tree(id, done),
            Artifact::Action { id, path } => {
                self.run_action(id, Box::new(move |action_dir| done(action_dir.join(&path))))
            }
        }
    }

    fn build_tree(self: &Arc<Self>, id: String, done: Continuation) -> Result<()> {
        let key = format!("TREE/{id}");
        let tree_dir = self.store.tree_path(&id);
        match self.waitlist.add(&key, done) {
            WaitState::Created => {}
            WaitState::Inserted => return Ok(()),
            WaitState::Cleared(done) => return done(tree_dir),
        }
        // a canonical directory from an earlier invocation counts as built
        if tree_dir.is_dir() {
            self.notify_ready(&key, &tree_dir);
            return Ok(());
        }
        let entries = self.graph.tree(&id)?.clone();
        let pending = Arc::new(PendingTree {
            state: Arc::clone(self),
            key,
            tmp: self.store.tree_tmp_path(&id),
            dir: tree_dir,
            remaining: AtomicI64::new(entries.len() as i64),
        });
        if entries.is_empty() {
            return pending.entry_linked();
        }
        for (location, desc) in entries {
            let dest = pending.tmp.join(&location);
            let pending = Arc::clone(&pending);
            let state = Arc::clone(self);
            self.tasks.add(move || {
                state.build(
                    desc,
                    Box::new(move |path| {
                        link(&path, &dest)?;
                        pending.entry_linked()
                    }),
                )
            });
        }
        Ok(())
    }

    fn run_action(self: &Arc<Self>, id: String, done: Continuation) -> Result<()> {
        let key = format!("ACTION/{id}");
        let action_dir = self.store.action_path(&id);
        match self.waitlist.add(&key, done) {
            WaitState::Created => {}
            WaitState::Inserted => return Ok(()),
            WaitState::Cleared(done) => return done(action_dir),
        }
        // a canonical directory from an earlier invocation counts as executed
        if action_dir.is_dir() {
            self.notify_ready(&key, &action_dir);
            return Ok(());
        }
        fs::create_dir_all(&action_dir).with_path(&action_dir)?;
        let desc = self.graph.action(&id)?.clone();
        let inputs = desc.input.clone();
        let pending = Arc::new(PendingAction {
            state: Arc::clone(self),
            id,
            key,
            dir: action_dir,
            desc,
            remaining: AtomicI64::new(inputs.len() as i64),
        });
        if inputs.is_empty() {
            return pending.input_linked();
        }
        for (location, input) in inputs {
            let dest = pending.dir.join(&location);
            let pending = Arc::clone(&pending);
            let state = Arc::clone(self);
            self.tasks.add(move || {
                state.build(
                    input,
                    Box::new(move |path| {
                        link(&path, &dest)?;
                        pending.input_linked()
                    }),
                )
            });
        }
        Ok(())
    }

    /// clear parked continuations for `key`, re-submitting each with `path`
    fn notify_ready(self: &Arc<Self>, key: &str, path: &Path) {
        for done in self.waitlist.fetch_clear(key) {
            let path = path.to_path_buf();
            self.tasks.add(move || done(path));
        }
    }
}

/// completion record for a tree under composition
struct PendingTree {
    state: Arc<Parallel>,
    key: String,
    tmp: PathBuf,
    dir: PathBuf,
    remaining: AtomicI64,
}

impl PendingTree {
    /// one entry got linked; the last one publishes and wakes waiters
    fn entry_linked(&self) -> Result<()> {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) <= 1 {
            publish_dir(&self.tmp, &self.dir)?;
            self.state.notify_ready(&self.key, &self.dir);
        }
        Ok(())
    }
}

/// completion record for an action whose inputs are still being staged
struct PendingAction {
    state: Arc<Parallel>,
    id: String,
    key: String,
    dir: PathBuf,
    desc: ActionDescription,
    remaining: AtomicI64,
}

impl PendingAction {
    /// one input got linked; the last one runs the command and wakes waiters
    fn input_linked(&self) -> Result<()> {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) <= 1 {
            super::run_command(&self.id, &self.desc, &self.dir)?;
            self.state.notify_ready(&self.key, &self.dir);
        }
        Ok(())
    }
}
