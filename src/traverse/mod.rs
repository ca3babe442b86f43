//! realization of action graphs onto the filesystem
//!
//! the traverser realizes every requested target exactly once: blobs are
//! pre-stored content-addressed, trees are composed from realized entries
//! and published atomically, actions run as subprocesses with their inputs
//! staged into the working directory. two variants share this contract: a
//! recursive single-threaded one and a task-system one with parked
//! continuations for shared artifacts.

mod parallel;
mod sequential;
mod waitlist;

pub use waitlist::{Continuation, WaitState, Waitlist};

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::config::RepositoryConfig;
use crate::error::{Error, IoResultExt, Result};
use crate::graph::{ActionDescription, Graph, Targets};
use crate::store::BuildRoot;

/// traversal options
#[derive(Clone, Debug, Default)]
pub struct TraverseOptions {
    /// worker threads for the parallel variant (default: hardware threads)
    pub jobs: Option<usize>,
    /// use the single-threaded recursive variant
    pub sequential: bool,
}

/// realize `targets` into `out`, staging intermediates under `root`
///
/// every `(location, descriptor)` pair in `targets` ends up linked at
/// `out/location`; pre-existing destinations are errors.
pub fn traverse(
    graph: Graph,
    targets: Targets,
    config: RepositoryConfig,
    out: &Path,
    root: &Path,
    options: &TraverseOptions,
) -> Result<()> {
    let out = crate::fs::absolute(out)?;
    fs::create_dir_all(&out).with_path(&out)?;
    let store = BuildRoot::create(root)?;

    if options.sequential {
        sequential::run(&graph, &targets, &config, &store, &out)
    } else {
        let jobs = options.jobs.unwrap_or_else(num_cpus::get);
        parallel::run(graph, targets, config, store, out, jobs)
    }
}

/// create declared output directories and spawn the action command
///
/// the subprocess runs with `action_dir` as its working directory and
/// inherited standard I/O. a declared `env` replaces the environment
/// wholesale; otherwise the traverser's environment is inherited.
pub(crate) fn run_command(id: &str, desc: &ActionDescription, action_dir: &Path) -> Result<()> {
    for output in &desc.output {
        if let Some(parent) = Path::new(output).parent() {
            if !parent.as_os_str().is_empty() {
                let dir = action_dir.join(parent);
                fs::create_dir_all(&dir).with_path(dir)?;
            }
        }
    }

    let program = desc
        .command
        .first()
        .ok_or_else(|| Error::EmptyCommand(id.to_string()))?;
    tracing::info!(action = id, command = ?desc.command, env = ?desc.env, "running action");

    let mut command = Command::new(program);
    command.args(&desc.command[1..]).current_dir(action_dir);
    if let Some(env) = &desc.env {
        command.env_clear();
        command.envs(env);
    }
    let status = command.status().with_path(action_dir)?;
    if !status.success() {
        return Err(Error::ActionFailed {
            id: id.to_string(),
            command: desc.command.clone(),
            env: desc.env.clone(),
            status,
        });
    }
    Ok(())
}
