//! bootgraph CLI - realize an analyzed action graph into filesystem artifacts

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use bootgraph::traverse::{traverse, TraverseOptions};
use bootgraph::{load_targets, Graph, RepositoryConfig};

#[derive(Parser)]
#[command(name = "bootgraph")]
#[command(about = "bootstrap build-graph traverser - materialize an action graph on disk")]
#[command(version)]
struct Cli {
    /// repository-description file to use
    #[arg(short = 'C', value_name = "FILE", default_value = "repo-conf.json")]
    repository_config: PathBuf,

    /// directory to place output to
    #[arg(short = 'o', value_name = "DIR", default_value = "out-boot")]
    output_directory: PathBuf,

    /// root for storing intermediate outputs
    #[arg(
        long,
        alias = "local_build_root",
        value_name = "PATH",
        default_value = ".just-boot"
    )]
    local_build_root: PathBuf,

    /// workspace root to use if none is specified
    #[arg(long, alias = "default_workspace", value_name = "PATH")]
    default_workspace: Option<PathBuf>,

    /// number of worker threads (default: hardware threads)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// build with the single-threaded traverser
    #[arg(long)]
    sequential: bool,

    /// graph description file
    graph: PathBuf,

    /// targets to build
    targets: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(cli: Cli) -> bootgraph::Result<()> {
    let graph = Graph::load(&cli.graph)?;
    let targets = load_targets(&cli.targets)?;
    let mut config = RepositoryConfig::load(&cli.repository_config)?;
    if let Some(workspace) = &cli.default_workspace {
        config.fill_default_workspace(workspace)?;
    }

    let options = TraverseOptions {
        jobs: cli.jobs,
        sequential: cli.sequential,
    };
    traverse(
        graph,
        targets,
        config,
        &cli.output_directory,
        &cli.local_build_root,
        &options,
    )
}
