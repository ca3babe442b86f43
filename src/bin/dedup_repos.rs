//! dedup-repos - fold bisimilar repositories of a configuration
//!
//! reads a repository configuration as JSON on stdin, treats every
//! command-line argument as a repository name to preserve, and prints the
//! deduplicated configuration on stdout.

use std::io::Read;
use std::process::ExitCode;

use bootgraph::{Error, IoResultExt};

fn main() -> ExitCode {
    if let Err(e) = run() {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run() -> bootgraph::Result<()> {
    let keep: Vec<String> = std::env::args().skip(1).collect();

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .with_path("<stdin>")?;
    let config: serde_json::Value = serde_json::from_str(&input).map_err(|source| Error::Json {
        path: "<stdin>".into(),
        source,
    })?;

    let deduplicated = bootgraph::dedup::dedup(&config, &keep)?;
    println!("{}", deduplicated);
    Ok(())
}
