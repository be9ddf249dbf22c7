//! recgraph-load - Download the 1million dataset and bulk-load it
//!
//! Usage:
//!   recgraph-load --dir <path> [--verbosity <0-2>]
//!
//! Every existing namespace under `<path>` is dropped before the load. The
//! remaining engine settings come from `RECGRAPH_*` variables; `RECGRAPH_LOG`
//! overrides the filter chosen by `--verbosity`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context as _};
use clap::Parser;
use recgraph::{Context, Engine, EngineConfig};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const BENCHMARK_BASE: &str =
    "https://github.com/hypermodeinc/dgraph-benchmarks/blob/main/data";
const SCHEMA_FILE: &str = "1million.schema";
const RDF_FILE: &str = "1million.rdf.gz";

#[derive(Parser)]
#[command(name = "recgraph-load")]
#[command(about = "Load the 1million benchmark dataset into a recgraph directory")]
#[command(version)]
struct Cli {
    /// Data directory of the engine
    #[arg(long)]
    dir: PathBuf,

    /// 0 = warnings, 1 = info, 2 = debug
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    verbosity: u8,
}

fn init_tracing(directive: Option<&str>, verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = directive
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Stream `url` into `dest`
async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<u64> {
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?
        .error_for_status()
        .with_context(|| format!("downloading {url}"))?;

    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("creating {}", dest.display()))?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

async fn run(cli: Cli, config: EngineConfig) -> anyhow::Result<()> {
    let staging = tempfile::tempdir().context("creating download directory")?;
    let client = reqwest::Client::new();

    let mut paths = Vec::with_capacity(2);
    for name in [SCHEMA_FILE, RDF_FILE] {
        let url = format!("{BENCHMARK_BASE}/{name}?raw=true");
        let dest = staging.path().join(name);
        let bytes = download(&client, &url, &dest).await?;
        info!("Downloaded {} ({} bytes)", name, bytes);
        paths.push(dest);
    }
    let [schema, rdf] = paths.as_slice() else {
        bail!("expected a schema and an RDF file");
    };

    let config = EngineConfig {
        directory: cli.dir.clone(),
        ..config
    };
    let engine = Engine::open(config)
        .with_context(|| format!("opening engine at {}", cli.dir.display()))?;
    let ctx = Context::background();

    let result = async {
        engine.drop_all(&ctx).await?;
        engine.load(&ctx, schema, rdf).await
    }
    .await;
    engine.close().await?;

    let stats = result?;
    info!(
        "Loaded {} N-Quads into {} nodes ({} predicates, {} types)",
        stats.nquads, stats.nodes, stats.predicates, stats.types
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_filter.as_deref(), cli.verbosity);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_range() {
        let cli = Cli::try_parse_from(["recgraph-load", "--dir", "/tmp/x", "--verbosity", "2"]).unwrap();
        assert_eq!(cli.verbosity, 2);
        assert_eq!(cli.dir, PathBuf::from("/tmp/x"));

        assert!(Cli::try_parse_from(["recgraph-load", "--dir", "/tmp/x", "--verbosity", "3"]).is_err());
        assert!(Cli::try_parse_from(["recgraph-load"]).is_err());
    }
}
