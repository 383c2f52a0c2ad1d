//! 🚀 granq-cli: the front door, the bouncer, the maitre d' of granq.
//!
//! 🎬 *[narrator voice]* "It all started with a list of granules and a deadline..."
//! 📦 Thin wrapper: parse args, set up logging, load config and input, hand it all to
//! `granq::run`, print what came back. Like a manager. 🦆
//!
//! stdout gets the `QueueOutput` JSON (pipe it wherever). stderr gets logs, the progress
//! bar and the per-group summary table.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🌾 Group granules by collection and provider, mark them queued, start one ingest
/// execution per batch.
#[derive(Debug, Parser)]
#[command(name = "granq", version, about)]
struct Args {
    /// 🔧 TOML config file. Defaults to ./granq.toml when that exists, else env vars only.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 📥 Input file: .json document, or .ndjson/.jsonl, optionally .gz
    input: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }
        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like the granule API isn't reachable. \
                 Double-check [api.Http] url in the config, and that the service is actually up. ☕"
            );
        }
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config_file = resolve_config_file(args.config.as_deref())?;
    let app_config = granq::app_config::load_config(config_file.as_deref())
        .context("💀 Couldn't load the config. Make sure [queue] is complete and the TOML is actually TOML.")?;

    let input = granq::input::load_input(&args.input).await?;
    let report = granq::run(app_config, input).await?;

    eprintln!("{}", granq::progress::summary_table(&report.groups));
    let output = serde_json::to_string_pretty(&report.output).context("💀 the output refused to serialize")?;
    println!("{output}");
    Ok(())
}

/// 🔒 An explicit `--config` must exist. The implicit `granq.toml` is optional.
fn resolve_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let exists = path.try_exists().with_context(|| {
                format!("💀 Couldn't check whether config file '{}' exists", path.display())
            })?;
            if !exists {
                anyhow::bail!(
                    "💀 Config file '{}' doesn't exist. Check the path, or your cwd, or both.",
                    path.display()
                );
            }
            Ok(Some(path.to_path_buf()))
        }
        None => {
            let fallback = Path::new("granq.toml");
            Ok(fallback.is_file().then(|| fallback.to_path_buf()))
        }
    }
}
