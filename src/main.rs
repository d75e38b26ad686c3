use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::info;
use tracing_subscriber::EnvFilter;

use league_stats::config::EngineConfig;
use league_stats::legs::RawLegRow;
use league_stats::recap::{OfflineSource, RecapClient, TurnDetailSource};
use league_stats::season::run_season;
use league_stats::turn_cache::TurnDetailCache;
use league_stats::turn_store::FileTurnStore;

const USAGE: &str = "usage: league_stats <legs.json> [--out=<report.json>] [--offline]";

struct Args {
    input: PathBuf,
    out: Option<PathBuf>,
    offline: bool,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("league_stats=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = parse_args()?;
    let config = EngineConfig::from_env();

    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let rows: Vec<RawLegRow> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of leg rows", args.input.display()))?;

    let cache_dir = config
        .cache_dir
        .clone()
        .context("unable to resolve turn cache directory; set TURN_CACHE_DIR")?;
    let source: Arc<dyn TurnDetailSource> = if args.offline {
        Arc::new(OfflineSource)
    } else {
        Arc::new(RecapClient::new(&config.recap_base_url, config.fetch_timeout)?)
    };
    let cache = TurnDetailCache::new(Arc::new(FileTurnStore::new(&cache_dir)), source)
        .with_ttl(config.ttl())
        .with_parallelism(config.fetch_parallelism);

    let report = run_season(&rows, &cache, &config.season())?;
    info!(
        players = report.players.len(),
        unresolved = report.unresolved_qp_legs.len(),
        quality = report.quality.score,
        cache_dir = %cache_dir.display(),
        "season report built"
    );

    let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
    match args.out {
        Some(path) => fs::write(&path, json + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn parse_args() -> Result<Args> {
    let mut input = None;
    let mut out = None;
    let mut offline = false;
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(path) = arg.strip_prefix("--out=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                out = Some(PathBuf::from(trimmed));
            }
        } else if arg == "--out" {
            out = iter.next().map(PathBuf::from);
        } else if arg == "--offline" {
            offline = true;
        } else if arg.starts_with("--") {
            return Err(anyhow!("unknown flag {arg}\n{USAGE}"));
        } else if input.is_none() {
            input = Some(PathBuf::from(arg));
        }
    }
    Ok(Args {
        input: input.ok_or_else(|| anyhow!(USAGE))?,
        out,
        offline,
    })
}
