use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;

use league_stats::config::EngineConfig;
use league_stats::turn_store::FileTurnStore;

const USAGE: &str = "usage: turn_cache <info|prune|clear> [--dir=<path>]";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = EngineConfig::from_env();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let command = parse_command_arg(&args).ok_or_else(|| anyhow!(USAGE))?;
    let dir = parse_dir_arg(&args)
        .or_else(|| config.cache_dir.clone())
        .context("unable to resolve turn cache directory; set TURN_CACHE_DIR")?;
    let store = FileTurnStore::new(dir);

    match command {
        "info" => {
            let info = store.info()?;
            println!("Turn cache: {}", store.dir().display());
            println!("Entries: {}", info.entries);
            println!("Corrupt: {}", info.corrupt);
            println!("Bytes: {}", info.total_bytes);
            println!(
                "Oldest: {}",
                info.oldest.map(|t| t.to_rfc3339()).as_deref().unwrap_or("n/a")
            );
            println!(
                "Newest: {}",
                info.newest.map(|t| t.to_rfc3339()).as_deref().unwrap_or("n/a")
            );
            println!("TTL days: {}", config.ttl_days);
        }
        "prune" => {
            let removed = store.prune_expired(config.ttl(), Utc::now())?;
            println!("Removed {removed} expired or unreadable entries");
        }
        "clear" => {
            let removed = store.clear()?;
            println!("Removed {removed} entries");
        }
        other => return Err(anyhow!("unknown command {other}\n{USAGE}")),
    }
    Ok(())
}

fn parse_command_arg(args: &[String]) -> Option<&str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--dir" {
            iter.next();
            continue;
        }
        if !arg.starts_with("--") {
            return Some(arg.as_str());
        }
    }
    None
}

fn parse_dir_arg(args: &[String]) -> Option<PathBuf> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--dir=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--dir" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn command_skips_the_dir_value() {
        let spaced = args(&["--dir", "/tmp/turns", "info"]);
        assert_eq!(parse_command_arg(&spaced), Some("info"));
        assert_eq!(parse_dir_arg(&spaced), Some(PathBuf::from("/tmp/turns")));

        let joined = args(&["prune", "--dir=/tmp/turns"]);
        assert_eq!(parse_command_arg(&joined), Some("prune"));
        assert_eq!(parse_dir_arg(&joined), Some(PathBuf::from("/tmp/turns")));

        assert_eq!(parse_command_arg(&args(&["--dir", "/tmp/turns"])), None);
    }
}
