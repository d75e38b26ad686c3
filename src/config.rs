use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::accumulator::DEFAULT_QUALIFY_GAMES;
use crate::aggregator::DivisionRules;
use crate::http_client::DEFAULT_TIMEOUT_SECS;
use crate::recap::DEFAULT_RECAP_BASE_URL;
use crate::season::SeasonConfig;
use crate::turn_cache::{DEFAULT_FETCH_PARALLELISM, DEFAULT_TTL_DAYS};
use crate::turn_store::FileTurnStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub cache_dir: Option<PathBuf>,
    pub ttl_days: i64,
    pub fetch_parallelism: usize,
    pub fetch_timeout: Duration,
    pub recap_base_url: String,
    pub qualify_games: u32,
    pub best_of_one_divisions: Vec<String>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let opt = |key: &str| {
            lookup(key)
                .map(|val| val.trim().to_string())
                .filter(|val| !val.is_empty())
        };

        let cache_dir = opt("TURN_CACHE_DIR")
            .map(PathBuf::from)
            .or_else(FileTurnStore::default_dir);
        let ttl_days = opt("TURN_CACHE_TTL_DAYS")
            .and_then(|val| val.parse::<i64>().ok())
            .unwrap_or(DEFAULT_TTL_DAYS)
            .clamp(1, 3650);
        let fetch_parallelism = opt("FETCH_PARALLELISM")
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_FETCH_PARALLELISM)
            .clamp(1, 32);
        let fetch_timeout = Duration::from_secs(
            opt("FETCH_TIMEOUT_SECS")
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .clamp(1, 300),
        );
        let recap_base_url =
            opt("RECAP_BASE_URL").unwrap_or_else(|| DEFAULT_RECAP_BASE_URL.to_string());
        let qualify_games = opt("QUALIFY_GAMES")
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(DEFAULT_QUALIFY_GAMES)
            .clamp(1, 200);
        let best_of_one_divisions = opt("BEST_OF_ONE_DIVISIONS")
            .map(|val| {
                val.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            cache_dir,
            ttl_days,
            fetch_parallelism,
            fetch_timeout,
            recap_base_url,
            qualify_games,
            best_of_one_divisions,
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.ttl_days)
    }

    pub fn season(&self) -> SeasonConfig {
        SeasonConfig {
            rules: DivisionRules::new(&self.best_of_one_divisions),
            qualify_games: self.qualify_games,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::aggregator::DivisionRule;

    fn config(vars: &[(&str, &str)]) -> EngineConfig {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[("TURN_CACHE_DIR", "/tmp/turns")]);
        assert_eq!(cfg.cache_dir, Some(PathBuf::from("/tmp/turns")));
        assert_eq!(cfg.ttl_days, 150);
        assert_eq!(cfg.fetch_parallelism, 6);
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(30));
        assert_eq!(cfg.qualify_games, 18);
        assert_eq!(cfg.recap_base_url, DEFAULT_RECAP_BASE_URL);
    }

    #[test]
    fn values_are_clamped_and_junk_ignored() {
        let cfg = config(&[
            ("TURN_CACHE_TTL_DAYS", "0"),
            ("FETCH_PARALLELISM", "500"),
            ("FETCH_TIMEOUT_SECS", "soon"),
            ("QUALIFY_GAMES", " 12 "),
        ]);
        assert_eq!(cfg.ttl_days, 1);
        assert_eq!(cfg.fetch_parallelism, 32);
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(30));
        assert_eq!(cfg.qualify_games, 12);
    }

    #[test]
    fn best_of_one_list_feeds_rules() {
        let cfg = config(&[("BEST_OF_ONE_DIVISIONS", "Rookie, C ,,")]);
        assert_eq!(cfg.best_of_one_divisions, vec!["Rookie", "C"]);
        let season = cfg.season();
        assert_eq!(season.rules.rule_for("rookie"), DivisionRule::BestOfOne);
        assert_eq!(season.rules.rule_for("A"), DivisionRule::BestOfThree);
    }
}
