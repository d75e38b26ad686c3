use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::StoreError;
use crate::legs::MatchId;
use crate::recap::TurnDetail;

const STORE_VERSION: u32 = 1;
const CACHE_DIR: &str = "league_stats";
const TURNS_DIR: &str = "turns";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Persisted turn detail for one match. Entries are replaced whole, never
/// edited.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub match_id: MatchId,
    pub fetched_at: DateTime<Utc>,
    pub payload: Arc<TurnDetail>,
}

impl CacheEntry {
    pub fn valid_until(&self, ttl: Duration) -> DateTime<Utc> {
        self.fetched_at + ttl
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }
}

pub trait TurnStore: Send + Sync {
    /// `Ok(None)` is a plain miss. An entry that exists but cannot be
    /// trusted is `Err(StoreError::Corrupt)`.
    fn load(&self, match_id: &MatchId) -> Result<Option<CacheEntry>, StoreError>;

    fn persist(&self, entry: &CacheEntry) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    version: u32,
    match_id: MatchId,
    fetched_at: DateTime<Utc>,
    /// base64 sha256 of `payload`.
    checksum: String,
    payload: String,
}

/// One JSON file per match under a cache directory.
#[derive(Debug, Clone)]
pub struct FileTurnStore {
    dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreInfo {
    pub entries: usize,
    pub corrupt: usize,
    pub total_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl FileTurnStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `$XDG_CACHE_HOME/league_stats/turns`, falling back to `~/.cache`.
    pub fn default_dir() -> Option<PathBuf> {
        if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
            if !base.trim().is_empty() {
                return Some(PathBuf::from(base).join(CACHE_DIR).join(TURNS_DIR));
            }
        }
        let home = std::env::var("HOME").ok()?;
        if home.trim().is_empty() {
            return None;
        }
        Some(
            PathBuf::from(home)
                .join(".cache")
                .join(CACHE_DIR)
                .join(TURNS_DIR),
        )
    }

    fn entry_path(&self, match_id: &MatchId) -> PathBuf {
        self.dir.join(format!("{}.json", match_id.as_str()))
    }

    fn read_record(path: &Path) -> Result<CacheEntry, StoreError> {
        let raw = fs::read_to_string(path)?;
        let record = serde_json::from_str::<CacheRecord>(&raw)
            .map_err(|err| StoreError::Corrupt(format!("unreadable record: {err}")))?;
        if record.version != STORE_VERSION {
            return Err(StoreError::Corrupt(format!(
                "version {} != {STORE_VERSION}",
                record.version
            )));
        }
        if checksum(&record.payload) != record.checksum {
            return Err(StoreError::Corrupt("checksum mismatch".to_string()));
        }
        let payload = serde_json::from_str::<TurnDetail>(&record.payload)
            .map_err(|err| StoreError::Corrupt(format!("unreadable payload: {err}")))?;
        if payload.match_id != record.match_id {
            return Err(StoreError::Corrupt("payload belongs to another match".to_string()));
        }
        Ok(CacheEntry {
            match_id: record.match_id,
            fetched_at: record.fetched_at,
            payload: Arc::new(payload),
        })
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let read = match fs::read_dir(&self.dir) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut files = Vec::new();
        for item in read {
            let path = item?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn info(&self) -> Result<StoreInfo, StoreError> {
        let mut info = StoreInfo::default();
        for path in self.entry_files()? {
            if !is_entry_file(&path) {
                continue;
            }
            info.total_bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match Self::read_record(&path) {
                Ok(entry) => {
                    info.entries += 1;
                    info.oldest = Some(info.oldest.map_or(entry.fetched_at, |t| t.min(entry.fetched_at)));
                    info.newest = Some(info.newest.map_or(entry.fetched_at, |t| t.max(entry.fetched_at)));
                }
                Err(_) => info.corrupt += 1,
            }
        }
        Ok(info)
    }

    /// Removes expired and corrupt entries plus leftover temporary files.
    pub fn prune_expired(&self, ttl: Duration, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let stale = if is_entry_file(&path) {
                match Self::read_record(&path) {
                    Ok(entry) => !entry.is_fresh(now, ttl),
                    Err(_) => true,
                }
            } else {
                path.extension().is_some_and(|ext| ext == "tmp")
            };
            if stale {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let is_tmp = path.extension().is_some_and(|ext| ext == "tmp");
            if is_entry_file(&path) || is_tmp {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl TurnStore for FileTurnStore {
    fn load(&self, match_id: &MatchId) -> Result<Option<CacheEntry>, StoreError> {
        let path = self.entry_path(match_id);
        match Self::read_record(&path) {
            Ok(entry) if entry.match_id == *match_id => Ok(Some(entry)),
            Ok(_) => Err(StoreError::Corrupt("entry filed under the wrong key".to_string())),
            Err(StoreError::Io(err)) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn persist(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let payload = serde_json::to_string(entry.payload.as_ref())?;
        let record = CacheRecord {
            version: STORE_VERSION,
            match_id: entry.match_id.clone(),
            fetched_at: entry.fetched_at,
            checksum: checksum(&payload),
            payload,
        };
        let json = serde_json::to_string(&record)?;

        // Readers only ever see the old file or the complete new one.
        let path = self.entry_path(&entry.match_id);
        let tmp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, json)?;
        if let Err(err) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        debug!(match_id = %entry.match_id, path = %path.display(), "persisted turn detail");
        Ok(())
    }
}

/// Process-local store, mostly for tests and cache-less runs.
#[derive(Debug, Default)]
pub struct MemoryTurnStore {
    entries: Mutex<HashMap<MatchId, CacheEntry>>,
    persists: AtomicU64,
}

impl MemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(entry: CacheEntry) -> Self {
        let store = Self::default();
        store
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.match_id.clone(), entry);
        store
    }

    pub fn get(&self, match_id: &MatchId) -> Option<CacheEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(match_id)
            .cloned()
    }

    pub fn persist_count(&self) -> u64 {
        self.persists.load(Ordering::SeqCst)
    }
}

impl TurnStore for MemoryTurnStore {
    fn load(&self, match_id: &MatchId) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.get(match_id))
    }

    fn persist(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.match_id.clone(), entry.clone());
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn checksum(payload: &str) -> String {
    STANDARD.encode(Sha256::digest(payload.as_bytes()))
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recap::{RecapLeg, RecapTurn};

    fn id(raw: &str) -> MatchId {
        MatchId::from_locator(raw).expect("valid id")
    }

    fn entry(raw: &str, fetched_at: DateTime<Utc>) -> CacheEntry {
        let match_id = id(raw);
        CacheEntry {
            match_id: match_id.clone(),
            fetched_at,
            payload: Arc::new(TurnDetail {
                match_id,
                legs: vec![RecapLeg {
                    set_number: 1,
                    leg_number: 1,
                    game_name: "Cricket".to_string(),
                    turns: vec![RecapTurn {
                        player: "Smith, J".to_string(),
                        turn_score: "T20, T19, T18".to_string(),
                    }],
                }],
            }),
        }
    }

    #[test]
    fn persisted_entry_loads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTurnStore::new(dir.path());
        let now = Utc::now();
        let written = entry("aaaaaa111111", now);
        store.persist(&written).expect("persist");

        let loaded = store.load(&written.match_id).expect("load").expect("entry");
        assert_eq!(loaded, written);
        assert!(store.load(&id("bbbbbb222222")).expect("load").is_none());
    }

    #[test]
    fn persist_replaces_previous_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTurnStore::new(dir.path());
        let old = Utc::now() - Duration::days(200);
        store.persist(&entry("aaaaaa111111", old)).expect("persist");
        let newer = entry("aaaaaa111111", Utc::now());
        store.persist(&newer).expect("persist");

        let loaded = store.load(&newer.match_id).expect("load").expect("entry");
        assert_eq!(loaded.fetched_at, newer.fetched_at);
        let leftovers = fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn tampered_payload_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTurnStore::new(dir.path());
        let written = entry("aaaaaa111111", Utc::now());
        store.persist(&written).expect("persist");

        let path = dir.path().join("aaaaaa111111.json");
        let raw = fs::read_to_string(&path).expect("read");
        fs::write(&path, raw.replace("T20, T19, T18", "T20, T19, T19")).expect("write");
        assert!(matches!(store.load(&written.match_id), Err(StoreError::Corrupt(_))));

        fs::write(&path, "{\"version\":1,").expect("write");
        assert!(matches!(store.load(&written.match_id), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn prune_drops_expired_and_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileTurnStore::new(dir.path());
        let now = Utc::now();
        store.persist(&entry("aaaaaa111111", now - Duration::days(151))).expect("persist");
        store.persist(&entry("bbbbbb222222", now - Duration::days(10))).expect("persist");
        fs::write(dir.path().join("cccccc333333.json"), "garbage").expect("write");
        fs::write(dir.path().join("dddddd444444.json.1.2.tmp"), "partial").expect("write");

        let info = store.info().expect("info");
        assert_eq!(info.entries, 2);
        assert_eq!(info.corrupt, 1);
        assert!(info.oldest < info.newest);

        let removed = store.prune_expired(Duration::days(150), now).expect("prune");
        assert_eq!(removed, 3);
        assert!(store.load(&id("bbbbbb222222")).expect("load").is_some());
        assert_eq!(store.clear().expect("clear"), 1);
    }

    #[test]
    fn freshness_is_strictly_inside_ttl() {
        let now = Utc::now();
        let ttl = Duration::days(150);
        assert!(entry("aaaaaa111111", now - Duration::days(149)).is_fresh(now, ttl));
        assert!(!entry("aaaaaa111111", now - ttl).is_fresh(now, ttl));
        assert_eq!(entry("aaaaaa111111", now).valid_until(ttl), now + ttl);
    }
}
