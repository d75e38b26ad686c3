use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::FetchError;
use crate::legs::MatchId;
use crate::recap::{TurnDetail, TurnDetailSource};
use crate::turn_store::{CacheEntry, TurnStore};

pub const DEFAULT_TTL_DAYS: i64 = 150;
pub const DEFAULT_FETCH_PARALLELISM: usize = 6;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Outcome = Result<Arc<CacheEntry>, FetchError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Fresh entries served from the store.
    pub hits: usize,
    pub misses: usize,
    pub expired: usize,
    pub corrupt: usize,
    pub fetches: usize,
    pub fetch_failures: usize,
    /// Resolutions answered by an earlier resolution of the same run.
    pub reused: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    expired: AtomicUsize,
    corrupt: AtomicUsize,
    fetches: AtomicUsize,
    fetch_failures: AtomicUsize,
    reused: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// Match id to turn detail. A match id is fetched at most once per TTL window
/// per instance; concurrent callers for the same id wait on the same fetch.
pub struct TurnDetailCache {
    store: Arc<dyn TurnStore>,
    source: Arc<dyn TurnDetailSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    parallelism: usize,
    slots: Mutex<HashMap<MatchId, Arc<OnceCell<Outcome>>>>,
    counters: Counters,
}

impl TurnDetailCache {
    pub fn new(store: Arc<dyn TurnStore>, source: Arc<dyn TurnDetailSource>) -> Self {
        Self {
            store,
            source,
            clock: Arc::new(SystemClock),
            ttl: Duration::days(DEFAULT_TTL_DAYS),
            parallelism: DEFAULT_FETCH_PARALLELISM,
            slots: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Never fatal: a failed or timed-out fetch comes back as `Err` for the
    /// caller to degrade on.
    pub fn resolve(&self, match_id: &MatchId) -> Result<Arc<TurnDetail>, FetchError> {
        let mut refreshed = false;
        loop {
            let slot = self.slot(match_id);
            let mut ran_here = false;
            let outcome = slot
                .get_or_init(|| {
                    ran_here = true;
                    self.load_or_fetch(match_id)
                })
                .clone();
            if !ran_here {
                bump(&self.counters.reused);
            }

            match outcome {
                Ok(entry) if !refreshed && !entry.is_fresh(self.clock.now(), self.ttl) => {
                    // Outlived its TTL during this run.
                    self.evict(match_id, &slot);
                    refreshed = true;
                }
                Ok(entry) => return Ok(Arc::clone(&entry.payload)),
                Err(err) => return Err(err),
            }
        }
    }

    /// Resolves every distinct id on a bounded pool. Returns how many failed.
    pub fn prefetch(&self, match_ids: &[MatchId]) -> usize {
        let unique = match_ids.iter().collect::<BTreeSet<_>>();
        if unique.is_empty() {
            return 0;
        }
        let unique = unique.into_iter().collect::<Vec<_>>();
        let failed = with_fetch_pool(self.parallelism, || {
            unique
                .par_iter()
                .filter(|id| self.resolve(id).is_err())
                .count()
        });
        info!(
            matches = unique.len(),
            failed,
            "prefetched turn detail"
        );
        failed
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::SeqCst),
            misses: c.misses.load(Ordering::SeqCst),
            expired: c.expired.load(Ordering::SeqCst),
            corrupt: c.corrupt.load(Ordering::SeqCst),
            fetches: c.fetches.load(Ordering::SeqCst),
            fetch_failures: c.fetch_failures.load(Ordering::SeqCst),
            reused: c.reused.load(Ordering::SeqCst),
        }
    }

    fn slot(&self, match_id: &MatchId) -> Arc<OnceCell<Outcome>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(match_id.clone()).or_default())
    }

    fn evict(&self, match_id: &MatchId, slot: &Arc<OnceCell<Outcome>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(match_id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(match_id);
        }
    }

    fn load_or_fetch(&self, match_id: &MatchId) -> Outcome {
        let now = self.clock.now();
        match self.store.load(match_id) {
            Ok(Some(entry)) if entry.is_fresh(now, self.ttl) => {
                bump(&self.counters.hits);
                debug!(%match_id, "turn detail cache hit");
                return Ok(Arc::new(entry));
            }
            Ok(Some(entry)) => {
                bump(&self.counters.expired);
                debug!(
                    %match_id,
                    valid_until = %entry.valid_until(self.ttl),
                    "turn detail expired"
                );
            }
            Ok(None) => bump(&self.counters.misses),
            Err(err) => {
                bump(&self.counters.corrupt);
                warn!(%match_id, %err, "discarding unusable cache entry");
            }
        }

        bump(&self.counters.fetches);
        match self.source.fetch(match_id) {
            Ok(detail) => {
                let entry = CacheEntry {
                    match_id: match_id.clone(),
                    fetched_at: self.clock.now(),
                    payload: Arc::new(detail),
                };
                if let Err(err) = self.store.persist(&entry) {
                    warn!(%match_id, %err, "failed to persist turn detail");
                }
                Ok(Arc::new(entry))
            }
            Err(err) => {
                bump(&self.counters.fetch_failures);
                warn!(%match_id, %err, "turn detail fetch failed");
                Err(err)
            }
        }
    }
}

fn with_fetch_pool<T>(threads: usize, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(action),
        Err(_) => action(),
    }
}
