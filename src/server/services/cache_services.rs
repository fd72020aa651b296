use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// how often the background sweep wakes up to drop expired entries
pub const SWEEP_INTERVAL_SECONDS: u64 = 60;

pub type DynResponseCacheService = Arc<dyn ResponseCacheServiceTrait + Send + Sync>;

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
}

#[async_trait::async_trait]
pub trait ResponseCacheServiceTrait {
    /// fetch a processed (body, content_type) pair. an entry past its ttl is
    /// deleted on the spot and reported as a miss.
    async fn get(&self, key: &str) -> Option<(Vec<u8>, String)>;

    /// store a processed payload under the original request url.
    async fn set(&self, key: &str, body: Vec<u8>, content_type: &str, ttl_seconds: u64);

    /// drop everything.
    async fn clear(&self);

    async fn stats(&self) -> CacheStats;

    /// stop the sweep task and clear all entries. call once at shutdown.
    async fn destroy(&self);
}

struct CacheEntry {
    body: Vec<u8>,
    content_type: String,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// ttl-bounded in-memory cache for processed proxy responses.
///
/// keys are the raw request urls with no normalization, so two spellings of
/// the same url get separate entries. there is also no capacity bound - growth
/// is controlled by the ttls and the periodic sweep, and by `clear()` if an
/// operator needs a bigger hammer.
pub struct ResponseCacheService {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ResponseCacheService {
    /// spawns the sweep task, so this needs a tokio runtime.
    pub fn new(sweep_interval: Duration) -> Self {
        let entries: Arc<Mutex<HashMap<String, CacheEntry>>> = Arc::new(Mutex::new(HashMap::new()));

        let sweep_entries = entries.clone();
        let sweeper = tokio::spawn(async move {
            let mut tick = tokio::time::interval(sweep_interval);
            loop {
                tick.tick().await;
                Self::sweep(&sweep_entries);
            }
        });

        Self {
            entries,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    // expired entries are deleted, not skipped, otherwise a quiet key would pin
    // its payload in memory forever
    fn sweep(entries: &Mutex<HashMap<String, CacheEntry>>) {
        let mut lock = entries.lock().expect("cache lock poisoned");
        let before = lock.len();
        lock.retain(|_, entry| !entry.is_expired());
        let dropped = before - lock.len();

        if dropped > 0 {
            debug!("cache sweep dropped {} expired entries", dropped);
        }
    }
}

#[async_trait::async_trait]
impl ResponseCacheServiceTrait for ResponseCacheService {
    async fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        let mut lock = self.entries.lock().expect("cache lock poisoned");

        match lock.get(key) {
            Some(entry) if entry.is_expired() => {
                lock.remove(key);
                counter!("proxy_cache_misses_total").increment(1);
                debug!("cache entry expired: {}", key);
                None
            }
            Some(entry) => {
                counter!("proxy_cache_hits_total").increment(1);
                Some((entry.body.clone(), entry.content_type.clone()))
            }
            None => {
                counter!("proxy_cache_misses_total").increment(1);
                None
            }
        }
    }

    async fn set(&self, key: &str, body: Vec<u8>, content_type: &str, ttl_seconds: u64) {
        let entry = CacheEntry {
            body,
            content_type: content_type.to_string(),
            created_at: Instant::now(),
            ttl: Duration::from_secs(ttl_seconds),
        };

        debug!(
            "cached {} ({} bytes, ttl {}s)",
            key,
            entry.body.len(),
            ttl_seconds
        );

        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), entry);
    }

    async fn clear(&self) {
        let mut lock = self.entries.lock().expect("cache lock poisoned");
        let dropped = lock.len();
        lock.clear();
        info!("cache cleared ({} entries dropped)", dropped);
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.lock().expect("cache lock poisoned").len(),
        }
    }

    async fn destroy(&self) {
        if let Some(sweeper) = self
            .sweeper
            .lock()
            .expect("sweeper lock poisoned")
            .take()
        {
            sweeper.abort();
        }

        self.entries.lock().expect("cache lock poisoned").clear();
        info!("cache destroyed, sweep task stopped");
    }
}
