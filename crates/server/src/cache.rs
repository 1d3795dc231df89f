use config::CacheConfig;
use mini_moka::sync::Cache;
use storage::PredictionSession;

/// Recently read predictions, keyed by uid.
///
/// Entries expire a fixed time after insertion. A miss always falls back to
/// the store, so a disabled cache only costs lookups.
#[derive(Clone)]
pub(crate) struct PredictionCache {
    inner: Option<Cache<String, PredictionSession>>,
}

impl PredictionCache {
    pub fn new(config: &CacheConfig) -> Self {
        let inner = config.enabled.then(|| {
            Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(config.ttl)
                .build()
        });

        Self { inner }
    }

    pub fn get(&self, uid: &str) -> Option<PredictionSession> {
        self.inner.as_ref()?.get(&uid.to_string())
    }

    /// Stores `session`, replacing any entry for the same uid and restarting its lifetime.
    pub fn set(&self, session: PredictionSession) {
        if let Some(cache) = &self.inner {
            cache.insert(session.uid.clone(), session);
        }
    }

    pub fn invalidate(&self, uid: &str) {
        if let Some(cache) = &self.inner {
            cache.invalidate(&uid.to_string());
        }
    }
}
