use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Address;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;

use crate::domain::ChainId;
use crate::error::ProviderError;
use crate::ports::ClockPort;

/// Read methods whose results are shared between page contexts.
pub const CACHEABLE_METHODS: &[&str] = &[
    "eth_blockNumber",
    "eth_call",
    "eth_gasPrice",
    "eth_getBalance",
    "eth_getBlockByNumber",
    "eth_getCode",
    "eth_getStorageAt",
    "eth_getTransactionCount",
];

pub fn is_cacheable(method: &str) -> bool {
    CACHEABLE_METHODS.contains(&method)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    address: String,
    chain_id: ChainId,
    method: String,
    params: String,
}

impl CacheKey {
    pub fn new(address: Option<Address>, chain_id: ChainId, method: &str, params: &Value) -> Self {
        Self {
            address: address
                .map(|a| format!("{a:?}").to_lowercase())
                .unwrap_or_default(),
            chain_id,
            method: method.to_owned(),
            params: params.to_string(),
        }
    }
}

pub type SharedFetch = Shared<BoxFuture<'static, Result<Value, ProviderError>>>;

#[derive(Clone)]
pub enum CacheEntry {
    Pending(SharedFetch),
    Settled(Value),
}

enum Slot {
    InFlight { generation: u64, fetch: SharedFetch },
    Settled { value: Value, stored_at_ms: u64 },
}

/// Coalesces identical reads: at most one upstream call per key is in flight.
pub struct ResponseCache {
    entries: Mutex<HashMap<CacheKey, Slot>>,
    generation: AtomicU64,
    ttl_ms: u64,
    clock: Arc<dyn ClockPort>,
}

impl ResponseCache {
    pub fn new(ttl_ms: u64, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            ttl_ms,
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<CacheKey, Slot>>, ProviderError> {
        self.entries
            .lock()
            .map_err(|e| ProviderError::Internal(format!("response cache lock poisoned: {e}")))
    }

    fn is_fresh(&self, stored_at_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(stored_at_ms) < self.ttl_ms
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, ProviderError> {
        let now = self.clock.now_ms()?;
        let entries = self.lock()?;
        Ok(match entries.get(key) {
            Some(Slot::InFlight { fetch, .. }) => Some(CacheEntry::Pending(fetch.clone())),
            Some(Slot::Settled {
                value,
                stored_at_ms,
            }) if self.is_fresh(*stored_at_ms, now) => Some(CacheEntry::Settled(value.clone())),
            _ => None,
        })
    }

    pub fn set(&self, key: CacheKey, value: Value) -> Result<(), ProviderError> {
        let stored_at_ms = self.clock.now_ms()?;
        self.lock()?.insert(
            key,
            Slot::Settled {
                value,
                stored_at_ms,
            },
        );
        Ok(())
    }

    pub fn invalidate(&self, key: &CacheKey) -> Result<(), ProviderError> {
        self.lock()?.remove(key);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ProviderError> {
        self.lock()?.clear();
        Ok(())
    }

    /// Returns the cached value, joins an identical in-flight call, or starts
    /// `fetch` and publishes it for later callers before awaiting it.
    pub async fn get_or_fetch<F>(&self, key: CacheKey, fetch: F) -> Result<Value, ProviderError>
    where
        F: Future<Output = Result<Value, ProviderError>> + Send + 'static,
    {
        let now = self.clock.now_ms()?;
        let (shared, generation) = {
            let mut entries = self.lock()?;
            let joined = match entries.get(&key) {
                Some(Slot::Settled {
                    value,
                    stored_at_ms,
                }) if self.is_fresh(*stored_at_ms, now) => return Ok(value.clone()),
                Some(Slot::InFlight { generation, fetch }) => Some((fetch.clone(), *generation)),
                _ => None,
            };
            match joined {
                Some(joined) => joined,
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let shared = fetch.boxed().shared();
                    entries.insert(
                        key.clone(),
                        Slot::InFlight {
                            generation,
                            fetch: shared.clone(),
                        },
                    );
                    (shared, generation)
                }
            }
        };

        let result = shared.await;
        self.settle(&key, generation, &result)?;
        result
    }

    fn settle(
        &self,
        key: &CacheKey,
        generation: u64,
        result: &Result<Value, ProviderError>,
    ) -> Result<(), ProviderError> {
        let stored_at_ms = self.clock.now_ms()?;
        let mut entries = self.lock()?;
        let owns_slot = matches!(
            entries.get(key),
            Some(Slot::InFlight { generation: g, .. }) if *g == generation
        );
        if !owns_slot {
            return Ok(());
        }
        match result {
            Ok(value) => {
                entries.insert(
                    key.clone(),
                    Slot::Settled {
                        value: value.clone(),
                        stored_at_ms,
                    },
                );
            }
            Err(_) => {
                entries.remove(key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::ports::PortError;

    #[derive(Default)]
    struct ManualClock(AtomicU64);

    impl ClockPort for ManualClock {
        fn now_ms(&self) -> Result<u64, PortError> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    fn key() -> CacheKey {
        CacheKey::new(None, 1, "eth_blockNumber", &serde_json::json!([]))
    }

    #[tokio::test]
    async fn concurrent_identical_reads_share_one_fetch() {
        let cache = Arc::new(ResponseCache::new(1_000, Arc::new(ManualClock::default())));
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let rx = rx.shared();

        let spawn_read = |cache: Arc<ResponseCache>| {
            let calls = Arc::clone(&calls);
            let gate = rx.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch(key(), async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = gate.await;
                        Ok(serde_json::json!("0x10"))
                    })
                    .await
            })
        };

        let a = spawn_read(Arc::clone(&cache));
        let b = spawn_read(Arc::clone(&cache));
        tokio::task::yield_now().await;
        tx.send(()).expect("release fetch");

        let a = a.await.expect("join a").expect("read a");
        let b = b.await.expect("join b").expect("read b");
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = ResponseCache::new(1_000, Arc::new(ManualClock::default()));
        let err = cache
            .get_or_fetch(key(), async { Err(ProviderError::Internal("down".to_owned())) })
            .await
            .expect_err("upstream failure");
        assert!(matches!(err, ProviderError::Internal(_)));
        assert!(cache.get(&key()).expect("get").is_none());

        let value = cache
            .get_or_fetch(key(), async { Ok(serde_json::json!(7)) })
            .await
            .expect("retry succeeds");
        assert_eq!(value, serde_json::json!(7));
    }

    #[tokio::test]
    async fn settled_values_expire_after_ttl() {
        let clock = Arc::new(ManualClock::default());
        let cache = ResponseCache::new(100, clock.clone());
        cache.set(key(), serde_json::json!(1)).expect("set");
        assert!(matches!(
            cache.get(&key()).expect("get"),
            Some(CacheEntry::Settled(_))
        ));

        clock.0.store(150, Ordering::SeqCst);
        assert!(cache.get(&key()).expect("get").is_none());
        let value = cache
            .get_or_fetch(key(), async { Ok(serde_json::json!(2)) })
            .await
            .expect("refetch");
        assert_eq!(value, serde_json::json!(2));
    }
}
