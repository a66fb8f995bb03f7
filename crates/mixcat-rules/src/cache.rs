//! Cache-with-TTL abstraction for loaded rule sets.
//!
//! The clock and the loader are both injected, so tests can force expiry
//! deterministically with a [`FakeClock`] instead of sleeping. Refresh is
//! idempotent and safe to race: concurrent callers may each load, and the
//! last writer wins — the staleness window is bounded by the TTL either way.

use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use mixcat_core::Result;

/// Injectable time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic cache-expiry tests.
#[derive(Clone)]
pub struct FakeClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().expect("clock lock poisoned");
        *offset += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().expect("clock lock poisoned")
    }
}

struct Slot<T> {
    loaded_at: Instant,
    value: Arc<T>,
}

/// A single-value cache that reloads through an injected loader after `ttl`.
pub struct TtlCache<T> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: RwLock<Option<Slot<T>>>,
}

impl<T> TtlCache<T> {
    /// Create a cache with the given TTL and clock.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slot: RwLock::new(None),
        }
    }

    /// Return the cached value, or run `loader` and cache its result.
    ///
    /// The loader runs without holding the lock; racing refreshes are
    /// harmless because loading is idempotent.
    pub async fn get_or_load<F, Fut>(&self, loader: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let now = self.clock.now();

        {
            let slot = self.slot.read().expect("cache lock poisoned");
            if let Some(cached) = slot.as_ref() {
                if now.duration_since(cached.loaded_at) < self.ttl {
                    return Ok(cached.value.clone());
                }
            }
        }

        let value = Arc::new(loader().await?);
        let mut slot = self.slot.write().expect("cache lock poisoned");
        *slot = Some(Slot {
            loaded_at: now,
            value: value.clone(),
        });
        Ok(value)
    }

    /// Drop the cached value so the next read reloads.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().expect("cache lock poisoned");
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn load_counting(counter: &AtomicUsize) -> Result<u32> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(42)
    }

    #[tokio::test]
    async fn test_fresh_value_is_served_from_cache() {
        let clock = Arc::new(FakeClock::new());
        let cache = TtlCache::new(Duration::from_secs(300), clock.clone());
        let loads = AtomicUsize::new(0);

        let a = cache.get_or_load(|| load_counting(&loads)).await.unwrap();
        let b = cache.get_or_load(|| load_counting(&loads)).await.unwrap();

        assert_eq!(*a, 42);
        assert_eq!(*b, 42);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_triggers_reload() {
        let clock = Arc::new(FakeClock::new());
        let cache = TtlCache::new(Duration::from_secs(300), clock.clone());
        let loads = AtomicUsize::new(0);

        cache.get_or_load(|| load_counting(&loads)).await.unwrap();
        clock.advance(Duration::from_secs(299));
        cache.get_or_load(|| load_counting(&loads)).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(2));
        cache.get_or_load(|| load_counting(&loads)).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let clock = Arc::new(FakeClock::new());
        let cache = TtlCache::new(Duration::from_secs(300), clock);
        let loads = AtomicUsize::new(0);

        cache.get_or_load(|| load_counting(&loads)).await.unwrap();
        cache.invalidate();
        cache.get_or_load(|| load_counting(&loads)).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loader_error_leaves_cache_empty() {
        let clock = Arc::new(FakeClock::new());
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(300), clock);
        let loads = AtomicUsize::new(0);

        let err = cache
            .get_or_load(|| async {
                Err(mixcat_core::Error::Internal("store down".into()))
            })
            .await;
        assert!(err.is_err());

        // A later successful load still populates the cache.
        let value = cache.get_or_load(|| load_counting(&loads)).await.unwrap();
        assert_eq!(*value, 42);
    }
}
