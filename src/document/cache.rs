//! Per-document render cache
//!
//! Maps a [`RenderKey`] to the page it produced. The first request for a
//! key starts the producer as a shared future; concurrent requests for the
//! same key await that one production and all receive its outcome, success
//! or failure. Successes are kept. Failures are dropped once delivered, so a
//! later request starts over.
//!
//! The cache never touches files; deleting them is the owning
//! [`DocumentHandle`](super::DocumentHandle)'s job.

use std::collections::HashMap;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use super::types::{RenderKey, RenderResult};
use crate::error::Result;

type Production = Shared<BoxFuture<'static, Result<RenderResult>>>;

enum Entry {
    Ready(RenderResult),
    InFlight(Production),
}

/// Render cache with get-or-create semantics
#[derive(Default)]
pub struct PageCache {
    entries: Mutex<HashMap<RenderKey, Entry>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `key`, producing it if needed
    ///
    /// `producer` is only called when no result is cached and no production
    /// for `key` is in flight.
    pub async fn get_or_create<F, Fut>(&self, key: RenderKey, producer: F) -> Result<RenderResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RenderResult>> + Send + 'static,
    {
        let production = {
            let mut entries = self.entries.lock();
            match entries.get(&key) {
                Some(Entry::Ready(result)) => {
                    tracing::debug!("Page cache hit: page {} scale {}", key.page, key.scale());
                    return Ok(result.clone());
                }
                Some(Entry::InFlight(production)) => production.clone(),
                None => {
                    let production = producer().boxed().shared();
                    entries.insert(key, Entry::InFlight(production.clone()));
                    production
                }
            }
        };

        let outcome = production.clone().await;
        self.settle(key, &production, &outcome);
        outcome
    }

    /// Replace a finished production with its result, or forget it on failure
    fn settle(&self, key: RenderKey, production: &Production, outcome: &Result<RenderResult>) {
        let mut entries = self.entries.lock();
        let current = matches!(
            entries.get(&key),
            Some(Entry::InFlight(pending)) if pending.ptr_eq(production)
        );
        // Entries cleared while in flight stay cleared
        if !current {
            return;
        }

        match outcome {
            Ok(result) => {
                entries.insert(key, Entry::Ready(result.clone()));
            }
            Err(_) => {
                entries.remove(&key);
            }
        }
    }

    /// Number of produced results
    pub fn len(&self) -> usize {
        let entries = self.entries.lock();
        entries
            .values()
            .filter(|entry| matches!(entry, Entry::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry without touching files
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageImageError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn result(name: &str) -> RenderResult {
        RenderResult {
            path: PathBuf::from(name),
            width: 10,
            height: 20,
        }
    }

    #[tokio::test]
    async fn test_producer_runs_once_per_key() {
        let cache = PageCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = RenderKey::new(0, 2.0);

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let got = cache
                .get_or_create(key, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(result("a.png"))
                })
                .await
                .unwrap();
            assert_eq!(got, result("a.png"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_produce_separately() {
        let cache = PageCache::new();
        cache
            .get_or_create(RenderKey::new(0, 1.0), || async { Ok(result("a.png")) })
            .await
            .unwrap();
        let b = cache
            .get_or_create(RenderKey::new(0, 2.0), || async { Ok(result("b.png")) })
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(b, result("b.png"));
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = PageCache::new();
        let key = RenderKey::new(1, 1.0);

        let err = cache
            .get_or_create(key, || async { Err(PageImageError::Render("boom".into())) })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());
        assert!(cache.entries.lock().is_empty());

        let ok = cache
            .get_or_create(key, || async { Ok(result("retry.png")) })
            .await
            .unwrap();
        assert_eq!(ok, result("retry.png"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_production() {
        let cache = Arc::new(PageCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = RenderKey::new(2, 1.5);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_create(key, move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(result("shared.png"))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), result("shared.png"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_failure() {
        let cache = Arc::new(PageCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = RenderKey::new(0, 1.0);

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_create(key, move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Err(PageImageError::Render("unsupported shading".into()))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), "RENDER_ERROR");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_clear_drops_entries() {
        let cache = PageCache::new();
        cache
            .get_or_create(RenderKey::new(0, 1.0), || async { Ok(result("a.png")) })
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());

        // Produced again after clearing
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        cache
            .get_or_create(RenderKey::new(0, 1.0), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(result("b.png"))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
