//! Read-through memoization over a `CacheStore`.
//!
//! Keys are namespaced as `{namespace}:{kind}:...`, with the company or year
//! segment placed so that invalidation can target a prefix. Stores without
//! prefix deletion get a full flush instead.

use std::borrow::Cow;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analysis_core::{AnalysisError, CacheStore, Horizon, PrefixDelete};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// What an invalidation call removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invalidation {
    pub deleted: usize,
    /// The store could not delete by prefix and the whole namespace was flushed
    pub flushed: bool,
}

pub struct AnalysisCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    namespace: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnalysisCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, namespace: impl Into<String>) -> Self {
        Self {
            store,
            ttl,
            namespace: namespace.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn dashboard_key(&self, company_id: &str, year: i32, horizon: Horizon) -> String {
        format!(
            "{}:dashboard:{}:{}:{}",
            self.namespace,
            year,
            key_segment(company_id),
            horizon
        )
    }

    pub fn indicators_key(&self, company_id: &str, year: i32) -> String {
        format!("{}:indicators:{}:{}", self.namespace, key_segment(company_id), year)
    }

    pub fn historical_key(&self, company_id: &str, start: i32, end: i32, horizon: Horizon) -> String {
        format!(
            "{}:historical:{}:{}-{}:{}",
            self.namespace,
            key_segment(company_id),
            start,
            end,
            horizon
        )
    }

    pub fn benchmark_key(&self, company_id: &str, year: i32, horizon: Horizon) -> String {
        format!(
            "{}:benchmark:{}:{}:{}",
            self.namespace,
            year,
            key_segment(company_id),
            horizon
        )
    }

    /// Return the cached value for `key`, or run `compute` and store its
    /// result for the configured TTL.
    ///
    /// Store failures and undecodable entries are logged and treated as a
    /// miss; a read never fails because of the cache.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> Result<T, AnalysisError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_value::<T>(raw) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Cache hit for {}", key);
                    return Ok(value);
                }
                Err(e) => tracing::warn!("Discarding undecodable cache entry {}: {}", key, e),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("Cache read for {} failed: {}", key, e),
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Cache miss for {}", key);

        let value = compute().await?;
        match serde_json::to_value(&value) {
            Ok(raw) => {
                if let Err(e) = self.store.set(key, raw, self.ttl).await {
                    tracing::warn!("Cache write for {} failed: {}", key, e);
                }
            }
            Err(e) => tracing::warn!("Could not encode {} for the cache: {}", key, e),
        }
        Ok(value)
    }

    /// Drop dashboard and indicator entries of `company_id` for one year (all
    /// horizons) or every year, plus all of its historical views.
    ///
    /// Dashboard keys lead with the year, so dropping every year of one
    /// company drops the dashboards of all companies.
    pub async fn invalidate(
        &self,
        company_id: &str,
        year: Option<i32>,
    ) -> Result<Invalidation, AnalysisError> {
        let ns = &self.namespace;
        let company = key_segment(company_id);
        let mut prefixes = vec![format!("{}:historical:{}:", ns, company)];
        match year {
            Some(y) => {
                self.store.delete(&self.indicators_key(company_id, y)).await?;
                prefixes.push(format!("{}:dashboard:{}:{}:", ns, y, company));
            }
            None => {
                prefixes.push(format!("{}:indicators:{}:", ns, company));
                prefixes.push(format!("{}:dashboard:", ns));
            }
        }

        let outcome = self.delete_prefixes(&prefixes).await?;
        tracing::info!(
            "Invalidated cache for {} (year {:?}): {} entries{}",
            company_id,
            year,
            outcome.deleted,
            if outcome.flushed { ", namespace flushed" } else { "" }
        );
        Ok(outcome)
    }

    /// Drop every cached benchmark pair of `year` and the views that embed
    /// one: the dashboards of that year and all historical views.
    pub async fn invalidate_benchmarks(&self, year: i32) -> Result<Invalidation, AnalysisError> {
        let ns = &self.namespace;
        let prefixes = [
            format!("{}:benchmark:{}:", ns, year),
            format!("{}:dashboard:{}:", ns, year),
            format!("{}:historical:", ns),
        ];
        let outcome = self.delete_prefixes(&prefixes).await?;
        tracing::info!("Invalidated cached benchmarks for {}: {} entries", year, outcome.deleted);
        Ok(outcome)
    }

    async fn delete_prefixes(&self, prefixes: &[String]) -> Result<Invalidation, AnalysisError> {
        let mut outcome = Invalidation::default();
        for prefix in prefixes {
            if self.delete_prefix(prefix, &mut outcome).await? {
                break;
            }
        }
        Ok(outcome)
    }

    /// Returns true when the fallback flush ran, after which further
    /// prefixes are moot.
    async fn delete_prefix(
        &self,
        prefix: &str,
        outcome: &mut Invalidation,
    ) -> Result<bool, AnalysisError> {
        match self.store.delete_by_prefix(prefix).await? {
            PrefixDelete::Deleted(n) => {
                outcome.deleted += n;
                Ok(false)
            }
            PrefixDelete::Unsupported => {
                tracing::warn!(
                    "Cache store cannot delete by prefix {}; flushing namespace {}",
                    prefix,
                    self.namespace
                );
                self.store.flush().await?;
                outcome.flushed = true;
                Ok(true)
            }
        }
    }
}

/// Company ids are escaped so that a `:` inside an id cannot extend another
/// company's prefix.
fn key_segment(company_id: &str) -> Cow<'_, str> {
    if company_id.contains([':', '%']) {
        Cow::Owned(company_id.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(company_id)
    }
}
