//! Analysis Orchestrator
//!
//! Wires the indicator, benchmark and forecast services together behind one
//! facade and memoizes the read paths through the cache layer.

use std::sync::Arc;

use analysis_core::{
    AnalysisError, BenchmarkPair, BenchmarkStore, CacheStore, DataResult, ForecastEstimate,
    ForecastStore, Horizon, IndicatorSet, StatementSource,
};
use chrono::{Datelike, Utc};
use earnings_forecast::ForecastService;
use sector_benchmark::{
    BatchReport, BenchmarkService, DashboardComposer, DashboardView, HistoricalSeriesBuilder,
    HistoricalView, MetricAggregator,
};

pub mod cache;
pub mod config;
pub mod memory;

#[cfg(test)]
mod tests;

pub use cache::{AnalysisCache, CacheStats, Invalidation};
pub use config::EngineConfig;
pub use memory::{
    Dataset, MemoryBenchmarkStore, MemoryCacheStore, MemoryForecastStore, MemoryStatementSource,
};

pub struct AnalysisOrchestrator {
    config: EngineConfig,
    aggregator: MetricAggregator,
    benchmarks: BenchmarkService,
    historical: HistoricalSeriesBuilder,
    dashboard: DashboardComposer,
    forecasts: ForecastService,
    cache: AnalysisCache,
}

impl AnalysisOrchestrator {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn StatementSource>,
        benchmark_store: Arc<dyn BenchmarkStore>,
        forecast_store: Arc<dyn ForecastStore>,
        cache_store: Arc<dyn CacheStore>,
    ) -> Self {
        let aggregator = MetricAggregator::new(source.clone(), config.min_sample_size);
        let benchmarks =
            BenchmarkService::new(aggregator.clone(), benchmark_store, config.horizons.clone());
        let historical = HistoricalSeriesBuilder::new(aggregator.clone(), benchmarks.clone());
        let dashboard = DashboardComposer::new(aggregator.clone(), benchmarks.clone());
        let forecasts = ForecastService::new(source, forecast_store, config.forecast);
        let cache = AnalysisCache::new(cache_store, config.cache_ttl(), config.cache_namespace.clone());

        Self {
            config,
            aggregator,
            benchmarks,
            historical,
            dashboard,
            forecasts,
            cache,
        }
    }

    /// Orchestrator over fresh in-memory stores seeded from `dataset`.
    pub fn in_memory(config: EngineConfig, dataset: Dataset) -> Self {
        Self::new(
            config,
            Arc::new(MemoryStatementSource::from_dataset(dataset)),
            Arc::new(MemoryBenchmarkStore::new()),
            Arc::new(MemoryForecastStore::new()),
            Arc::new(MemoryCacheStore::new()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn compute_indicators(
        &self,
        company_id: &str,
        year: i32,
    ) -> Result<DataResult<IndicatorSet>, AnalysisError> {
        let key = self.cache.indicators_key(company_id, year);
        self.cache
            .get_or_compute(&key, || self.aggregator.compute_indicators(company_id, year))
            .await
    }

    pub async fn get_dashboard(
        &self,
        company_id: &str,
        year: i32,
        horizon: Horizon,
    ) -> Result<DataResult<DashboardView>, AnalysisError> {
        let key = self.cache.dashboard_key(company_id, year, horizon);
        self.cache
            .get_or_compute(&key, || self.dashboard.compose(company_id, year, horizon))
            .await
    }

    pub async fn get_historical(
        &self,
        company_id: &str,
        start_year: i32,
        end_year: i32,
        horizon: Horizon,
    ) -> Result<HistoricalView, AnalysisError> {
        let key = self.cache.historical_key(company_id, start_year, end_year, horizon);
        self.cache
            .get_or_compute(&key, || {
                self.historical.build(company_id, start_year, end_year, horizon)
            })
            .await
    }

    /// Primary and reclassified benchmarks for a company.
    pub async fn get_benchmarks(
        &self,
        company_id: &str,
        year: i32,
        horizon: Horizon,
    ) -> Result<BenchmarkPair, AnalysisError> {
        let key = self.cache.benchmark_key(company_id, year, horizon);
        self.cache
            .get_or_compute(&key, || self.benchmarks.get(company_id, year, horizon))
            .await
    }

    /// Recompute every sector benchmark of `year`, then drop the cached
    /// benchmark pairs of that year together with the dashboards and
    /// historical views built on them.
    pub async fn recompute_benchmarks(
        &self,
        year: i32,
        horizon: Option<Horizon>,
    ) -> Result<BatchReport, AnalysisError> {
        let report = self.benchmarks.recompute(year, horizon).await?;
        if report.written > 0 {
            self.cache.invalidate_benchmarks(year).await?;
        }
        Ok(report)
    }

    /// Forecast for the current calendar year.
    pub async fn recompute_forecast(&self, company_id: &str) -> Result<ForecastEstimate, AnalysisError> {
        self.recompute_forecast_for(company_id, Utc::now().year()).await
    }

    pub async fn recompute_forecast_for(
        &self,
        company_id: &str,
        year: i32,
    ) -> Result<ForecastEstimate, AnalysisError> {
        self.forecasts.recompute(company_id, year).await
    }

    pub async fn invalidate_cache(
        &self,
        company_id: &str,
        year: Option<i32>,
    ) -> Result<Invalidation, AnalysisError> {
        self.cache.invalidate(company_id, year).await
    }

    pub async fn invalidate_benchmark_cache(&self, year: i32) -> Result<Invalidation, AnalysisError> {
        self.cache.invalidate_benchmarks(year).await
    }
}
