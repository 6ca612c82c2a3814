//! In-process implementations of the collaborator traits, used by the
//! data-loader binary and the tests.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use analysis_core::{
    AnalysisError, BenchmarkStore, CacheStore, CompanyClassification, FinancialStatement,
    ForecastEstimate, ForecastStore, Horizon, PrefixDelete, QuarterlyResult, SectorBenchmark,
    SectorRef, StatementSource, Taxonomy,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Everything a `MemoryStatementSource` is seeded from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub companies: Vec<CompanyClassification>,
    pub statements: Vec<FinancialStatement>,
    pub quarters: Vec<QuarterlyResult>,
}

impl Dataset {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::Store(format!("reading {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Default)]
pub struct MemoryStatementSource {
    companies: DashMap<String, CompanyClassification>,
    statements: DashMap<(String, i32), FinancialStatement>,
    quarters: DashMap<(String, i32), Vec<QuarterlyResult>>,
}

impl MemoryStatementSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let source = Self::new();
        for company in dataset.companies {
            source.upsert_company(company);
        }
        for statement in dataset.statements {
            source.upsert_statement(statement);
        }
        for quarter in dataset.quarters {
            source.add_quarter(quarter);
        }
        source
    }

    pub fn upsert_company(&self, company: CompanyClassification) {
        self.companies.insert(company.company_id.clone(), company);
    }

    pub fn upsert_statement(&self, statement: FinancialStatement) {
        self.statements
            .insert((statement.company_id.clone(), statement.fiscal_year), statement);
    }

    pub fn add_quarter(&self, quarter: QuarterlyResult) {
        let mut entry = self
            .quarters
            .entry((quarter.company_id.clone(), quarter.year))
            .or_default();
        entry.retain(|q| q.quarter != quarter.quarter);
        entry.push(quarter);
    }

    pub fn company_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.companies.iter().map(|c| c.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl StatementSource for MemoryStatementSource {
    async fn get_statement(
        &self,
        company_id: &str,
        year: i32,
    ) -> Result<Option<FinancialStatement>, AnalysisError> {
        Ok(self
            .statements
            .get(&(company_id.to_string(), year))
            .map(|s| s.value().clone()))
    }

    async fn get_classification(
        &self,
        company_id: &str,
    ) -> Result<Option<CompanyClassification>, AnalysisError> {
        Ok(self.companies.get(company_id).map(|c| c.value().clone()))
    }

    async fn list_companies_in_sector(
        &self,
        sector: &SectorRef,
        year: i32,
    ) -> Result<Vec<String>, AnalysisError> {
        let mut ids: Vec<String> = self
            .companies
            .iter()
            .filter(|c| c.value().in_sector(sector))
            .filter(|c| self.statements.contains_key(&(c.key().clone(), year)))
            .map(|c| c.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_sectors(&self, taxonomy: Taxonomy) -> Result<Vec<String>, AnalysisError> {
        let sectors: BTreeSet<String> = self
            .companies
            .iter()
            .filter_map(|c| c.value().sector(taxonomy))
            .map(|s| s.sector_id().to_string())
            .collect();
        Ok(sectors.into_iter().collect())
    }

    async fn get_quarterly_results(
        &self,
        company_id: &str,
        year: i32,
    ) -> Result<Vec<QuarterlyResult>, AnalysisError> {
        Ok(self
            .quarters
            .get(&(company_id.to_string(), year))
            .map(|q| q.value().clone())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryBenchmarkStore {
    benchmarks: DashMap<(SectorRef, i32, Horizon), SectorBenchmark>,
}

impl MemoryBenchmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }
}

#[async_trait]
impl BenchmarkStore for MemoryBenchmarkStore {
    async fn save_benchmark(&self, benchmark: SectorBenchmark) -> Result<(), AnalysisError> {
        let key = (benchmark.sector.clone(), benchmark.year, benchmark.horizon);
        self.benchmarks.insert(key, benchmark);
        Ok(())
    }

    async fn get_benchmark(
        &self,
        sector: &SectorRef,
        year: i32,
        horizon: Horizon,
    ) -> Result<Option<SectorBenchmark>, AnalysisError> {
        Ok(self
            .benchmarks
            .get(&(sector.clone(), year, horizon))
            .map(|b| b.value().clone()))
    }
}

#[derive(Default)]
pub struct MemoryForecastStore {
    forecasts: DashMap<String, ForecastEstimate>,
}

impl MemoryForecastStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ForecastStore for MemoryForecastStore {
    async fn save_forecast(&self, estimate: ForecastEstimate) -> Result<(), AnalysisError> {
        self.forecasts.insert(estimate.company_id.clone(), estimate);
        Ok(())
    }

    async fn get_forecast(&self, company_id: &str) -> Result<Option<ForecastEstimate>, AnalysisError> {
        Ok(self.forecasts.get(company_id).map(|f| f.value().clone()))
    }
}

/// Internal cache entry with timestamp
struct CacheEntry {
    data: serde_json::Value,
    cached_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        let age_ms = (Utc::now() - self.cached_at).num_milliseconds();
        age_ms >= 0 && (age_ms as u128) < self.ttl.as_millis()
    }
}

/// TTL cache on a `DashMap`. Prefix deletion can be switched off to behave
/// like a plain key/value store.
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
    prefix_scan: bool,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            prefix_scan: true,
        }
    }

    /// A store that reports prefix deletion as unsupported.
    pub fn without_prefix_scan() -> Self {
        Self {
            entries: DashMap::new(),
            prefix_scan: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.get(key).map_or(false, |e| e.is_fresh())
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, AnalysisError> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_fresh() => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), AnalysisError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                cached_at: Utc::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AnalysisError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<PrefixDelete, AnalysisError> {
        if !self.prefix_scan {
            return Ok(PrefixDelete::Unsupported);
        }
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        Ok(PrefixDelete::Deleted(keys.len()))
    }

    async fn flush(&self) -> Result<(), AnalysisError> {
        self.entries.clear();
        Ok(())
    }
}
