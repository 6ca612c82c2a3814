use async_trait::async_trait;
use std::time::Duration;

use crate::{
    AnalysisError, CompanyClassification, FinancialStatement, ForecastEstimate, Horizon,
    QuarterlyResult, SectorBenchmark, SectorRef, Taxonomy,
};

/// Read side of the statement/reference-data collaborator.
#[async_trait]
pub trait StatementSource: Send + Sync {
    async fn get_statement(
        &self,
        company_id: &str,
        year: i32,
    ) -> Result<Option<FinancialStatement>, AnalysisError>;

    async fn get_classification(
        &self,
        company_id: &str,
    ) -> Result<Option<CompanyClassification>, AnalysisError>;

    /// Companies of the sector that have a statement for `year`.
    async fn list_companies_in_sector(
        &self,
        sector: &SectorRef,
        year: i32,
    ) -> Result<Vec<String>, AnalysisError>;

    async fn list_sectors(&self, taxonomy: Taxonomy) -> Result<Vec<String>, AnalysisError>;

    async fn get_quarterly_results(
        &self,
        company_id: &str,
        year: i32,
    ) -> Result<Vec<QuarterlyResult>, AnalysisError>;
}

/// Persistence for computed sector benchmarks.
#[async_trait]
pub trait BenchmarkStore: Send + Sync {
    async fn save_benchmark(&self, benchmark: SectorBenchmark) -> Result<(), AnalysisError>;

    async fn get_benchmark(
        &self,
        sector: &SectorRef,
        year: i32,
        horizon: Horizon,
    ) -> Result<Option<SectorBenchmark>, AnalysisError>;
}

/// Persistence for the single current forecast of each company.
#[async_trait]
pub trait ForecastStore: Send + Sync {
    async fn save_forecast(&self, estimate: ForecastEstimate) -> Result<(), AnalysisError>;

    async fn get_forecast(&self, company_id: &str) -> Result<Option<ForecastEstimate>, AnalysisError>;
}

/// Outcome of a prefix deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixDelete {
    /// Number of keys removed
    Deleted(usize),
    /// The store cannot enumerate keys by prefix
    Unsupported,
}

/// Key/value store backing the cache layer.
///
/// `delete_by_prefix` is optional. Stores that cannot scan keys keep the
/// default, and callers fall back to `flush`, which clears the whole
/// namespace.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, AnalysisError>;

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<(), AnalysisError>;

    async fn delete(&self, key: &str) -> Result<(), AnalysisError>;

    async fn delete_by_prefix(&self, _prefix: &str) -> Result<PrefixDelete, AnalysisError> {
        Ok(PrefixDelete::Unsupported)
    }

    async fn flush(&self) -> Result<(), AnalysisError>;
}
