//! Benchmark recomputation over taxonomies, sectors and horizons.

use std::sync::Arc;

use analysis_core::{
    AnalysisError, BenchmarkPair, BenchmarkStore, CompanyClassification, Horizon, SectorRef,
    Taxonomy,
};
use serde::{Deserialize, Serialize};

use crate::aggregator::{AggregationOutcome, BatchError, MetricAggregator};

/// Summary of one recomputation batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub year: i32,
    /// Benchmarks persisted, one per (sector, horizon)
    pub written: usize,
    /// (sector, horizon) pairs that did not reach the minimum sample
    pub skipped: usize,
    pub errors: Vec<BatchError>,
}

impl BatchReport {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            ..Default::default()
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

#[derive(Clone)]
pub struct BenchmarkService {
    aggregator: MetricAggregator,
    store: Arc<dyn BenchmarkStore>,
    horizons: Vec<Horizon>,
}

impl BenchmarkService {
    pub fn new(
        aggregator: MetricAggregator,
        store: Arc<dyn BenchmarkStore>,
        horizons: Vec<Horizon>,
    ) -> Self {
        Self {
            aggregator,
            store,
            horizons,
        }
    }

    pub fn aggregator(&self) -> &MetricAggregator {
        &self.aggregator
    }

    pub fn horizons(&self) -> &[Horizon] {
        &self.horizons
    }

    /// Recompute every sector of both taxonomies for `year`, for one horizon
    /// or all configured ones.
    ///
    /// The horizon does not change the aggregation inputs, so each sector is
    /// pooled once and the same statistics are written under every horizon.
    /// Company and sector failures land in the report; only a failure to
    /// list a taxonomy's sectors is returned as an error.
    pub async fn recompute(
        &self,
        year: i32,
        horizon: Option<Horizon>,
    ) -> Result<BatchReport, AnalysisError> {
        let horizons: Vec<Horizon> = match horizon {
            Some(h) => vec![h],
            None => self.horizons.clone(),
        };
        let mut report = BatchReport::new(year);

        tracing::info!(
            "Recomputing sector benchmarks for {} (horizons: {:?})",
            year,
            horizons
        );

        for taxonomy in Taxonomy::ALL {
            let sectors = self.aggregator.source().list_sectors(taxonomy).await?;
            for sector_id in sectors {
                let sector = SectorRef::new(taxonomy, sector_id);
                self.recompute_sector(&sector, year, &horizons, &mut report).await;
            }
        }

        tracing::info!(
            "Benchmarks {}: {} written, {} skipped, {} errors",
            year,
            report.written,
            report.skipped,
            report.error_count()
        );
        Ok(report)
    }

    async fn recompute_sector(
        &self,
        sector: &SectorRef,
        year: i32,
        horizons: &[Horizon],
        report: &mut BatchReport,
    ) {
        let aggregation = match self.aggregator.aggregate_sector(sector, year).await {
            Ok(a) => a,
            Err(e) => {
                tracing::error!("Aggregation of {} {} failed: {}", sector, year, e);
                report.errors.push(BatchError::sector(sector, &e));
                report.skipped += horizons.len();
                return;
            }
        };
        report.errors.extend(aggregation.failures);

        match aggregation.outcome {
            AggregationOutcome::Pooled(stats) => {
                for &horizon in horizons {
                    let benchmark = stats.to_benchmark(sector, year, horizon);
                    match self.store.save_benchmark(benchmark).await {
                        Ok(()) => {
                            tracing::debug!("Saved benchmark {} {} {}", sector, year, horizon);
                            report.written += 1;
                        }
                        Err(e) => {
                            tracing::error!("Saving benchmark {} {} {} failed: {}", sector, year, horizon, e);
                            report.errors.push(BatchError::sector(sector, &e));
                        }
                    }
                }
            }
            AggregationOutcome::InsufficientSample { .. } => {
                report.skipped += horizons.len();
            }
        }
    }

    /// The primary and reclassified benchmarks applicable to a company.
    pub async fn get(
        &self,
        company_id: &str,
        year: i32,
        horizon: Horizon,
    ) -> Result<BenchmarkPair, AnalysisError> {
        match self.aggregator.source().get_classification(company_id).await? {
            Some(company) => self.get_for(&company, year, horizon).await,
            None => Ok(BenchmarkPair::default()),
        }
    }

    pub async fn get_for(
        &self,
        company: &CompanyClassification,
        year: i32,
        horizon: Horizon,
    ) -> Result<BenchmarkPair, AnalysisError> {
        let mut pair = BenchmarkPair::default();
        if let Some(sector) = company.sector(Taxonomy::Primary) {
            pair.primary = self.store.get_benchmark(&sector, year, horizon).await?;
        }
        if let Some(sector) = company.sector(Taxonomy::Reclassified) {
            pair.reclassified = self.store.get_benchmark(&sector, year, horizon).await?;
        }
        Ok(pair)
    }
}
