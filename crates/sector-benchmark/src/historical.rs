//! Multi-year indicator series for one company, next to its sector averages.

use std::collections::BTreeSet;

use analysis_core::stats;
use analysis_core::{
    AnalysisError, BenchmarkPair, Category, CategoryMap, Horizon, IndicatorSet, SectorBenchmark,
    Taxonomy,
};
use serde::{Deserialize, Serialize};

use crate::aggregator::MetricAggregator;
use crate::service::BenchmarkService;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearValue {
    pub year: i32,
    pub value: Option<f64>,
}

/// One indicator across the requested window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub name: String,
    /// Descending by year; years without a statement are absent
    pub values: Vec<YearValue>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    /// Primary-taxonomy benchmark mean, averaged over years that had one
    pub sector_primary: Option<f64>,
    /// Reclassified-taxonomy benchmark mean, averaged over years that had one
    pub sector_reclassified: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalCategory {
    pub indicators: Vec<IndicatorRow>,
    pub average: Option<IndicatorRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalView {
    pub company_id: String,
    pub start_year: i32,
    pub end_year: i32,
    pub horizon: Horizon,
    /// Years that had a statement, descending
    pub years: Vec<i32>,
    pub categories: CategoryMap<HistoricalCategory>,
}

/// Indicators and benchmarks of a single year of the window.
struct YearSlice {
    set: IndicatorSet,
    benchmarks: BenchmarkPair,
}

#[derive(Clone)]
pub struct HistoricalSeriesBuilder {
    aggregator: MetricAggregator,
    benchmarks: BenchmarkService,
}

impl HistoricalSeriesBuilder {
    pub fn new(aggregator: MetricAggregator, benchmarks: BenchmarkService) -> Self {
        Self {
            aggregator,
            benchmarks,
        }
    }

    /// Build the series for the inclusive range between `start_year` and
    /// `end_year`, in either order. The result is complete or an error;
    /// one failing year fails the whole view.
    pub async fn build(
        &self,
        company_id: &str,
        start_year: i32,
        end_year: i32,
        horizon: Horizon,
    ) -> Result<HistoricalView, AnalysisError> {
        let (low, high) = (start_year.min(end_year), start_year.max(end_year));
        let mut slices = Vec::new();

        match self.aggregator.source().get_classification(company_id).await? {
            Some(company) => {
                for year in (low..=high).rev() {
                    if let Some(set) = self.aggregator.company_indicators(&company, year).await? {
                        let benchmarks = self.benchmarks.get_for(&company, year, horizon).await?;
                        slices.push(YearSlice { set, benchmarks });
                    }
                }
            }
            None => tracing::warn!("Historical view requested for unknown company {}", company_id),
        }

        tracing::debug!(
            "Historical view {} {}..={}: {} years with statements",
            company_id,
            low,
            high,
            slices.len()
        );

        Ok(HistoricalView {
            company_id: company_id.to_string(),
            start_year: low,
            end_year: high,
            horizon,
            years: slices.iter().map(|s| s.set.year).collect(),
            categories: CategoryMap::from_fn(|category| build_category(&slices, category)),
        })
    }
}

fn build_category(slices: &[YearSlice], category: Category) -> HistoricalCategory {
    if slices.is_empty() {
        return HistoricalCategory::default();
    }

    let names: BTreeSet<&String> = slices
        .iter()
        .flat_map(|s| s.set.category(category).values.keys())
        .collect();

    let indicators = names
        .into_iter()
        .map(|name| {
            build_row(
                name,
                slices,
                |s| s.set.category(category).value(name),
                |b| b.mean_of(category, name),
            )
        })
        .collect();

    let average = build_row(
        "average",
        slices,
        |s| s.set.category(category).average,
        |b| b.categories.get(category).average.map(|stat| stat.mean),
    );

    HistoricalCategory {
        indicators,
        average: Some(average),
    }
}

fn build_row(
    name: &str,
    slices: &[YearSlice],
    value: impl Fn(&YearSlice) -> Option<f64>,
    benchmark_mean: impl Fn(&SectorBenchmark) -> Option<f64>,
) -> IndicatorRow {
    let values: Vec<YearValue> = slices
        .iter()
        .map(|s| YearValue {
            year: s.set.year,
            value: value(s),
        })
        .collect();
    let present: Vec<f64> = values.iter().filter_map(|v| v.value).collect();

    let side_average = |taxonomy: Taxonomy| {
        let means: Vec<f64> = slices
            .iter()
            .filter_map(|s| s.benchmarks.side(taxonomy).and_then(&benchmark_mean))
            .collect();
        stats::mean(&means)
    };

    IndicatorRow {
        name: name.to_string(),
        mean: stats::mean(&present),
        // Population deviation of the window; a single year deviates by zero
        std_dev: stats::population_std_dev(&present),
        sector_primary: side_average(Taxonomy::Primary),
        sector_reclassified: side_average(Taxonomy::Reclassified),
        values,
    }
}
