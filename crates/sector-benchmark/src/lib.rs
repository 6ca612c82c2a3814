//! Sector Benchmarks
//!
//! Pools company indicators into per-sector statistics under both sector
//! taxonomies, and builds the historical and dashboard views that compare a
//! company against those statistics.

pub mod aggregator;
pub mod dashboard;
pub mod historical;
pub mod service;

pub use aggregator::{AggregationOutcome, BatchError, MetricAggregator, SectorAggregation, SectorStatistics};
pub use dashboard::{CategoryComparison, DashboardComposer, DashboardView, IndicatorComparison, StatementExcerpt};
pub use historical::{HistoricalCategory, HistoricalSeriesBuilder, HistoricalView, IndicatorRow, YearValue};
pub use service::{BatchReport, BenchmarkService};
