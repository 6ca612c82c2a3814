use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use analysis_core::{
    AnalysisError, BenchmarkStore, CalculatorKind, Category, CompanyClassification, DataResult,
    DividendMethod, FinancialStatement, ForecastStore, Horizon, NetIncomeSource, QuarterlyResult,
    SectorRef, StatementSource, Taxonomy,
};
use approx::assert_abs_diff_eq;
use async_trait::async_trait;
use fundamental_analysis::names;
use sector_benchmark::{HistoricalView, IndicatorRow};

use crate::*;

/// Helper: a company in `primary` / `reclassified`.
fn company(id: &str, primary: &str, reclassified: &str, financial: bool) -> CompanyClassification {
    CompanyClassification {
        company_id: id.to_string(),
        name: Some(format!("{} SA", id)),
        primary_sector: Some(primary.to_string()),
        reclassified_sector: Some(reclassified.to_string()),
        is_financial_institution: financial,
    }
}

/// Helper: a fully populated statement; only revenue and net income vary.
fn statement(id: &str, year: i32, revenue: f64, net_income: f64) -> FinancialStatement {
    FinancialStatement {
        company_id: id.to_string(),
        fiscal_year: year,
        total_assets: Some(1200.0),
        equity: Some(500.0),
        total_debt: Some(200.0),
        client_credits: Some(800.0),
        client_deposits: Some(900.0),
        revenue: Some(revenue),
        ebit: Some(revenue * 0.15),
        ebitda: Some(revenue * 0.2),
        net_income: Some(net_income),
        share_count: Some(1_000_000.0),
        closing_price: Some(750.0),
        gross_dividends: Some(60.0),
        ..Default::default()
    }
}

/// Helper: the reference company-year and its predecessor.
fn reference_statements() -> Vec<FinancialStatement> {
    let current = FinancialStatement {
        company_id: "ACME".to_string(),
        fiscal_year: 2024,
        revenue: Some(1000.0),
        ebit: Some(150.0),
        ebitda: Some(200.0),
        net_income: Some(80.0),
        equity: Some(500.0),
        total_assets: Some(1200.0),
        share_count: Some(1_000_000.0),
        closing_price: Some(750.0),
        gross_dividends: Some(60.0),
        ..Default::default()
    };
    let previous = FinancialStatement {
        company_id: "ACME".to_string(),
        fiscal_year: 2023,
        revenue: Some(900.0),
        ebit: Some(140.0),
        net_income: Some(70.0),
        ..Default::default()
    };
    vec![current, previous]
}

/// Helper: five industrial companies with net margins 5..9% in 2024.
fn five_company_dataset() -> Dataset {
    let ids = ["IND1", "IND2", "IND3", "IND4", "IND5"];
    Dataset {
        companies: ids
            .iter()
            .map(|id| company(id, "industry", "capital_goods", false))
            .collect(),
        statements: ids
            .iter()
            .zip([50.0, 60.0, 70.0, 80.0, 90.0])
            .map(|(id, ni)| statement(id, 2024, 1000.0, ni))
            .collect(),
        quarters: vec![],
    }
}

/// Statement source that counts classification lookups, one per composed view.
struct CountingSource {
    inner: MemoryStatementSource,
    classification_reads: AtomicUsize,
}

impl CountingSource {
    fn new(dataset: Dataset) -> Self {
        Self {
            inner: MemoryStatementSource::from_dataset(dataset),
            classification_reads: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.classification_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatementSource for CountingSource {
    async fn get_statement(
        &self,
        company_id: &str,
        year: i32,
    ) -> Result<Option<FinancialStatement>, AnalysisError> {
        self.inner.get_statement(company_id, year).await
    }

    async fn get_classification(
        &self,
        company_id: &str,
    ) -> Result<Option<CompanyClassification>, AnalysisError> {
        self.classification_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_classification(company_id).await
    }

    async fn list_companies_in_sector(
        &self,
        sector: &SectorRef,
        year: i32,
    ) -> Result<Vec<String>, AnalysisError> {
        self.inner.list_companies_in_sector(sector, year).await
    }

    async fn list_sectors(&self, taxonomy: Taxonomy) -> Result<Vec<String>, AnalysisError> {
        self.inner.list_sectors(taxonomy).await
    }

    async fn get_quarterly_results(
        &self,
        company_id: &str,
        year: i32,
    ) -> Result<Vec<QuarterlyResult>, AnalysisError> {
        self.inner.get_quarterly_results(company_id, year).await
    }
}

struct Harness {
    orchestrator: AnalysisOrchestrator,
    source: Arc<CountingSource>,
    benchmarks: Arc<MemoryBenchmarkStore>,
    forecasts: Arc<MemoryForecastStore>,
}

/// Helper: orchestrator over `dataset` with the given tunables and cache.
fn build_harness(dataset: Dataset, config: EngineConfig, cache: Arc<MemoryCacheStore>) -> Harness {
    let source = Arc::new(CountingSource::new(dataset));
    let benchmarks = Arc::new(MemoryBenchmarkStore::new());
    let forecasts = Arc::new(MemoryForecastStore::new());
    let orchestrator = AnalysisOrchestrator::new(
        config,
        source.clone(),
        benchmarks.clone(),
        forecasts.clone(),
        cache,
    );
    Harness {
        orchestrator,
        source,
        benchmarks,
        forecasts,
    }
}

fn harness_with_cache(dataset: Dataset, cache: Arc<MemoryCacheStore>) -> Harness {
    build_harness(dataset, EngineConfig::default(), cache)
}

fn harness(dataset: Dataset) -> Harness {
    harness_with_cache(dataset, Arc::new(MemoryCacheStore::new()))
}

fn net_margin_row(view: &HistoricalView) -> &IndicatorRow {
    view.categories
        .get(Category::Profitability)
        .indicators
        .iter()
        .find(|r| r.name == names::NET_MARGIN)
        .expect("net margin row")
}

#[tokio::test]
async fn test_reference_company_indicators() {
    let h = harness(Dataset {
        companies: vec![company("ACME", "industry", "capital_goods", false)],
        statements: reference_statements(),
        quarters: vec![],
    });

    let result = h.orchestrator.compute_indicators("ACME", 2024).await.unwrap();
    let set = result.available().expect("indicators for 2024");

    assert_eq!(set.kind, CalculatorKind::Standard);
    assert!(set.has_previous);
    let value = |c: Category, n: &str| set.value(c, n).unwrap();
    assert_abs_diff_eq!(value(Category::Profitability, names::NET_MARGIN), 8.00, epsilon = 0.005);
    assert_abs_diff_eq!(value(Category::Profitability, names::ROE), 16.00, epsilon = 0.005);
    assert_abs_diff_eq!(value(Category::Profitability, names::ROA), 6.67, epsilon = 0.005);
    assert_abs_diff_eq!(value(Category::Growth, names::REVENUE_GROWTH), 11.11, epsilon = 0.005);
    assert_abs_diff_eq!(value(Category::Growth, names::NET_INCOME_GROWTH), 14.29, epsilon = 0.005);
    assert_abs_diff_eq!(value(Category::ShareholderReturn, names::DIVIDEND_PER_SHARE), 52.80, epsilon = 0.005);
    assert_abs_diff_eq!(value(Category::ShareholderReturn, names::DIVIDEND_YIELD), 7.04, epsilon = 0.005);
}

#[tokio::test]
async fn test_missing_year_is_no_data() {
    let h = harness(Dataset {
        companies: vec![company("ACME", "industry", "capital_goods", false)],
        statements: reference_statements(),
        quarters: vec![],
    });

    let indicators = h.orchestrator.compute_indicators("ACME", 2030).await.unwrap();
    assert!(!indicators.is_available());

    match h.orchestrator.get_dashboard("NOPE", 2024, Horizon::Short).await.unwrap() {
        DataResult::NoData(no_data) => assert_eq!(no_data.company_id, "NOPE"),
        DataResult::Available(_) => panic!("unknown company must not produce a dashboard"),
    }
}

#[tokio::test]
async fn test_five_company_benchmark_population_stats() {
    let h = harness(five_company_dataset());

    let report = h.orchestrator.recompute_benchmarks(2024, None).await.unwrap();
    // One sector per taxonomy, three horizons each
    assert_eq!(report.written, 6);
    assert_eq!(report.skipped, 0);
    assert!(report.errors.is_empty());
    assert_eq!(h.benchmarks.len(), 6);

    let sector = SectorRef::Primary("industry".to_string());
    let benchmark = h
        .benchmarks
        .get_benchmark(&sector, 2024, Horizon::Medium)
        .await
        .unwrap()
        .expect("benchmark persisted");
    assert_eq!(benchmark.sample_size, 5);
    assert_eq!(benchmark.kind, CalculatorKind::Standard);

    let stat = benchmark
        .categories
        .get(Category::Profitability)
        .indicators
        .get(names::NET_MARGIN)
        .copied()
        .expect("net margin pooled");
    assert_abs_diff_eq!(stat.mean, 7.0, epsilon = 1e-9);
    // Divisor N: sqrt(10 / 5), not sqrt(10 / 4)
    assert_abs_diff_eq!(stat.std_dev.unwrap(), 2.0_f64.sqrt(), epsilon = 1e-9);
    assert_eq!(stat.count, 5);

    // Horizons share the same statistics
    let long = h
        .benchmarks
        .get_benchmark(&sector, 2024, Horizon::Long)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(long.mean_of(Category::Profitability, names::NET_MARGIN), benchmark.mean_of(Category::Profitability, names::NET_MARGIN));
}

#[tokio::test]
async fn test_small_sector_is_never_persisted() {
    let mut dataset = five_company_dataset();
    dataset.companies.truncate(2);

    let h = harness(dataset);
    let report = h.orchestrator.recompute_benchmarks(2024, Some(Horizon::Short)).await.unwrap();

    assert_eq!(report.written, 0);
    // Primary and reclassified sector, one horizon each
    assert_eq!(report.skipped, 2);
    assert!(h.benchmarks.is_empty());
}

#[tokio::test]
async fn test_empty_sector_is_never_persisted_even_without_minimum() {
    let mut dataset = five_company_dataset();
    dataset.statements.clear();
    let config = EngineConfig {
        min_sample_size: 0,
        ..Default::default()
    };

    let h = build_harness(dataset, config, Arc::new(MemoryCacheStore::new()));
    let report = h.orchestrator.recompute_benchmarks(2024, Some(Horizon::Short)).await.unwrap();

    assert_eq!(report.written, 0);
    assert_eq!(report.skipped, 2);
    assert!(h.benchmarks.is_empty());
}

#[tokio::test]
async fn test_company_failure_does_not_abort_batch() {
    let mut dataset = five_company_dataset();
    dataset.companies.push(company("BROKEN", "industry", "capital_goods", false));
    dataset.statements.push(FinancialStatement {
        company_id: "BROKEN".to_string(),
        fiscal_year: 2024,
        ..Default::default()
    });

    let h = harness(dataset);
    let report = h.orchestrator.recompute_benchmarks(2024, None).await.unwrap();

    assert_eq!(report.written, 6);
    // Once per taxonomy
    assert_eq!(report.error_count(), 2);
    assert!(report
        .errors
        .iter()
        .all(|e| e.company_id.as_deref() == Some("BROKEN")));

    let benchmark = h
        .benchmarks
        .get_benchmark(&SectorRef::Reclassified("capital_goods".to_string()), 2024, Horizon::Short)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(benchmark.sample_size, 5);
}

#[tokio::test]
async fn test_minority_calculator_variant_is_excluded() {
    let mut dataset = Dataset::default();
    for (id, financial, ni) in [
        ("BANK1", true, 40.0),
        ("BANK2", true, 50.0),
        ("BANK3", true, 60.0),
        ("INSURER", false, 90.0),
    ] {
        dataset.companies.push(company(id, "banks", "lenders", financial));
        dataset.statements.push(statement(id, 2024, 1000.0, ni));
    }

    let h = harness(dataset);
    let report = h.orchestrator.recompute_benchmarks(2024, Some(Horizon::Long)).await.unwrap();
    assert_eq!(report.written, 2);

    let benchmark = h
        .benchmarks
        .get_benchmark(&SectorRef::Primary("banks".to_string()), 2024, Horizon::Long)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(benchmark.kind, CalculatorKind::FinancialInstitution);
    assert_eq!(benchmark.sample_size, 3);
    assert_abs_diff_eq!(
        benchmark.mean_of(Category::Profitability, names::NET_MARGIN).unwrap(),
        5.0,
        epsilon = 1e-9
    );
    assert!(benchmark
        .categories
        .get(Category::Solidity)
        .indicators
        .contains_key(names::CREDITS_TO_DEPOSITS));
}

#[tokio::test]
async fn test_dashboard_compares_against_sector() {
    let h = harness(five_company_dataset());
    h.orchestrator.recompute_benchmarks(2024, None).await.unwrap();

    let view = h
        .orchestrator
        .get_dashboard("IND3", 2024, Horizon::Short)
        .await
        .unwrap()
        .available()
        .expect("dashboard for IND3");

    assert_eq!(view.company_name.as_deref(), Some("IND3 SA"));
    assert!(view.benchmarks.primary.is_some());
    assert!(view.benchmarks.reclassified.is_some());

    let margin = view
        .comparisons
        .get(Category::Profitability)
        .indicators
        .iter()
        .find(|c| c.name == names::NET_MARGIN)
        .expect("net margin comparison");
    assert_abs_diff_eq!(margin.sector_primary.unwrap(), 7.0, epsilon = 1e-9);
    assert_abs_diff_eq!(margin.primary_z_score.unwrap(), 0.0, epsilon = 1e-9);
    assert_eq!(view.statement.income_statement.get("revenue"), Some(&Some(1000.0)));
}

#[tokio::test]
async fn test_dashboard_is_memoized_until_invalidated() {
    let h = harness(five_company_dataset());

    let first = h.orchestrator.get_dashboard("IND1", 2024, Horizon::Short).await.unwrap();
    let second = h.orchestrator.get_dashboard("IND1", 2024, Horizon::Short).await.unwrap();
    assert!(first.is_available() && second.is_available());
    assert_eq!(h.source.reads(), 1);
    assert_eq!(h.orchestrator.cache_stats(), CacheStats { hits: 1, misses: 1 });

    let outcome = h.orchestrator.invalidate_cache("IND1", None).await.unwrap();
    assert_eq!(outcome.deleted, 1);
    assert!(!outcome.flushed);

    h.orchestrator.get_dashboard("IND1", 2024, Horizon::Short).await.unwrap();
    assert_eq!(h.source.reads(), 2);
}

#[tokio::test]
async fn test_benchmark_recompute_refreshes_cached_views() {
    let h = harness(five_company_dataset());

    let stale = h
        .orchestrator
        .get_dashboard("IND1", 2024, Horizon::Short)
        .await
        .unwrap()
        .available()
        .unwrap();
    assert!(stale.benchmarks.primary.is_none());
    let stale_series = h
        .orchestrator
        .get_historical("IND1", 2023, 2024, Horizon::Short)
        .await
        .unwrap();
    assert_eq!(net_margin_row(&stale_series).sector_primary, None);

    h.orchestrator.recompute_benchmarks(2024, None).await.unwrap();

    let fresh = h
        .orchestrator
        .get_dashboard("IND1", 2024, Horizon::Short)
        .await
        .unwrap()
        .available()
        .unwrap();
    assert_eq!(fresh.benchmarks.primary.as_ref().map(|b| b.sample_size), Some(5));
    let fresh_series = h
        .orchestrator
        .get_historical("IND1", 2023, 2024, Horizon::Short)
        .await
        .unwrap();
    assert_abs_diff_eq!(net_margin_row(&fresh_series).sector_primary.unwrap(), 7.0, epsilon = 1e-9);
}

#[tokio::test]
async fn test_invalidation_falls_back_to_flush() {
    let h = harness_with_cache(
        five_company_dataset(),
        Arc::new(MemoryCacheStore::without_prefix_scan()),
    );

    h.orchestrator.get_dashboard("IND1", 2024, Horizon::Short).await.unwrap();
    h.orchestrator.get_dashboard("IND2", 2024, Horizon::Short).await.unwrap();
    assert_eq!(h.source.reads(), 2);

    let outcome = h.orchestrator.invalidate_cache("IND1", Some(2024)).await.unwrap();
    assert!(outcome.flushed);

    // The flush also dropped the unrelated IND2 entry
    h.orchestrator.get_dashboard("IND2", 2024, Horizon::Short).await.unwrap();
    assert_eq!(h.source.reads(), 3);
}

#[tokio::test]
async fn test_benchmark_recompute_refreshes_cached_pairs() {
    let h = harness(five_company_dataset());

    let before = h.orchestrator.get_benchmarks("IND1", 2024, Horizon::Short).await.unwrap();
    assert!(before.primary.is_none());

    h.orchestrator.recompute_benchmarks(2024, None).await.unwrap();

    let after = h.orchestrator.get_benchmarks("IND1", 2024, Horizon::Short).await.unwrap();
    assert_eq!(after.primary.map(|b| b.sample_size), Some(5));
}

#[tokio::test]
async fn test_historical_omits_missing_years() {
    let mut dataset = Dataset {
        companies: vec![company("ACME", "industry", "capital_goods", false)],
        ..Default::default()
    };
    for (year, ni) in [(2020, 60.0), (2021, 65.0), (2023, 70.0), (2024, 80.0)] {
        dataset.statements.push(statement("ACME", year, 1000.0, ni));
    }

    let h = harness(dataset);
    let view = h
        .orchestrator
        .get_historical("ACME", 2021, 2024, Horizon::Medium)
        .await
        .unwrap();

    assert_eq!(view.years, vec![2024, 2023, 2021]);
    let margin = net_margin_row(&view);
    let years: Vec<i32> = margin.values.iter().map(|v| v.year).collect();
    assert_eq!(years, vec![2024, 2023, 2021]);
    assert_abs_diff_eq!(margin.mean.unwrap(), (8.0 + 7.0 + 6.5) / 3.0, epsilon = 1e-9);
    assert_eq!(margin.sector_primary, None);

    // 2023 has no predecessor in the dataset, 2021 has 2020
    let growth = view
        .categories
        .get(Category::Growth)
        .indicators
        .iter()
        .find(|r| r.name == names::NET_INCOME_GROWTH)
        .expect("net income growth row");
    assert_eq!(growth.values[1].value, None);
    assert!(growth.values[2].value.is_some());
}

#[tokio::test]
async fn test_historical_sector_means_skip_years_without_benchmark() {
    // Peers share only the primary sector; each sits alone in its reclassified one
    let mut dataset = Dataset {
        companies: vec![
            company("ACME", "industry", "machines", false),
            company("PEER1", "industry", "tools", false),
            company("PEER2", "industry", "engines", false),
        ],
        ..Default::default()
    };
    for (year, ni) in [(2022, 60.0), (2023, 70.0), (2024, 80.0)] {
        dataset.statements.push(statement("ACME", year, 1000.0, ni));
    }
    for (id, year, ni) in [
        ("PEER1", 2023, 50.0),
        ("PEER2", 2023, 90.0),
        ("PEER1", 2024, 100.0),
        ("PEER2", 2024, 120.0),
    ] {
        dataset.statements.push(statement(id, year, 1000.0, ni));
    }

    let h = harness(dataset);
    for year in 2022..=2024 {
        h.orchestrator.recompute_benchmarks(year, None).await.unwrap();
    }
    // 2022 has a single member, so only 2023 and 2024 carry a benchmark
    assert_eq!(h.benchmarks.len(), 6);

    let view = h
        .orchestrator
        .get_historical("ACME", 2022, 2024, Horizon::Medium)
        .await
        .unwrap();
    assert_eq!(view.years, vec![2024, 2023, 2022]);
    let margin = net_margin_row(&view);

    // Sector means 7 (2023) and 10 (2024)
    assert_abs_diff_eq!(margin.sector_primary.unwrap(), 8.5, epsilon = 1e-9);
    assert_eq!(margin.sector_reclassified, None);
}

#[tokio::test]
async fn test_single_year_window_has_zero_deviation() {
    let h = harness(Dataset {
        companies: vec![company("ACME", "industry", "capital_goods", false)],
        statements: reference_statements(),
        quarters: vec![],
    });

    let view = h
        .orchestrator
        .get_historical("ACME", 2024, 2024, Horizon::Short)
        .await
        .unwrap();
    let margin = net_margin_row(&view);
    assert_abs_diff_eq!(margin.mean.unwrap(), 8.0, epsilon = 1e-9);
    assert_eq!(margin.std_dev, Some(0.0));
}

#[tokio::test]
async fn test_forecast_uses_reported_net_income() {
    let h = harness(Dataset {
        companies: vec![company("ACME", "industry", "capital_goods", false)],
        statements: reference_statements(),
        quarters: vec![],
    });

    let estimate = h.orchestrator.recompute_forecast_for("ACME", 2024).await.unwrap();
    assert_eq!(estimate.net_income, Some(80.0));
    assert_eq!(estimate.net_income_source, NetIncomeSource::Reported);
    assert!(h.forecasts.get_forecast("ACME").await.unwrap().is_some());
}

#[tokio::test]
async fn test_forecast_blends_quarters_and_history() {
    let mut dataset = Dataset {
        companies: vec![company("ACME", "industry", "capital_goods", false)],
        ..Default::default()
    };
    for year in 2021..=2024 {
        dataset.statements.push(statement("ACME", year, 1000.0, 100.0));
    }
    for quarter in 1..=3 {
        for (year, ni) in [(2024, 25.0), (2025, 30.0)] {
            dataset.quarters.push(QuarterlyResult {
                company_id: "ACME".to_string(),
                year,
                quarter,
                net_income: Some(ni),
            });
        }
    }

    let h = harness(dataset);
    let estimate = h.orchestrator.recompute_forecast_for("ACME", 2025).await.unwrap();

    // 0.3 * (100 * 1.2) + 0.7 * 100
    assert_eq!(estimate.net_income_source, NetIncomeSource::Blended);
    assert_abs_diff_eq!(estimate.net_income.unwrap(), 106.0, epsilon = 1e-9);
}

#[tokio::test]
async fn test_forecast_picks_the_stabler_dividend_series() {
    let mut dataset = Dataset {
        companies: vec![
            company("STEADYDPS", "industry", "capital_goods", false),
            company("STEADYPAYOUT", "industry", "capital_goods", false),
        ],
        ..Default::default()
    };
    for (year, ni) in [(2019, 50.0), (2020, 100.0), (2021, 70.0), (2022, 90.0), (2023, 60.0)] {
        let mut flat_dividend = statement("STEADYDPS", year, 1000.0, ni);
        flat_dividend.gross_dividends = Some(40.0);
        dataset.statements.push(flat_dividend);

        let mut half_payout = statement("STEADYPAYOUT", year, 1000.0, ni);
        half_payout.gross_dividends = Some(ni * 0.5);
        dataset.statements.push(half_payout);
    }

    let h = harness(dataset);

    let dps = h.orchestrator.recompute_forecast_for("STEADYDPS", 2024).await.unwrap();
    assert_eq!(dps.dividend_method, Some(DividendMethod::DividendPerShare));
    // 35.2 * 1.10 * (1 - 0.15)
    assert_abs_diff_eq!(dps.net_dividend_per_share, 32.912, epsilon = 1e-9);

    let payout = h.orchestrator.recompute_forecast_for("STEADYPAYOUT", 2024).await.unwrap();
    assert_eq!(payout.dividend_method, Some(DividendMethod::PayoutRatio));
    // 0.5 * 60m * (1 - 0.15) / 1m shares
    assert_abs_diff_eq!(payout.net_dividend_per_share, 25.5, epsilon = 1e-9);
}
