//! Per-company indicator runs and per-sector pooling.

use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::sync::Arc;

use analysis_core::{
    AnalysisError, BenchmarkCategory, CalculatorKind, Category, CategoryMap, CompanyClassification,
    DataResult, FinancialStatement, Horizon, IndicatorSet, IndicatorStat, NoDataResult,
    SectorBenchmark, SectorRef, StatementSource,
};
use chrono::Utc;
use fundamental_analysis::IndicatorCalculator;
use serde::{Deserialize, Serialize};

/// One company that could not be processed during a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchError {
    pub company_id: Option<String>,
    pub sector: Option<SectorRef>,
    pub message: String,
}

impl BatchError {
    pub fn company(company_id: &str, sector: &SectorRef, err: &AnalysisError) -> Self {
        Self {
            company_id: Some(company_id.to_string()),
            sector: Some(sector.clone()),
            message: err.to_string(),
        }
    }

    pub fn sector(sector: &SectorRef, err: &AnalysisError) -> Self {
        Self {
            company_id: None,
            sector: Some(sector.clone()),
            message: err.to_string(),
        }
    }
}

/// Pooled peer statistics, not yet bound to a horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorStatistics {
    pub kind: CalculatorKind,
    pub sample_size: usize,
    pub categories: CategoryMap<BenchmarkCategory>,
}

impl SectorStatistics {
    pub fn to_benchmark(&self, sector: &SectorRef, year: i32, horizon: Horizon) -> SectorBenchmark {
        SectorBenchmark {
            sector: sector.clone(),
            year,
            horizon,
            kind: self.kind,
            sample_size: self.sample_size,
            categories: self.categories.clone(),
            computed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    Pooled(SectorStatistics),
    InsufficientSample { peers: usize, required: usize },
}

/// Result of aggregating one sector-year, with the companies that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorAggregation {
    pub sector: SectorRef,
    pub year: i32,
    pub outcome: AggregationOutcome,
    pub failures: Vec<BatchError>,
}

/// Runs the calculator over statement histories and pools peers.
#[derive(Clone)]
pub struct MetricAggregator {
    source: Arc<dyn StatementSource>,
    min_sample_size: usize,
}

impl MetricAggregator {
    pub fn new(source: Arc<dyn StatementSource>, min_sample_size: usize) -> Self {
        Self {
            source,
            min_sample_size,
        }
    }

    pub fn source(&self) -> &Arc<dyn StatementSource> {
        &self.source
    }

    pub fn min_sample_size(&self) -> usize {
        self.min_sample_size
    }

    /// Indicators for an already fetched statement; the previous year is
    /// looked up here.
    pub async fn indicators_for_statement(
        &self,
        company: &CompanyClassification,
        current: &FinancialStatement,
    ) -> Result<IndicatorSet, AnalysisError> {
        if current.company_id != company.company_id {
            return Err(AnalysisError::Computation(format!(
                "statement belongs to {}, expected {}",
                current.company_id, company.company_id
            )));
        }
        let previous = self
            .source
            .get_statement(&company.company_id, current.fiscal_year - 1)
            .await?;
        let calculator = IndicatorCalculator::for_company(company);
        Ok(calculator.calculate(current, previous.as_ref()))
    }

    /// Indicators for one company-year. `None` when no statement exists.
    pub async fn company_indicators(
        &self,
        company: &CompanyClassification,
        year: i32,
    ) -> Result<Option<IndicatorSet>, AnalysisError> {
        match self.source.get_statement(&company.company_id, year).await? {
            Some(current) => Ok(Some(self.indicators_for_statement(company, &current).await?)),
            None => Ok(None),
        }
    }

    /// Public entry point: indicators, or an explicit no-data marker.
    pub async fn compute_indicators(
        &self,
        company_id: &str,
        year: i32,
    ) -> Result<DataResult<IndicatorSet>, AnalysisError> {
        let Some(company) = self.source.get_classification(company_id).await? else {
            return Ok(DataResult::NoData(NoDataResult {
                company_id: company_id.to_string(),
                year,
                reason: format!("unknown company {}", company_id),
            }));
        };
        Ok(match self.company_indicators(&company, year).await? {
            Some(set) => DataResult::Available(set),
            None => DataResult::NoData(NoDataResult::no_statement(company_id, year)),
        })
    }

    /// One `IndicatorSet` per year of `years` that has a statement, oldest first.
    pub async fn company_history(
        &self,
        company: &CompanyClassification,
        years: RangeInclusive<i32>,
    ) -> Result<Vec<IndicatorSet>, AnalysisError> {
        let mut history = Vec::new();
        for year in years {
            if let Some(set) = self.company_indicators(company, year).await? {
                history.push(set);
            }
        }
        Ok(history)
    }

    /// Pool every qualifying company of `sector` for `year`.
    ///
    /// A single company failing is recorded in `failures` and skipped. The
    /// sample-size gate is applied to the listed peers and again to the
    /// companies that were actually computed.
    pub async fn aggregate_sector(
        &self,
        sector: &SectorRef,
        year: i32,
    ) -> Result<SectorAggregation, AnalysisError> {
        let members = self.source.list_companies_in_sector(sector, year).await?;
        let mut failures = Vec::new();

        if members.is_empty() || members.len() < self.min_sample_size {
            return Ok(self.insufficient(sector, year, members.len(), failures));
        }

        let mut computed: Vec<IndicatorSet> = Vec::with_capacity(members.len());
        for company_id in &members {
            match self.member_indicators(sector, company_id, year).await {
                Ok(set) => computed.push(set),
                Err(e) => {
                    tracing::error!("Skipping {} in {} {}: {}", company_id, sector, year, e);
                    failures.push(BatchError::company(company_id, sector, &e));
                }
            }
        }

        let kind = sector_kind(&computed);
        let (pooled, excluded): (Vec<IndicatorSet>, Vec<IndicatorSet>) =
            computed.into_iter().partition(|s| s.kind == kind);
        for set in &excluded {
            tracing::warn!(
                "Excluding {} from {} {}: {} calculator in a {} sector",
                set.company_id,
                sector,
                year,
                set.kind.as_str(),
                kind.as_str()
            );
        }

        // An empty pool is never a benchmark, whatever the configured minimum
        if pooled.is_empty() || pooled.len() < self.min_sample_size {
            return Ok(self.insufficient(sector, year, pooled.len(), failures));
        }

        Ok(SectorAggregation {
            sector: sector.clone(),
            year,
            outcome: AggregationOutcome::Pooled(SectorStatistics {
                kind,
                sample_size: pooled.len(),
                categories: pool(&pooled),
            }),
            failures,
        })
    }

    async fn member_indicators(
        &self,
        sector: &SectorRef,
        company_id: &str,
        year: i32,
    ) -> Result<IndicatorSet, AnalysisError> {
        let company = self
            .source
            .get_classification(company_id)
            .await?
            .ok_or_else(|| AnalysisError::Computation(format!("no classification for {}", company_id)))?;
        if !company.in_sector(sector) {
            return Err(AnalysisError::Computation(format!(
                "{} is listed in {} but not classified there",
                company_id, sector
            )));
        }
        let set = self
            .company_indicators(&company, year)
            .await?
            .ok_or_else(|| AnalysisError::MissingData(format!("no statement for {} in {}", company_id, year)))?;
        if set.categories.iter().all(|(_, c)| c.average.is_none()) {
            return Err(AnalysisError::Computation(format!(
                "no indicator could be computed for {} in {}",
                company_id, year
            )));
        }
        Ok(set)
    }

    fn insufficient(
        &self,
        sector: &SectorRef,
        year: i32,
        peers: usize,
        failures: Vec<BatchError>,
    ) -> SectorAggregation {
        tracing::info!(
            "Insufficient sample for {} {}: {} peers, {} required",
            sector,
            year,
            peers,
            self.min_sample_size
        );
        SectorAggregation {
            sector: sector.clone(),
            year,
            outcome: AggregationOutcome::InsufficientSample {
                peers,
                required: self.min_sample_size,
            },
            failures,
        }
    }
}

/// Calculator variant implied by the sector's members: the majority kind,
/// standard on a tie.
fn sector_kind(sets: &[IndicatorSet]) -> CalculatorKind {
    let institutions = sets
        .iter()
        .filter(|s| s.kind == CalculatorKind::FinancialInstitution)
        .count();
    if institutions * 2 > sets.len() {
        CalculatorKind::FinancialInstitution
    } else {
        CalculatorKind::Standard
    }
}

/// Mean and population standard deviation of every indicator across `sets`.
/// Indicators with no non-null value anywhere are omitted.
pub fn pool(sets: &[IndicatorSet]) -> CategoryMap<BenchmarkCategory> {
    CategoryMap::from_fn(|category| pool_category(sets, category))
}

fn pool_category(sets: &[IndicatorSet], category: Category) -> BenchmarkCategory {
    let names: BTreeSet<&String> = sets
        .iter()
        .flat_map(|s| s.category(category).values.keys())
        .collect();

    let mut samples: HashMap<&String, Vec<f64>> = HashMap::new();
    for set in sets {
        for (name, value) in &set.category(category).values {
            if let Some(v) = value {
                samples.entry(name).or_default().push(*v);
            }
        }
    }

    let indicators = names
        .into_iter()
        .filter_map(|name| {
            let values = samples.get(name)?;
            IndicatorStat::from_samples(values).map(|stat| (name.clone(), stat))
        })
        .collect();

    let averages: Vec<f64> = sets
        .iter()
        .filter_map(|s| s.category(category).average)
        .collect();

    BenchmarkCategory {
        indicators,
        average: IndicatorStat::from_samples(&averages),
    }
}
