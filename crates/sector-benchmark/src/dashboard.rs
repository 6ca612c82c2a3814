//! Single-year view: statement excerpt, indicators and sector comparison.

use std::collections::BTreeMap;

use analysis_core::stats::z_score;
use analysis_core::{
    AnalysisError, BenchmarkPair, CalculatorKind, Category, CategoryMap, DataResult,
    FinancialStatement, Horizon, IndicatorSet, NoDataResult, Taxonomy,
};
use serde::{Deserialize, Serialize};

use crate::aggregator::MetricAggregator;
use crate::service::BenchmarkService;

/// Balance sheet and income statement subset shown next to the indicators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementExcerpt {
    pub balance_sheet: BTreeMap<String, Option<f64>>,
    pub income_statement: BTreeMap<String, Option<f64>>,
}

impl StatementExcerpt {
    pub fn from_statement(s: &FinancialStatement, kind: CalculatorKind) -> Self {
        let mut balance_sheet = BTreeMap::from([
            ("total_assets".to_string(), s.total_assets),
            ("equity".to_string(), s.equity),
            ("total_debt".to_string(), s.total_debt),
        ]);
        let revenue_label = match kind {
            CalculatorKind::FinancialInstitution => {
                balance_sheet.insert("client_credits".to_string(), s.client_credits);
                balance_sheet.insert("client_deposits".to_string(), s.client_deposits);
                "net_banking_income"
            }
            CalculatorKind::Standard => "revenue",
        };

        let mut income_statement = BTreeMap::from([
            (revenue_label.to_string(), s.revenue),
            ("ebit".to_string(), s.ebit),
            ("ebitda".to_string(), s.ebitda),
            ("net_income".to_string(), s.net_income),
        ]);
        if kind == CalculatorKind::FinancialInstitution {
            income_statement.insert("cost_of_risk".to_string(), s.cost_of_risk);
        }

        Self {
            balance_sheet,
            income_statement,
        }
    }
}

/// A company value next to the two sector means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorComparison {
    pub name: String,
    pub value: Option<f64>,
    pub sector_primary: Option<f64>,
    pub sector_reclassified: Option<f64>,
    /// Standard deviations away from the primary sector mean
    pub primary_z_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryComparison {
    pub indicators: Vec<IndicatorComparison>,
    pub average: Option<IndicatorComparison>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub company_id: String,
    pub company_name: Option<String>,
    pub year: i32,
    pub horizon: Horizon,
    pub statement: StatementExcerpt,
    pub indicators: IndicatorSet,
    pub benchmarks: BenchmarkPair,
    pub comparisons: CategoryMap<CategoryComparison>,
}

#[derive(Clone)]
pub struct DashboardComposer {
    aggregator: MetricAggregator,
    benchmarks: BenchmarkService,
}

impl DashboardComposer {
    pub fn new(aggregator: MetricAggregator, benchmarks: BenchmarkService) -> Self {
        Self {
            aggregator,
            benchmarks,
        }
    }

    pub async fn compose(
        &self,
        company_id: &str,
        year: i32,
        horizon: Horizon,
    ) -> Result<DataResult<DashboardView>, AnalysisError> {
        let source = self.aggregator.source();
        let Some(company) = source.get_classification(company_id).await? else {
            return Ok(DataResult::NoData(NoDataResult {
                company_id: company_id.to_string(),
                year,
                reason: format!("unknown company {}", company_id),
            }));
        };
        let Some(statement) = source.get_statement(company_id, year).await? else {
            tracing::debug!("No statement for {} in {}", company_id, year);
            return Ok(DataResult::NoData(NoDataResult::no_statement(company_id, year)));
        };

        let indicators = self.aggregator.indicators_for_statement(&company, &statement).await?;
        let benchmarks = self.benchmarks.get_for(&company, year, horizon).await?;
        let comparisons = CategoryMap::from_fn(|c| compare_category(&indicators, &benchmarks, c));

        Ok(DataResult::Available(DashboardView {
            company_id: company.company_id.clone(),
            company_name: company.name.clone(),
            year,
            horizon,
            statement: StatementExcerpt::from_statement(&statement, indicators.kind),
            indicators,
            benchmarks,
            comparisons,
        }))
    }
}

fn compare_category(
    set: &IndicatorSet,
    benchmarks: &BenchmarkPair,
    category: Category,
) -> CategoryComparison {
    let stat_of = |taxonomy: Taxonomy, name: &str| {
        benchmarks
            .side(taxonomy)
            .and_then(|b| b.categories.get(category).indicators.get(name).copied())
    };

    let indicators = set
        .category(category)
        .values
        .iter()
        .map(|(name, value)| {
            let primary = stat_of(Taxonomy::Primary, name);
            IndicatorComparison {
                name: name.clone(),
                value: *value,
                sector_primary: primary.map(|s| s.mean),
                sector_reclassified: stat_of(Taxonomy::Reclassified, name).map(|s| s.mean),
                primary_z_score: primary.and_then(|s| z_score(*value, Some(s.mean), s.std_dev)),
            }
        })
        .collect();

    let average_of = |taxonomy: Taxonomy| {
        benchmarks
            .side(taxonomy)
            .and_then(|b| b.categories.get(category).average)
    };
    let value = set.category(category).average;
    let primary = average_of(Taxonomy::Primary);

    CategoryComparison {
        indicators,
        average: Some(IndicatorComparison {
            name: "average".to_string(),
            value,
            sector_primary: primary.map(|s| s.mean),
            sector_reclassified: average_of(Taxonomy::Reclassified).map(|s| s.mean),
            primary_z_score: primary.and_then(|s| z_score(value, Some(s.mean), s.std_dev)),
        }),
    }
}
