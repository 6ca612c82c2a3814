use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::stats;
use crate::AnalysisError;

/// One fiscal year of reported figures for a listed company.
///
/// Flow and stock amounts are in millions. `share_count` is a raw count,
/// `closing_price` and `dividend_per_share` are per-share amounts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialStatement {
    pub company_id: String,
    pub fiscal_year: i32,

    // Balance sheet
    pub total_assets: Option<f64>,
    pub equity: Option<f64>,
    pub total_debt: Option<f64>,
    /// Financial institutions only
    pub client_credits: Option<f64>,
    /// Financial institutions only
    pub client_deposits: Option<f64>,

    // Income statement
    /// Revenue, or net banking income for financial institutions
    pub revenue: Option<f64>,
    pub ebit: Option<f64>,
    pub ebitda: Option<f64>,
    pub net_income: Option<f64>,
    pub capex: Option<f64>,
    pub cost_of_risk: Option<f64>,

    // Market
    pub share_count: Option<f64>,
    pub closing_price: Option<f64>,
    pub per: Option<f64>,
    pub dividend_per_share: Option<f64>,
    /// Gross dividends paid, in millions
    pub gross_dividends: Option<f64>,
}

/// Quarterly net income, consumed by the forecast estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyResult {
    pub company_id: String,
    pub year: i32,
    /// 1..=4
    pub quarter: u8,
    #[serde(default)]
    pub net_income: Option<f64>,
}

/// Which calculator variant a company's statements go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculatorKind {
    FinancialInstitution,
    Standard,
}

impl CalculatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculatorKind::FinancialInstitution => "financial_institution",
            CalculatorKind::Standard => "standard",
        }
    }
}

/// The two independent sector classification schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Taxonomy {
    /// Primary exchange sector
    Primary,
    /// Reclassified sector
    Reclassified,
}

impl Taxonomy {
    pub const ALL: [Taxonomy; 2] = [Taxonomy::Primary, Taxonomy::Reclassified];

    pub fn as_str(&self) -> &'static str {
        match self {
            Taxonomy::Primary => "primary",
            Taxonomy::Reclassified => "reclassified",
        }
    }
}

/// A sector within exactly one taxonomy. Being an enum, a benchmark can never
/// reference both taxonomies at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "taxonomy", content = "sector_id", rename_all = "snake_case")]
pub enum SectorRef {
    Primary(String),
    Reclassified(String),
}

impl SectorRef {
    pub fn new(taxonomy: Taxonomy, sector_id: impl Into<String>) -> Self {
        match taxonomy {
            Taxonomy::Primary => SectorRef::Primary(sector_id.into()),
            Taxonomy::Reclassified => SectorRef::Reclassified(sector_id.into()),
        }
    }

    pub fn taxonomy(&self) -> Taxonomy {
        match self {
            SectorRef::Primary(_) => Taxonomy::Primary,
            SectorRef::Reclassified(_) => Taxonomy::Reclassified,
        }
    }

    pub fn sector_id(&self) -> &str {
        match self {
            SectorRef::Primary(id) | SectorRef::Reclassified(id) => id,
        }
    }
}

impl fmt::Display for SectorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.taxonomy().as_str(), self.sector_id())
    }
}

/// Company classification as supplied by the reference-data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyClassification {
    pub company_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub primary_sector: Option<String>,
    #[serde(default)]
    pub reclassified_sector: Option<String>,
    #[serde(default)]
    pub is_financial_institution: bool,
}

impl CompanyClassification {
    pub fn sector(&self, taxonomy: Taxonomy) -> Option<SectorRef> {
        let id = match taxonomy {
            Taxonomy::Primary => self.primary_sector.as_ref(),
            Taxonomy::Reclassified => self.reclassified_sector.as_ref(),
        };
        id.map(|id| SectorRef::new(taxonomy, id.clone()))
    }

    pub fn in_sector(&self, sector: &SectorRef) -> bool {
        self.sector(sector.taxonomy()).as_ref() == Some(sector)
    }
}

/// Investment time-frame used as a benchmark dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::Short, Horizon::Medium, Horizon::Long];

    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::Short => "short",
            Horizon::Medium => "medium",
            Horizon::Long => "long",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Horizon {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short" | "short_term" => Ok(Horizon::Short),
            "medium" | "medium_term" => Ok(Horizon::Medium),
            "long" | "long_term" => Ok(Horizon::Long),
            other => Err(AnalysisError::Configuration(format!("unknown horizon '{}'", other))),
        }
    }
}

/// Indicator categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Growth,
    Profitability,
    ShareholderReturn,
    Valuation,
    Solidity,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Growth,
        Category::Profitability,
        Category::ShareholderReturn,
        Category::Valuation,
        Category::Solidity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Growth => "growth",
            Category::Profitability => "profitability",
            Category::ShareholderReturn => "shareholder_return",
            Category::Valuation => "valuation",
            Category::Solidity => "solidity",
        }
    }
}

/// One value of `T` per indicator category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMap<T> {
    pub growth: T,
    pub profitability: T,
    pub shareholder_return: T,
    pub valuation: T,
    pub solidity: T,
}

impl<T> CategoryMap<T> {
    pub fn from_fn(mut f: impl FnMut(Category) -> T) -> Self {
        Self {
            growth: f(Category::Growth),
            profitability: f(Category::Profitability),
            shareholder_return: f(Category::ShareholderReturn),
            valuation: f(Category::Valuation),
            solidity: f(Category::Solidity),
        }
    }

    pub fn get(&self, category: Category) -> &T {
        match category {
            Category::Growth => &self.growth,
            Category::Profitability => &self.profitability,
            Category::ShareholderReturn => &self.shareholder_return,
            Category::Valuation => &self.valuation,
            Category::Solidity => &self.solidity,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Growth => &mut self.growth,
            Category::Profitability => &mut self.profitability,
            Category::ShareholderReturn => &mut self.shareholder_return,
            Category::Valuation => &mut self.valuation,
            Category::Solidity => &mut self.solidity,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &T)> {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

/// Named indicator values of one category plus their mean.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorCategory {
    pub values: BTreeMap<String, Option<f64>>,
    /// Mean of the non-null members, null if there are none
    pub average: Option<f64>,
}

impl IndicatorCategory {
    pub fn from_values<'a>(values: impl IntoIterator<Item = (&'a str, Option<f64>)>) -> Self {
        let values: BTreeMap<String, Option<f64>> = values
            .into_iter()
            .map(|(name, v)| (name.to_string(), v.and_then(stats::finite)))
            .collect();
        let present: Vec<Option<f64>> = values.values().copied().collect();
        Self {
            average: stats::mean_present(&present),
            values,
        }
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }
}

/// Every indicator computed for one company-year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub company_id: String,
    pub year: i32,
    pub kind: CalculatorKind,
    /// False when no comparable previous year was available
    pub has_previous: bool,
    pub categories: CategoryMap<IndicatorCategory>,
}

impl IndicatorSet {
    pub fn category(&self, category: Category) -> &IndicatorCategory {
        self.categories.get(category)
    }

    pub fn value(&self, category: Category, name: &str) -> Option<f64> {
        self.category(category).value(name)
    }
}

/// Mean and population standard deviation of one indicator across peers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorStat {
    pub mean: f64,
    /// Only present with at least two non-null observations
    pub std_dev: Option<f64>,
    pub count: usize,
}

impl IndicatorStat {
    /// Pool a set of observations. `None` when no observation is present.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let mean = stats::mean(samples)?;
        let std_dev = if samples.len() >= 2 {
            stats::population_std_dev(samples)
        } else {
            None
        };
        Some(Self {
            mean,
            std_dev,
            count: samples.len(),
        })
    }
}

/// Sector statistics for one category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkCategory {
    pub indicators: BTreeMap<String, IndicatorStat>,
    /// Statistics of the per-company category averages
    pub average: Option<IndicatorStat>,
}

impl BenchmarkCategory {
    pub fn mean_of(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).map(|s| s.mean)
    }
}

/// Peer statistics for one (sector, year, horizon).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorBenchmark {
    pub sector: SectorRef,
    pub year: i32,
    pub horizon: Horizon,
    pub kind: CalculatorKind,
    pub sample_size: usize,
    pub categories: CategoryMap<BenchmarkCategory>,
    pub computed_at: DateTime<Utc>,
}

impl SectorBenchmark {
    pub fn mean_of(&self, category: Category, name: &str) -> Option<f64> {
        self.categories.get(category).mean_of(name)
    }
}

/// The two benchmarks applicable to a company, one per taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkPair {
    pub primary: Option<SectorBenchmark>,
    pub reclassified: Option<SectorBenchmark>,
}

impl BenchmarkPair {
    pub fn side(&self, taxonomy: Taxonomy) -> Option<&SectorBenchmark> {
        match taxonomy {
            Taxonomy::Primary => self.primary.as_ref(),
            Taxonomy::Reclassified => self.reclassified.as_ref(),
        }
    }
}

/// How the projected net income was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetIncomeSource {
    /// The current year's actual figure was already posted
    Reported,
    /// Blend of the quarterly trend and the weighted historical mean
    Blended,
    /// Not enough history to project anything
    Unavailable,
}

/// Series used to project the dividend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividendMethod {
    PayoutRatio,
    DividendPerShare,
}

/// Current forward estimate for a company. Overwritten on every recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEstimate {
    pub company_id: String,
    pub fiscal_year: i32,
    /// Projected net income, in millions
    pub net_income: Option<f64>,
    pub net_income_source: NetIncomeSource,
    /// Projected net dividend per share, 0 when the history is too thin
    pub net_dividend_per_share: f64,
    pub dividend_method: Option<DividendMethod>,
    pub computed_at: DateTime<Utc>,
}

/// Explicit "nothing to show" answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoDataResult {
    pub company_id: String,
    pub year: i32,
    pub reason: String,
}

impl NoDataResult {
    pub fn no_statement(company_id: &str, year: i32) -> Self {
        Self {
            company_id: company_id.to_string(),
            year,
            reason: format!("no statement for {} in {}", company_id, year),
        }
    }
}

/// A complete result or an explicit no-data marker; never a partial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum DataResult<T> {
    Available(T),
    NoData(NoDataResult),
}

impl<T> DataResult<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, DataResult::Available(_))
    }

    pub fn available(self) -> Option<T> {
        match self {
            DataResult::Available(v) => Some(v),
            DataResult::NoData(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DataResult<U> {
        match self {
            DataResult::Available(v) => DataResult::Available(f(v)),
            DataResult::NoData(n) => DataResult::NoData(n),
        }
    }
}
