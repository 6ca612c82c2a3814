//! Earnings Forecast
//!
//! Short-horizon estimate of next-period net income and net dividend per
//! share, from a company's annual statements and current-year quarters.

use analysis_core::stats::{coefficient_of_variation, finite, mean, pct_change, safe_div, weighted_mean};
use analysis_core::{DividendMethod, FinancialStatement, NetIncomeSource, QuarterlyResult};
use fundamental_analysis::NET_DIVIDEND_FACTOR;
use serde::{Deserialize, Serialize};

pub mod service;

pub use service::ForecastService;

/// Years of history feeding the weighted net-income mean.
pub const HISTORY_YEARS: usize = 4;
/// Years inspected for the dividend projection.
pub const DIVIDEND_WINDOW: i32 = 5;
/// Years of that window that must carry a usable net income.
pub const MIN_DIVIDEND_YEARS: usize = 3;
/// Growth applied to the mean dividend per share when that series is used.
pub const DPS_GROWTH_FACTOR: f64 = 1.10;
/// Quarters of the running year feeding the trend signal.
const TREND_QUARTERS: u8 = 3;

/// Forecast tunables. Loaded once and passed in; never looked up globally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastParams {
    /// Historical weights, most recent year first
    pub weights: [f64; HISTORY_YEARS],
    /// Weight of the quarterly trend signal
    pub k: f64,
    /// Weight of the weighted historical mean
    pub z: f64,
    /// Dividend withholding rate
    pub irvm: f64,
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            weights: [1.0; HISTORY_YEARS],
            k: 0.3,
            z: 0.7,
            irvm: 0.15,
        }
    }
}

impl ForecastParams {
    /// `k` and `z` are applied as given; this only reports whether they
    /// happen to sum to one.
    pub fn blend_is_normalized(&self) -> bool {
        (self.k + self.z - 1.0).abs() <= 1e-9
    }
}

/// Everything the estimator looks at for one company and target year.
#[derive(Debug, Clone, Default)]
pub struct ForecastInputs {
    pub year: i32,
    /// Statement of the target year, if already posted
    pub current: Option<FinancialStatement>,
    /// Earlier annual statements, any order
    pub history: Vec<FinancialStatement>,
    /// Quarters of the target year
    pub quarters: Vec<QuarterlyResult>,
    /// Quarters of the year before
    pub previous_quarters: Vec<QuarterlyResult>,
}

impl ForecastInputs {
    fn statement(&self, year: i32) -> Option<&FinancialStatement> {
        self.history.iter().find(|s| s.fiscal_year == year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetIncomeProjection {
    pub value: Option<f64>,
    pub source: NetIncomeSource,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DividendProjection {
    pub net_dividend_per_share: f64,
    pub method: Option<DividendMethod>,
}

impl DividendProjection {
    fn none() -> Self {
        Self {
            net_dividend_per_share: 0.0,
            method: None,
        }
    }
}

/// Pure forecasting math over `ForecastInputs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForecastEstimator {
    params: ForecastParams,
}

impl ForecastEstimator {
    pub fn new(params: ForecastParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ForecastParams {
        &self.params
    }

    /// A posted actual wins outright. Otherwise blend
    /// `k * quarterly signal + z * weighted historical mean`, where a missing
    /// component contributes zero.
    pub fn project_net_income(&self, inputs: &ForecastInputs) -> NetIncomeProjection {
        if let Some(actual) = inputs.current.as_ref().and_then(|s| s.net_income) {
            return NetIncomeProjection {
                value: Some(actual),
                source: NetIncomeSource::Reported,
            };
        }

        let historical = self.weighted_history(inputs);
        let quarterly = self.quarterly_signal(inputs);
        if historical.is_none() && quarterly.is_none() {
            return NetIncomeProjection {
                value: None,
                source: NetIncomeSource::Unavailable,
            };
        }

        let blended = self.params.k * quarterly.unwrap_or(0.0) + self.params.z * historical.unwrap_or(0.0);
        NetIncomeProjection {
            value: finite(blended),
            source: NetIncomeSource::Blended,
        }
    }

    /// Weighted mean of up to the last four years of net income.
    fn weighted_history(&self, inputs: &ForecastInputs) -> Option<f64> {
        let values: Vec<Option<f64>> = (1..=HISTORY_YEARS as i32)
            .map(|back| inputs.statement(inputs.year - back).and_then(|s| s.net_income))
            .collect();
        weighted_mean(&values, &self.params.weights)
    }

    /// Mean year-over-year growth of the first three quarters as a ratio.
    /// A quarter without a comparable pair counts as zero growth and the
    /// divisor stays three.
    pub fn quarterly_growth(&self, inputs: &ForecastInputs) -> f64 {
        let quarter = |list: &[QuarterlyResult], q: u8| {
            list.iter().find(|r| r.quarter == q).and_then(|r| r.net_income)
        };
        let total: f64 = (1..=TREND_QUARTERS)
            .map(|q| {
                pct_change(quarter(inputs.quarters.as_slice(), q), quarter(inputs.previous_quarters.as_slice(), q))
                    .map(|g| g / 100.0)
                    .unwrap_or(0.0)
            })
            .sum();
        total / TREND_QUARTERS as f64
    }

    /// Last year's net income carried forward at the quarterly growth rate.
    fn quarterly_signal(&self, inputs: &ForecastInputs) -> Option<f64> {
        let last = inputs.statement(inputs.year - 1).and_then(|s| s.net_income)?;
        finite(last * (1.0 + self.quarterly_growth(inputs)))
    }

    /// Project the net dividend per share from whichever of the payout ratio
    /// and dividend-per-share series is more stable over the last five years.
    pub fn project_dividend(&self, inputs: &ForecastInputs) -> DividendProjection {
        let years: Vec<&FinancialStatement> = (1..=DIVIDEND_WINDOW)
            .filter_map(|back| inputs.statement(inputs.year - back))
            .filter(|s| matches!(s.net_income, Some(ni) if ni != 0.0))
            .collect();
        if years.len() < MIN_DIVIDEND_YEARS {
            tracing::debug!(
                "Dividend projection for {}: {} usable years, {} required",
                inputs.year,
                years.len(),
                MIN_DIVIDEND_YEARS
            );
            return DividendProjection::none();
        }

        let payouts: Vec<f64> = years
            .iter()
            .filter_map(|s| safe_div(s.gross_dividends, s.net_income))
            .collect();
        let dps: Vec<f64> = years.iter().filter_map(|s| dividend_per_share(s)).collect();

        let method = match (coefficient_of_variation(&payouts), coefficient_of_variation(&dps)) {
            (Some(p), Some(d)) if d < p => DividendMethod::DividendPerShare,
            (Some(_), _) => DividendMethod::PayoutRatio,
            (None, Some(_)) => DividendMethod::DividendPerShare,
            (None, None) => return DividendProjection::none(),
        };

        // `years` is most recent first
        let latest = years[0];
        let Some(shares) = years.iter().find_map(|s| s.share_count).filter(|n| *n > 0.0) else {
            return DividendProjection::none();
        };

        let pool = match method {
            DividendMethod::PayoutRatio => mean(&payouts)
                .zip(latest.net_income)
                .map(|(ratio, ni)| ratio * ni * 1e6),
            DividendMethod::DividendPerShare => mean(&dps).map(|m| m * DPS_GROWTH_FACTOR * shares),
        };

        let net = pool
            .and_then(|p| finite(p * (1.0 - self.params.irvm) / shares))
            .unwrap_or(0.0);
        DividendProjection {
            net_dividend_per_share: net,
            method: Some(method),
        }
    }
}

/// Reported dividend per share, or one derived from gross dividends.
fn dividend_per_share(s: &FinancialStatement) -> Option<f64> {
    s.dividend_per_share.or_else(|| {
        safe_div(
            s.gross_dividends.map(|g| g * NET_DIVIDEND_FACTOR * 1e6),
            s.share_count,
        )
    })
}
