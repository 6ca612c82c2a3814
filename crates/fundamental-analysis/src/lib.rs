use analysis_core::stats::{pct, pct_change, product, safe_div};
use analysis_core::{
    CalculatorKind, CategoryMap, CompanyClassification, FinancialStatement, IndicatorCategory,
    IndicatorSet,
};

pub mod names;

/// Share of gross dividends that reaches the shareholder after withholding.
pub const NET_DIVIDEND_FACTOR: f64 = 0.88;

/// Statement amounts are reported in millions.
const MILLIONS: f64 = 1e6;

/// Turns one company-year of statements into an `IndicatorSet`.
///
/// Both variants share growth, profitability, shareholder return and
/// valuation; only the solidity category depends on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorCalculator {
    kind: CalculatorKind,
}

impl IndicatorCalculator {
    pub fn new(kind: CalculatorKind) -> Self {
        Self { kind }
    }

    /// Pick the variant from the company's institution flag. Nothing else
    /// takes part in the choice.
    pub fn for_company(company: &CompanyClassification) -> Self {
        if company.is_financial_institution {
            Self::new(CalculatorKind::FinancialInstitution)
        } else {
            Self::new(CalculatorKind::Standard)
        }
    }

    pub fn kind(&self) -> CalculatorKind {
        self.kind
    }

    /// Compute every category for `current`. `previous` is used only when it
    /// is the same company's immediately preceding fiscal year; anything else
    /// leaves the growth category null.
    pub fn calculate(
        &self,
        current: &FinancialStatement,
        previous: Option<&FinancialStatement>,
    ) -> IndicatorSet {
        let previous = previous.filter(|p| {
            let comparable =
                p.company_id == current.company_id && p.fiscal_year == current.fiscal_year - 1;
            if !comparable {
                tracing::debug!(
                    "Ignoring non-comparable previous statement {} {} for {} {}",
                    p.company_id,
                    p.fiscal_year,
                    current.company_id,
                    current.fiscal_year
                );
            }
            comparable
        });

        let dps = self.calculate_dps(current);
        let dividend_yield = pct(dps, current.closing_price);

        let categories = CategoryMap {
            growth: self.growth(current, previous),
            profitability: self.profitability(current),
            shareholder_return: IndicatorCategory::from_values([
                (names::DIVIDEND_PER_SHARE, dps),
                (names::DIVIDEND_YIELD, dividend_yield),
                (names::PAYOUT_RATIO, pct(current.net_income, current.gross_dividends)),
            ]),
            valuation: self.valuation(current, previous, dps),
            solidity: self.solidity(current),
        };

        IndicatorSet {
            company_id: current.company_id.clone(),
            year: current.fiscal_year,
            kind: self.kind,
            has_previous: previous.is_some(),
            categories,
        }
    }

    fn growth(
        &self,
        current: &FinancialStatement,
        previous: Option<&FinancialStatement>,
    ) -> IndicatorCategory {
        let change = |field: fn(&FinancialStatement) -> Option<f64>| {
            previous.and_then(|p| pct_change(field(current), field(p)))
        };
        IndicatorCategory::from_values([
            (names::REVENUE_GROWTH, change(|s| s.revenue)),
            (names::EBIT_GROWTH, change(|s| s.ebit)),
            (names::EBITDA_GROWTH, change(|s| s.ebitda)),
            (names::NET_INCOME_GROWTH, change(|s| s.net_income)),
            (names::CAPEX_GROWTH, change(|s| s.capex)),
        ])
    }

    fn profitability(&self, s: &FinancialStatement) -> IndicatorCategory {
        IndicatorCategory::from_values([
            (names::NET_MARGIN, pct(s.net_income, s.revenue)),
            (names::EBITDA_MARGIN, pct(s.ebitda, s.revenue)),
            (names::OPERATING_MARGIN, pct(s.ebit, s.revenue)),
            (names::ROE, pct(s.net_income, s.equity)),
            (names::ROA, pct(s.net_income, s.total_assets)),
        ])
    }

    /// Net dividend per share: `0.88 * gross dividends (millions) * 1e6 / shares`.
    fn calculate_dps(&self, s: &FinancialStatement) -> Option<f64> {
        let gross = product(s.gross_dividends, Some(NET_DIVIDEND_FACTOR * MILLIONS));
        safe_div(gross, s.share_count)
    }

    fn calculate_market_cap(&self, s: &FinancialStatement) -> Option<f64> {
        product(s.closing_price, s.share_count)
    }

    /// Target price `DPS / yield`, read with the previous year's yield as the
    /// reference rate: dividing by the current yield would just return the
    /// closing price. Without a previous year or a positive reference yield
    /// there is no target.
    fn calculate_target_price(
        &self,
        dps: Option<f64>,
        previous: Option<&FinancialStatement>,
    ) -> Option<f64> {
        let previous = previous?;
        let reference_yield = safe_div(self.calculate_dps(previous), previous.closing_price)?;
        if reference_yield > 0.0 {
            safe_div(dps, Some(reference_yield))
        } else {
            None
        }
    }

    fn valuation(
        &self,
        s: &FinancialStatement,
        previous: Option<&FinancialStatement>,
        dps: Option<f64>,
    ) -> IndicatorCategory {
        let market_cap = self.calculate_market_cap(s);
        let per = safe_div(market_cap, product(s.net_income, Some(MILLIONS)));
        let roe_ratio = safe_div(s.net_income, s.equity);
        let sales_per_share = safe_div(product(s.revenue, Some(MILLIONS)), s.share_count);
        let target_price = self.calculate_target_price(dps, previous);
        let upside = match (target_price, s.closing_price) {
            (Some(target), Some(price)) => pct(Some(target - price), Some(price)),
            _ => None,
        };

        IndicatorCategory::from_values([
            (names::PER, per),
            (names::PBR, product(roe_ratio, per)),
            (names::PRICE_TO_SALES, safe_div(s.closing_price, sales_per_share)),
            (names::EV_EBITDA, safe_div(market_cap, product(s.ebitda, Some(MILLIONS)))),
            (names::TARGET_PRICE, target_price),
            (names::UPSIDE, upside),
        ])
    }

    fn solidity(&self, s: &FinancialStatement) -> IndicatorCategory {
        let debt_to_equity = safe_div(s.total_debt, s.equity);
        match self.kind {
            CalculatorKind::FinancialInstitution => {
                let funding = sum_all(&[s.equity, s.client_deposits, s.total_debt]);
                IndicatorCategory::from_values([
                    (names::EQUITY_TO_ASSETS, safe_div(s.equity, s.total_assets)),
                    (names::CREDITS_TO_FUNDING, safe_div(s.client_credits, funding)),
                    (names::CREDITS_TO_DEPOSITS, safe_div(s.client_credits, s.client_deposits)),
                    (names::DEBT_TO_EQUITY, debt_to_equity),
                    (names::COST_OF_RISK, s.cost_of_risk),
                ])
            }
            CalculatorKind::Standard => IndicatorCategory::from_values([
                (names::GEARING, safe_div(s.total_debt, sum_all(&[s.total_debt, s.equity]))),
                (names::DEBT_TO_ASSETS, safe_div(s.total_debt, s.total_assets)),
                (names::DEBT_TO_EQUITY, debt_to_equity),
            ]),
        }
    }
}

impl Default for IndicatorCalculator {
    fn default() -> Self {
        Self::new(CalculatorKind::Standard)
    }
}

/// Sum that is null as soon as one term is null.
fn sum_all(values: &[Option<f64>]) -> Option<f64> {
    values.iter().try_fold(0.0, |acc, v| v.map(|v| acc + v))
}
