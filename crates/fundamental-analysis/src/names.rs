//! Stable indicator keys, shared by the calculator, the sector benchmarks and
//! every view built on top of them.

// Growth
pub const REVENUE_GROWTH: &str = "revenue_growth";
pub const EBIT_GROWTH: &str = "ebit_growth";
pub const EBITDA_GROWTH: &str = "ebitda_growth";
pub const NET_INCOME_GROWTH: &str = "net_income_growth";
pub const CAPEX_GROWTH: &str = "capex_growth";

// Profitability
pub const NET_MARGIN: &str = "net_margin";
pub const EBITDA_MARGIN: &str = "ebitda_margin";
pub const OPERATING_MARGIN: &str = "operating_margin";
pub const ROE: &str = "roe";
pub const ROA: &str = "roa";

// Shareholder return
pub const DIVIDEND_PER_SHARE: &str = "dividend_per_share";
pub const DIVIDEND_YIELD: &str = "dividend_yield";
pub const PAYOUT_RATIO: &str = "payout_ratio";

// Valuation
pub const PER: &str = "per";
pub const PBR: &str = "pbr";
pub const PRICE_TO_SALES: &str = "price_to_sales";
pub const EV_EBITDA: &str = "ev_ebitda";
pub const TARGET_PRICE: &str = "target_price";
pub const UPSIDE: &str = "upside";

// Solidity, financial institutions
pub const EQUITY_TO_ASSETS: &str = "equity_to_assets";
pub const CREDITS_TO_FUNDING: &str = "credits_to_funding";
pub const CREDITS_TO_DEPOSITS: &str = "credits_to_deposits";
pub const COST_OF_RISK: &str = "cost_of_risk";

// Solidity, both variants
pub const DEBT_TO_EQUITY: &str = "debt_to_equity";

// Solidity, standard companies
pub const GEARING: &str = "gearing";
pub const DEBT_TO_ASSETS: &str = "debt_to_assets";
