use std::sync::Arc;

use analysis_core::{AnalysisError, ForecastEstimate, ForecastStore, StatementSource};
use chrono::Utc;

use crate::{ForecastEstimator, ForecastInputs, ForecastParams, DIVIDEND_WINDOW};

/// Gathers a company's statements, runs the estimator and overwrites the
/// stored estimate.
#[derive(Clone)]
pub struct ForecastService {
    source: Arc<dyn StatementSource>,
    store: Arc<dyn ForecastStore>,
    estimator: ForecastEstimator,
}

impl ForecastService {
    pub fn new(
        source: Arc<dyn StatementSource>,
        store: Arc<dyn ForecastStore>,
        params: ForecastParams,
    ) -> Self {
        if !params.blend_is_normalized() {
            tracing::warn!(
                "Forecast blend weights k={} z={} do not sum to 1; applying them as configured",
                params.k,
                params.z
            );
        }
        Self {
            source,
            store,
            estimator: ForecastEstimator::new(params),
        }
    }

    pub fn estimator(&self) -> &ForecastEstimator {
        &self.estimator
    }

    pub async fn recompute(&self, company_id: &str, year: i32) -> Result<ForecastEstimate, AnalysisError> {
        let inputs = self.load_inputs(company_id, year).await?;
        let net_income = self.estimator.project_net_income(&inputs);
        let dividend = self.estimator.project_dividend(&inputs);

        let estimate = ForecastEstimate {
            company_id: company_id.to_string(),
            fiscal_year: year,
            net_income: net_income.value,
            net_income_source: net_income.source,
            net_dividend_per_share: dividend.net_dividend_per_share,
            dividend_method: dividend.method,
            computed_at: Utc::now(),
        };

        tracing::info!(
            "Forecast {} {}: net income {:?} ({:?}), net DPS {:.4} ({:?})",
            company_id,
            year,
            estimate.net_income,
            estimate.net_income_source,
            estimate.net_dividend_per_share,
            estimate.dividend_method
        );

        self.store.save_forecast(estimate.clone()).await?;
        Ok(estimate)
    }

    async fn load_inputs(&self, company_id: &str, year: i32) -> Result<ForecastInputs, AnalysisError> {
        let current = self.source.get_statement(company_id, year).await?;
        let mut history = Vec::new();
        for back in 1..=DIVIDEND_WINDOW {
            if let Some(statement) = self.source.get_statement(company_id, year - back).await? {
                history.push(statement);
            }
        }
        Ok(ForecastInputs {
            year,
            current,
            history,
            quarters: self.source.get_quarterly_results(company_id, year).await?,
            previous_quarters: self.source.get_quarterly_results(company_id, year - 1).await?,
        })
    }
}
