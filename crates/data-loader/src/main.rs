//! data-loader: Recompute sector benchmarks and forecasts over a JSON dataset.
//!
//! Loads companies, annual statements and quarterly results from a dataset
//! file into the in-memory stores, recomputes every sector benchmark for the
//! requested year and prints the requested views as JSON.
//!
//! Usage:
//!   cargo run -p data-loader -- --data dataset.json --year 2024
//!   cargo run -p data-loader -- --data dataset.json --year 2024 --horizon long --dashboard
//!   cargo run -p data-loader -- --data dataset.json --year 2024 --company ACME --historical 2020
//!   cargo run -p data-loader -- --data dataset.json --year 2024 --forecast

use std::str::FromStr;

use analysis_core::Horizon;
use analysis_orchestrator::{AnalysisOrchestrator, Dataset, EngineConfig};
use serde_json::{Map, Value};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "data_loader=info,sector_benchmark=info,analysis_orchestrator=info".into()
            }),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let flag = |name: &str| args.iter().any(|a| a == name);
    let value = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .map(|s| s.as_str())
    };

    let (Some(data_path), Some(year)) = (value("--data"), value("--year")) else {
        print_usage();
        std::process::exit(1);
    };
    let year: i32 = year
        .parse()
        .map_err(|_| anyhow::anyhow!("--year expects a number, got {}", year))?;
    let horizon = value("--horizon").map(Horizon::from_str).transpose()?;
    let historical_start: Option<i32> = value("--historical")
        .map(|s| s.parse())
        .transpose()
        .map_err(|_| anyhow::anyhow!("--historical expects a start year"))?;
    let only_company = value("--company");

    let dataset = Dataset::from_json_file(data_path)?;
    let mut companies: Vec<String> = dataset
        .companies
        .iter()
        .map(|c| c.company_id.clone())
        .filter(|id| only_company.map_or(true, |only| id.as_str() == only))
        .collect();
    companies.sort();
    tracing::info!(
        "Loaded {} companies, {} statements, {} quarterly results from {}",
        dataset.companies.len(),
        dataset.statements.len(),
        dataset.quarters.len(),
        data_path
    );

    let config = EngineConfig::from_env();
    let view_horizon = horizon.or_else(|| config.horizons.first().copied()).unwrap_or(Horizon::Short);
    let orchestrator = AnalysisOrchestrator::in_memory(config, dataset);

    let mut output = Map::new();
    let report = orchestrator.recompute_benchmarks(year, horizon).await?;
    output.insert("benchmarks".to_string(), serde_json::to_value(&report)?);

    if flag("--forecast") {
        // Forecasts target the period after the loaded year
        let mut forecasts = Vec::with_capacity(companies.len());
        for company_id in &companies {
            match orchestrator.recompute_forecast_for(company_id, year + 1).await {
                Ok(estimate) => forecasts.push(serde_json::to_value(&estimate)?),
                Err(e) => tracing::error!("Forecast for {} failed: {}", company_id, e),
            }
        }
        output.insert("forecasts".to_string(), Value::Array(forecasts));
    }

    if flag("--dashboard") {
        let mut dashboards = Vec::with_capacity(companies.len());
        for company_id in &companies {
            let view = orchestrator.get_dashboard(company_id, year, view_horizon).await?;
            dashboards.push(serde_json::to_value(&view)?);
        }
        output.insert("dashboards".to_string(), Value::Array(dashboards));
    }

    if let Some(start) = historical_start {
        let mut series = Vec::with_capacity(companies.len());
        for company_id in &companies {
            let view = orchestrator
                .get_historical(company_id, start, year, view_horizon)
                .await?;
            series.push(serde_json::to_value(&view)?);
        }
        output.insert("historical".to_string(), Value::Array(series));
    }

    let stats = orchestrator.cache_stats();
    tracing::debug!("Cache hits: {}, misses: {}", stats.hits, stats.misses);

    println!("{}", serde_json::to_string_pretty(&Value::Object(output))?);
    Ok(())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  data-loader --data FILE --year YEAR [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --horizon short|medium|long  Recompute a single horizon (default: all configured)");
    eprintln!("  --company ID                 Restrict forecasts and views to one company");
    eprintln!("  --forecast                   Recompute forecasts for YEAR + 1");
    eprintln!("  --dashboard                  Print the dashboard of each company for YEAR");
    eprintln!("  --historical START           Print the series from START to YEAR");
}
