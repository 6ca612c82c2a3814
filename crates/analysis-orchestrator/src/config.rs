use std::str::FromStr;
use std::time::Duration;

use analysis_core::Horizon;
use earnings_forecast::{ForecastParams, HISTORY_YEARS};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_MIN_SAMPLE_SIZE: usize = 3;
pub const DEFAULT_CACHE_NAMESPACE: &str = "fin";

/// Engine tunables, built once at startup and handed to each service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub forecast: ForecastParams,
    pub horizons: Vec<Horizon>,
    pub cache_ttl_secs: u64,
    pub min_sample_size: usize,
    pub cache_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            forecast: ForecastParams::default(),
            horizons: Horizon::ALL.to_vec(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from the environment (and `.env` if present). Missing or
    /// unparsable values keep their defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string());

        let mut forecast = defaults.forecast;
        for i in 0..HISTORY_YEARS {
            let name = format!("FIN_WEIGHT_{}", i + 1);
            forecast.weights[i] = parsed_or(&name, read(&name), forecast.weights[i]);
        }
        forecast.k = parsed_or("FIN_FORECAST_K", read("FIN_FORECAST_K"), forecast.k);
        forecast.z = parsed_or("FIN_FORECAST_Z", read("FIN_FORECAST_Z"), forecast.z);
        forecast.irvm = parsed_or("FIN_IRVM", read("FIN_IRVM"), forecast.irvm);

        let horizons = match read("FIN_HORIZONS") {
            Some(raw) => parse_horizons(&raw).unwrap_or_else(|| {
                tracing::warn!("FIN_HORIZONS={:?} is invalid, using all horizons", raw);
                defaults.horizons.clone()
            }),
            None => defaults.horizons.clone(),
        };

        let cache_namespace = match read("FIN_CACHE_NAMESPACE") {
            Some(ns) if !ns.is_empty() => ns,
            _ => defaults.cache_namespace.clone(),
        };

        Self {
            forecast,
            horizons,
            cache_ttl_secs: parsed_or(
                "FIN_CACHE_TTL_SECS",
                read("FIN_CACHE_TTL_SECS"),
                defaults.cache_ttl_secs,
            ),
            min_sample_size: match parsed_or(
                "FIN_MIN_SAMPLE_SIZE",
                read("FIN_MIN_SAMPLE_SIZE"),
                defaults.min_sample_size,
            ) {
                0 => {
                    tracing::warn!(
                        "FIN_MIN_SAMPLE_SIZE must be at least 1, using default {}",
                        defaults.min_sample_size
                    );
                    defaults.min_sample_size
                }
                n => n,
            },
            cache_namespace,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parsed_or<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("{}={:?} is not valid, using default {:?}", name, raw, default);
            default
        }
    }
}

fn parse_horizons(raw: &str) -> Option<Vec<Horizon>> {
    let mut horizons = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let horizon = Horizon::from_str(part).ok()?;
        if !horizons.contains(&horizon) {
            horizons.push(horizon);
        }
    }
    (!horizons.is_empty()).then_some(horizons)
}
