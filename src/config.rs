use crate::domain::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub diagnosis_api_url: String,
    pub payment_mode: PaymentMode,
    pub simulated_confirm_delay_ms: u64,
    pub pricing: PricingConfig,
    pub fraud: FraudConfig,
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    /// Confirmations are produced by an internal delayed callback.
    Simulated,
    /// Confirmations arrive through the gateway webhook.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
    pub repair_fee_percent: Decimal,
    pub domestic_fee_percent: Decimal,
    pub diagnosis_fee: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            repair_fee_percent: Decimal::from_units(10),
            domestic_fee_percent: Decimal::from_units(15),
            diagnosis_fee: Decimal::from_units(3000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FraudConfig {
    pub min_execution_minutes: i64,
    pub price_multiple: Decimal,
    pub max_cancellations: i64,
    pub max_distance_km: f64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            min_execution_minutes: 30,
            price_multiple: Decimal::from_units(3),
            max_cancellations: 3,
            max_distance_km: 2.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expected: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), format!("must be {}", expected))),
    }
}

fn non_negative_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    let value = parse_or(env_map, key, default, "a decimal number")?;
    if value.is_negative() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(value)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let diagnosis_api_url = env_map
            .get("DIAGNOSIS_API_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DIAGNOSIS_API_URL".to_string()))?;

        let payment_mode = match env_map
            .get("PAYMENT_MODE")
            .map(|s| s.as_str())
            .unwrap_or("simulated")
        {
            "simulated" => PaymentMode::Simulated,
            "external" => PaymentMode::External,
            other => {
                return Err(ConfigError::InvalidValue(
                    "PAYMENT_MODE".to_string(),
                    format!("must be simulated or external, got {}", other),
                ))
            }
        };

        let simulated_confirm_delay_ms = parse_or(
            &env_map,
            "SIMULATED_CONFIRM_DELAY_MS",
            3000u64,
            "a non-negative integer",
        )?;

        let defaults = PricingConfig::default();
        let pricing = PricingConfig {
            repair_fee_percent: non_negative_decimal(
                &env_map,
                "REPAIR_FEE_PERCENT",
                defaults.repair_fee_percent,
            )?,
            domestic_fee_percent: non_negative_decimal(
                &env_map,
                "DOMESTIC_FEE_PERCENT",
                defaults.domestic_fee_percent,
            )?,
            diagnosis_fee: non_negative_decimal(&env_map, "DIAGNOSIS_FEE", defaults.diagnosis_fee)?,
        };

        let defaults = FraudConfig::default();
        let fraud = FraudConfig {
            min_execution_minutes: parse_or(
                &env_map,
                "FRAUD_MIN_EXECUTION_MINUTES",
                defaults.min_execution_minutes,
                "an integer",
            )?,
            price_multiple: non_negative_decimal(
                &env_map,
                "FRAUD_PRICE_MULTIPLE",
                defaults.price_multiple,
            )?,
            max_cancellations: parse_or(
                &env_map,
                "FRAUD_MAX_CANCELLATIONS",
                defaults.max_cancellations,
                "an integer",
            )?,
            max_distance_km: parse_or(
                &env_map,
                "FRAUD_MAX_DISTANCE_KM",
                defaults.max_distance_km,
                "a number",
            )?,
        };

        let rate_limit_per_minute = parse_or(&env_map, "RATE_LIMIT_PER_MINUTE", 60u32, "a u32")?;
        if rate_limit_per_minute == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_PER_MINUTE".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            diagnosis_api_url,
            payment_mode,
            simulated_confirm_delay_ms,
            pricing,
            fraud,
            rate_limit_per_minute,
        })
    }
}
