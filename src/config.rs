use crate::distribution::RewardSettings;
use crate::domain::Decimal;
use crate::engine::EnginePolicy;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub execution_api_url: String,
    pub execution_api_key: Option<String>,
    pub analytics_url: Option<String>,
    pub automation_webhook_url: Option<String>,
    pub automation_webhook_secret: Option<String>,
    pub engine: EnginePolicy,
    pub rewards: RewardSettings,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let execution_api_url = required(&env_map, "EXECUTION_API_URL")?;

        let treatment_window_secs = env_map
            .get("TREATMENT_WINDOW_SECS")
            .map(|s| s.as_str())
            .unwrap_or("600")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "TREATMENT_WINDOW_SECS".to_string(),
                    "must be a whole number of seconds".to_string(),
                )
            })?;

        let settle_without_handle = match env_map
            .get("SETTLE_WITHOUT_HANDLE")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
            .unwrap_or("true")
        {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SETTLE_WITHOUT_HANDLE".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let sink_timeout_ms = env_map
            .get("SINK_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("10000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "SINK_TIMEOUT_MS".to_string(),
                    "must be a whole number of milliseconds".to_string(),
                )
            })?;

        let rewards = RewardSettings {
            chain_id: required(&env_map, "REWARD_CHAIN_ID")?,
            token: required(&env_map, "REWARD_TOKEN")?,
            signup_amount: amount(&env_map, "SIGNUP_REWARD_AMOUNT")?,
            referral_amount: amount(&env_map, "REFERRAL_REWARD_AMOUNT")?,
            link_amount: amount(&env_map, "LINK_REWARD_AMOUNT")?,
        };

        Ok(Config {
            port,
            database_path,
            execution_api_url,
            execution_api_key: optional(&env_map, "EXECUTION_API_KEY"),
            analytics_url: optional(&env_map, "ANALYTICS_URL"),
            automation_webhook_url: optional(&env_map, "AUTOMATION_WEBHOOK_URL"),
            automation_webhook_secret: optional(&env_map, "AUTOMATION_WEBHOOK_SECRET"),
            engine: EnginePolicy {
                treatment_window: Duration::from_secs(treatment_window_secs),
                settle_without_handle,
                sink_timeout: Duration::from_millis(sink_timeout_ms),
            },
            rewards,
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    optional(env_map, key).ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

/// Set and non-blank.
fn optional(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    env_map
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn amount(env_map: &HashMap<String, String>, key: &str) -> Result<Decimal, ConfigError> {
    let Some(raw) = optional(env_map, key) else {
        return Ok(Decimal::zero());
    };
    let value = Decimal::from_str_canonical(&raw).map_err(|e| {
        ConfigError::InvalidValue(key.to_string(), format!("must be a decimal: {}", e))
    })?;
    if value.inner().is_sign_negative() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(value)
}
